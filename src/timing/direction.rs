//! Play direction and the per-unit rules that react to it.

use serde::{Deserialize, Serialize};

/// Whether a composite is conceptually playing forward or backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

impl Direction {
    /// The opposite direction.
    pub fn flipped(self) -> Self {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }

    pub fn is_forward(self) -> bool {
        self == Direction::Forward
    }
}

/// In which parent directions a unit is allowed to play at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DirectionCondition {
    #[default]
    Always,
    OnlyForward,
    OnlyBackward,
}

impl DirectionCondition {
    /// Whether a unit with this condition is eligible under `parent`.
    pub fn allows(self, parent: Direction) -> bool {
        match self {
            DirectionCondition::Always => true,
            DirectionCondition::OnlyForward => parent == Direction::Forward,
            DirectionCondition::OnlyBackward => parent == Direction::Backward,
        }
    }
}

/// How a unit derives its own play direction from its parent's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlayDirectionMode {
    #[default]
    FollowParent,
    OppositeParent,
    AlwaysForward,
    AlwaysBackward,
}

impl PlayDirectionMode {
    /// The direction the unit's own progress is evaluated in.
    pub fn resolve(self, parent: Direction) -> Direction {
        match self {
            PlayDirectionMode::FollowParent => parent,
            PlayDirectionMode::OppositeParent => parent.flipped(),
            PlayDirectionMode::AlwaysForward => Direction::Forward,
            PlayDirectionMode::AlwaysBackward => Direction::Backward,
        }
    }
}
