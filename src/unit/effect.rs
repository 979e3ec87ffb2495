//! The effect capability: what a concrete feedback does once triggered.

use serde::{Deserialize, Serialize};

use crate::timing::Direction;

/// A point in world space where a feedback is played.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Opaque handle to whatever owns a composite (a character, a pickup...).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Owner {
    pub id: u64,
    pub name: String,
}

impl Owner {
    /// An owner with a host id and display name.
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// How a unit constrains the units that follow it in a sequential run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Hold {
    /// Following units wait until this unit has finished.
    UntilComplete,
    /// This unit waits for every unit started before it, then following
    /// units wait for this one.
    UntilAllComplete,
    /// Following units wait for `resume()`, or for `auto_resume` seconds.
    Script { auto_resume: Option<f64> },
    /// Waits like `UntilAllComplete`, then jumps back to the nearest
    /// `LoopStart` while loops remain. `None` loops forever.
    Loop { loops: Option<u32> },
    /// Marks where a `Loop` jumps back to.
    LoopStart,
}

impl Hold {
    /// Whether this hold stops the walk (as opposed to a bare marker).
    pub fn blocks(&self) -> bool {
        !matches!(self, Hold::LoopStart)
    }
}

/// Everything an effect gets when it is invoked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayContext {
    pub position: Vec3,
    pub intensity: f64,
    /// The unit's own play direction.
    pub direction: Direction,
    /// Feedback time on the unit's clock.
    pub now: f64,
    /// The effect's duration after the parent's multiplier.
    pub duration: f64,
    /// 0-based invocation index within the current run (repeat or cue).
    pub iteration: u32,
}

/// A concrete feedback. Implementors supply only what happens when it is
/// triggered; delays, repeats, chance and direction are handled by the
/// owning [`EffectUnit`](super::EffectUnit).
pub trait Effect {
    /// Short type name used in logs.
    fn kind(&self) -> &str;

    /// Capture baseline values before the first play.
    fn initialize(&mut self, _owner: &Owner) {}

    /// Length of one invocation in seconds, before the duration multiplier.
    fn duration(&self) -> f64 {
        0.0
    }

    /// Whether this effect constrains sequential playback.
    fn hold(&self) -> Option<Hold> {
        None
    }

    fn play(&mut self, cx: &PlayContext);

    fn stop(&mut self, _position: Vec3, _intensity: f64) {}

    fn reset(&mut self) {}

    /// Put whatever the effect changed back to its baseline.
    fn restore_initial_values(&mut self) {}

    /// Per-tick hook while the unit is busy.
    fn update(&mut self, _now: f64, _delta: f64) {}

    /// Effects that finish on their own signal report `true` until done.
    fn is_running(&self) -> bool {
        false
    }
}
