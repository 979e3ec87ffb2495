//! Timing primitives: feedback clocks, play direction, and per-unit timing policy.

pub mod clock;
pub mod direction;
pub mod policy;

pub use clock::{Clock, TimeStamp, TimescaleMode};
pub use direction::{Direction, DirectionCondition, PlayDirectionMode};
pub use policy::{roll_chance, IntensityInterval, TimingPolicy};
