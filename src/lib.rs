//! Feedbacks: a tick-driven sequencing engine for game feedback effects.
//!
//! A [`Composite`](composite::Composite) groups [`EffectUnit`](unit::EffectUnit)s
//! and plays them as one feedback: delays, repeats, cooldowns, chance, play
//! direction, holds and sequence tracks are all resolved against a feedback
//! clock the host advances once per frame.

pub mod composite;
pub mod config;
pub mod effects;
pub mod error;
pub mod sequence;
pub mod shaker;
pub mod timing;
pub mod unit;

pub use composite::{Composite, CompositeSettings, KillSwitch, NotificationKind};
pub use error::{FeedbackError, Result};
pub use unit::{Effect, EffectUnit, Owner, PlayContext, Vec3};
