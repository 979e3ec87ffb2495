//! Built-in effects: thin leaves a composite can be assembled from.
//!
//! Most of these exist to shape sequential playback (pauses, loops); `Pulse`
//! is a plain timed feedback and `Shake` drives shakers through a
//! [`ShakeChannel`]. Every built-in can report its invocations to a shared
//! [`PlayTap`], which is how the CLI traces a run.

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;

use crate::shaker::{ShakeChannel, ShakeEvent};
use crate::timing::Direction;
use crate::unit::{Effect, Hold, PlayContext, Vec3};

/// One effect invocation as seen by a [`PlayTap`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayRecord {
    pub effect: String,
    pub time: f64,
    pub intensity: f64,
    pub direction: Direction,
    pub iteration: u32,
}

/// Shared record of effect invocations. Clones share the record.
#[derive(Debug, Clone, Default)]
pub struct PlayTap(Rc<RefCell<Vec<PlayRecord>>>);

impl PlayTap {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, effect: &str, cx: &PlayContext) {
        self.0.borrow_mut().push(PlayRecord {
            effect: effect.to_string(),
            time: cx.now,
            intensity: cx.intensity,
            direction: cx.direction,
            iteration: cx.iteration,
        });
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Remove and return everything recorded so far.
    pub fn take(&self) -> Vec<PlayRecord> {
        std::mem::take(&mut *self.0.borrow_mut())
    }
}

/// A timed feedback with no side effect beyond logging.
#[derive(Debug, Clone, Default)]
pub struct Pulse {
    pub name: String,
    pub duration: f64,
    pub tap: PlayTap,
}

impl Pulse {
    pub fn new(name: impl Into<String>, duration: f64) -> Self {
        Self {
            name: name.into(),
            duration,
            tap: PlayTap::default(),
        }
    }

    /// Record plays into `tap`.
    pub fn with_tap(mut self, tap: PlayTap) -> Self {
        self.tap = tap;
        self
    }
}

impl Effect for Pulse {
    fn kind(&self) -> &str {
        "pulse"
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn play(&mut self, cx: &PlayContext) {
        log::info!(
            "pulse '{}' at {:.3} intensity {:.2} {:?}",
            self.name,
            cx.now,
            cx.intensity,
            cx.direction
        );
        self.tap.record(&self.name, cx);
    }
}

/// Holds the walk for its duration.
#[derive(Debug, Clone, Default)]
pub struct Pause {
    pub duration: f64,
    pub tap: PlayTap,
}

impl Effect for Pause {
    fn kind(&self) -> &str {
        "pause"
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn hold(&self) -> Option<Hold> {
        Some(Hold::UntilComplete)
    }

    fn play(&mut self, cx: &PlayContext) {
        self.tap.record("pause", cx);
    }
}

/// Holds the walk for its duration and until every earlier unit finished.
#[derive(Debug, Clone, Default)]
pub struct HoldingPause {
    pub duration: f64,
    pub tap: PlayTap,
}

impl Effect for HoldingPause {
    fn kind(&self) -> &str {
        "holding_pause"
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn hold(&self) -> Option<Hold> {
        Some(Hold::UntilAllComplete)
    }

    fn play(&mut self, cx: &PlayContext) {
        self.tap.record("holding_pause", cx);
    }
}

/// Holds the walk until the composite is resumed, or `auto_resume` seconds.
#[derive(Debug, Clone, Default)]
pub struct ScriptPause {
    pub auto_resume: Option<f64>,
    pub tap: PlayTap,
}

impl Effect for ScriptPause {
    fn kind(&self) -> &str {
        "script_pause"
    }

    fn hold(&self) -> Option<Hold> {
        Some(Hold::Script {
            auto_resume: self.auto_resume,
        })
    }

    fn play(&mut self, cx: &PlayContext) {
        self.tap.record("script_pause", cx);
    }
}

/// Waits like a holding pause, then sends the walk back to the previous
/// [`LooperStart`]. `loops: None` loops until stopped.
#[derive(Debug, Clone, Default)]
pub struct Looper {
    pub duration: f64,
    pub loops: Option<u32>,
    pub tap: PlayTap,
}

impl Effect for Looper {
    fn kind(&self) -> &str {
        "looper"
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn hold(&self) -> Option<Hold> {
        Some(Hold::Loop { loops: self.loops })
    }

    fn play(&mut self, cx: &PlayContext) {
        self.tap.record("looper", cx);
    }
}

/// Where a [`Looper`] jumps back to.
#[derive(Debug, Clone, Copy, Default)]
pub struct LooperStart;

impl Effect for LooperStart {
    fn kind(&self) -> &str {
        "looper_start"
    }

    fn hold(&self) -> Option<Hold> {
        Some(Hold::LoopStart)
    }

    fn play(&mut self, _cx: &PlayContext) {}
}

/// Starts every shaker listening on `channel_id`.
#[derive(Debug, Clone)]
pub struct Shake {
    pub channel: ShakeChannel,
    pub channel_id: i32,
    pub duration: f64,
    pub tap: PlayTap,
}

impl Shake {
    pub fn new(channel: ShakeChannel, channel_id: i32, duration: f64) -> Self {
        Self {
            channel,
            channel_id,
            duration,
            tap: PlayTap::default(),
        }
    }
}

impl Effect for Shake {
    fn kind(&self) -> &str {
        "shake"
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn play(&mut self, cx: &PlayContext) {
        self.channel.emit(ShakeEvent {
            direction: cx.direction,
            ..ShakeEvent::start(self.channel_id, cx.duration, cx.intensity)
        });
        self.tap.record("shake", cx);
    }

    fn stop(&mut self, _position: Vec3, _intensity: f64) {
        self.channel.emit(ShakeEvent::stop(self.channel_id));
    }

    /// Stopping the shake lets listeners put their targets back.
    fn restore_initial_values(&mut self) {
        self.channel.emit(ShakeEvent::stop(self.channel_id));
    }
}
