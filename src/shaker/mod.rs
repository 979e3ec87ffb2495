//! Shakers: channel listeners that animate a target over a duration.
//!
//! A `Shake` effect unit emits a [`ShakeEvent`] into a [`ShakeChannel`]; the
//! host dispatches queued events to every [`Shaker`] once per frame and then
//! ticks them. Each shaker evaluates its remap [`Curve`] against normalized
//! progress and writes the result into its [`ShakeTarget`].

pub mod curve;

pub use curve::{apply_curve, remap, Curve};

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::timing::Direction;

/// A request for every shaker on `channel`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShakeEvent {
    pub channel: i32,
    /// Overrides the shaker's own duration when positive.
    pub duration: f64,
    pub intensity: f64,
    pub direction: Direction,
    /// Stop instead of start.
    pub stop: bool,
}

impl ShakeEvent {
    /// Start shakers on `channel`; a zero duration uses theirs.
    pub fn start(channel: i32, duration: f64, intensity: f64) -> Self {
        Self {
            channel,
            duration,
            intensity,
            direction: Direction::Forward,
            stop: false,
        }
    }

    /// Stop shakers on `channel`.
    pub fn stop(channel: i32) -> Self {
        Self {
            channel,
            duration: 0.0,
            intensity: 0.0,
            direction: Direction::Forward,
            stop: true,
        }
    }
}

/// Shared queue of shake events. Cloning shares the queue.
#[derive(Debug, Clone, Default)]
pub struct ShakeChannel {
    queue: Rc<RefCell<Vec<ShakeEvent>>>,
}

impl ShakeChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an event for the next dispatch.
    pub fn emit(&self, event: ShakeEvent) {
        self.queue.borrow_mut().push(event);
    }

    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Take every queued event.
    pub fn drain(&self) -> Vec<ShakeEvent> {
        std::mem::take(&mut *self.queue.borrow_mut())
    }

    /// Deliver every queued event to every listener, in emission order.
    pub fn dispatch(&self, listeners: &mut [&mut dyn ShakeListener]) {
        for event in self.drain() {
            for listener in listeners.iter_mut() {
                listener.on_shake_event(&event);
            }
        }
    }
}

/// Anything that reacts to shake events.
pub trait ShakeListener {
    fn on_shake_event(&mut self, event: &ShakeEvent);
}

/// The value a shaker animates.
pub trait ShakeTarget {
    /// Capture the baseline the target returns to on reset.
    fn grab_initial(&mut self) {}
    fn apply(&mut self, value: f64);
    fn reset(&mut self);
}

/// How a shaker responds to events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShakerSettings {
    pub channel: i32,
    pub duration: f64,
    pub curve: Curve,
    pub remap: (f64, f64),
    /// Loop forever instead of ending after `duration`.
    pub permanent: bool,
    /// Whether a new shake may restart one in progress.
    pub interruptible: bool,
    pub cooldown: f64,
    pub reset_target_on_end: bool,
    pub always_reset_before_shake: bool,
}

impl Default for ShakerSettings {
    fn default() -> Self {
        Self {
            channel: 0,
            duration: 0.5,
            curve: Curve::Bell,
            remap: (0.0, 1.0),
            permanent: false,
            interruptible: true,
            cooldown: 0.0,
            reset_target_on_end: true,
            always_reset_before_shake: false,
        }
    }
}

/// Animates a target in response to shake events on one channel.
pub struct Shaker<T: ShakeTarget> {
    settings: ShakerSettings,
    target: T,
    listening: bool,
    shaking: bool,
    now: f64,
    started_at: f64,
    last_started_at: Option<f64>,
    duration: f64,
    intensity: f64,
    direction: Direction,
}

impl<T: ShakeTarget> Shaker<T> {
    /// A listening shaker; the target's baseline is captured now.
    pub fn new(settings: ShakerSettings, mut target: T) -> Self {
        target.grab_initial();
        Self {
            settings,
            target,
            listening: true,
            shaking: false,
            now: 0.0,
            started_at: 0.0,
            last_started_at: None,
            duration: 0.0,
            intensity: 1.0,
            direction: Direction::Forward,
        }
    }

    pub fn settings(&self) -> &ShakerSettings {
        &self.settings
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    /// A shake is in progress.
    pub fn is_shaking(&self) -> bool {
        self.shaking
    }

    /// React to channel events again.
    pub fn start_listening(&mut self) {
        self.listening = true;
    }

    /// Ignore channel events until `start_listening`.
    pub fn stop_listening(&mut self) {
        self.listening = false;
    }

    /// Start a shake now. Returns `false` if it was refused.
    pub fn start_shaking(&mut self, duration: f64, intensity: f64, direction: Direction) -> bool {
        if self.shaking && !self.settings.interruptible {
            return false;
        }
        if let Some(last) = self.last_started_at {
            if self.settings.cooldown > 0.0 && self.now - last < self.settings.cooldown {
                log::debug!("shaker {}: in cooldown", self.settings.channel);
                return false;
            }
        }
        if self.settings.always_reset_before_shake {
            self.target.reset();
        }
        self.duration = if duration > 0.0 {
            duration
        } else {
            self.settings.duration.max(0.0)
        };
        self.intensity = intensity;
        self.direction = direction;
        self.started_at = self.now;
        self.last_started_at = Some(self.now);
        self.shaking = true;
        self.apply_progress(0.0);
        true
    }

    /// End the current shake, resetting the target if configured.
    pub fn stop_shaking(&mut self) {
        if !self.shaking {
            return;
        }
        self.shaking = false;
        if self.settings.reset_target_on_end {
            self.target.reset();
        }
    }

    /// Advance by `delta` seconds and update the target.
    pub fn tick(&mut self, delta: f64) {
        if delta.is_finite() && delta > 0.0 {
            self.now += delta;
        }
        if !self.shaking {
            return;
        }
        let elapsed = self.now - self.started_at;
        if self.duration <= 0.0 {
            self.apply_progress(1.0);
            self.finish();
            return;
        }
        if self.settings.permanent {
            self.apply_progress((elapsed / self.duration).fract());
            return;
        }
        if elapsed >= self.duration {
            self.apply_progress(1.0);
            self.finish();
        } else {
            self.apply_progress(elapsed / self.duration);
        }
    }

    fn apply_progress(&mut self, progress: f64) {
        let t = match self.direction {
            Direction::Forward => progress,
            Direction::Backward => 1.0 - progress,
        };
        let value = remap(self.settings.curve, t, self.settings.remap) * self.intensity;
        self.target.apply(value);
    }

    fn finish(&mut self) {
        self.shaking = false;
        if self.settings.reset_target_on_end {
            self.target.reset();
        }
    }
}

impl<T: ShakeTarget> ShakeListener for Shaker<T> {
    fn on_shake_event(&mut self, event: &ShakeEvent) {
        if !self.listening || event.channel != self.settings.channel {
            return;
        }
        if event.stop {
            self.stop_shaking();
        } else {
            self.start_shaking(event.duration, event.intensity, event.direction);
        }
    }
}
