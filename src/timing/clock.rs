//! Feedback time: scaled and unscaled clocks advanced by an external tick.
//!
//! A [`Clock`] never reads wall time. The host advances it once per frame with
//! the frame's delta; everything that waits (delays, repeats, cooldowns) compares
//! its stored deadline against [`Clock::now`].

use serde::{Deserialize, Serialize};

/// Which clock a delay or cooldown is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimescaleMode {
    /// Affected by the composite's time scale.
    #[default]
    Scaled,
    /// Ignores the time scale.
    Unscaled,
}

/// Scaled and unscaled feedback time.
#[derive(Debug, Clone)]
pub struct Clock {
    scaled: f64,
    unscaled: f64,
    time_scale: f64,
}

impl Clock {
    /// Create a clock at time zero with a time scale of 1.
    pub fn new() -> Self {
        Self {
            scaled: 0.0,
            unscaled: 0.0,
            time_scale: 1.0,
        }
    }

    /// Advance by `delta` seconds of unscaled time.
    ///
    /// Negative or non-finite deltas are ignored.
    pub fn advance(&mut self, delta: f64) {
        if !delta.is_finite() || delta <= 0.0 {
            return;
        }
        self.unscaled += delta;
        self.scaled += delta * self.time_scale;
    }

    /// Current time on the requested clock.
    pub fn now(&self, mode: TimescaleMode) -> f64 {
        match mode {
            TimescaleMode::Scaled => self.scaled,
            TimescaleMode::Unscaled => self.unscaled,
        }
    }

    /// Snapshot of both clocks.
    pub fn stamp(&self) -> TimeStamp {
        TimeStamp {
            scaled: self.scaled,
            unscaled: self.unscaled,
        }
    }

    /// Current scale applied to scaled time.
    pub fn time_scale(&self) -> f64 {
        self.time_scale
    }

    /// Set the scaled clock's rate. Negative values are clamped to zero.
    pub fn set_time_scale(&mut self, scale: f64) {
        self.time_scale = if scale.is_finite() { scale.max(0.0) } else { 1.0 };
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// Both clock readings at one instant, handed to units on every call.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TimeStamp {
    pub scaled: f64,
    pub unscaled: f64,
}

impl TimeStamp {
    /// A stamp where both clocks read `t`.
    pub fn at(t: f64) -> Self {
        Self {
            scaled: t,
            unscaled: t,
        }
    }

    /// The time on the clock `mode` selects.
    pub fn get(&self, mode: TimescaleMode) -> f64 {
        match mode {
            TimescaleMode::Scaled => self.scaled,
            TimescaleMode::Unscaled => self.unscaled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn initial_state() {
        let c = Clock::new();
        assert_eq!(c.now(TimescaleMode::Scaled), 0.0);
        assert_eq!(c.now(TimescaleMode::Unscaled), 0.0);
        assert_eq!(c.time_scale(), 1.0);
    }

    #[test]
    fn advance_accumulates() {
        let mut c = Clock::new();
        c.advance(0.25);
        c.advance(0.25);
        assert_eq!(c.now(TimescaleMode::Scaled), 0.5);
    }

    #[test]
    fn time_scale_only_affects_scaled_clock() {
        let mut c = Clock::new();
        c.set_time_scale(0.5);
        c.advance(1.0);
        assert_approx_eq!(c.now(TimescaleMode::Scaled), 0.5);
        assert_approx_eq!(c.now(TimescaleMode::Unscaled), 1.0);
    }

    #[test]
    fn negative_delta_ignored() {
        let mut c = Clock::new();
        c.advance(-1.0);
        c.advance(f64::NAN);
        assert_eq!(c.now(TimescaleMode::Unscaled), 0.0);
    }

    #[test]
    fn negative_time_scale_clamped() {
        let mut c = Clock::new();
        c.set_time_scale(-2.0);
        c.advance(1.0);
        assert_eq!(c.now(TimescaleMode::Scaled), 0.0);
    }

    #[test]
    fn stamp_matches_clock() {
        let mut c = Clock::new();
        c.set_time_scale(2.0);
        c.advance(0.5);
        let s = c.stamp();
        assert_eq!(s.get(TimescaleMode::Scaled), 1.0);
        assert_eq!(s.get(TimescaleMode::Unscaled), 0.5);
    }

    #[test]
    fn determinism() {
        let run = || {
            let mut c = Clock::new();
            c.set_time_scale(1.3);
            for _ in 0..1000 {
                c.advance(1.0 / 60.0);
            }
            c.now(TimescaleMode::Scaled)
        };
        let first = run();
        for _ in 0..10 {
            assert_eq!(run(), first);
        }
    }
}
