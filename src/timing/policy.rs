//! Declarative timing rules attached to a single effect unit.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::clock::TimescaleMode;
use super::direction::{Direction, DirectionCondition, PlayDirectionMode};
use crate::sequence::SequenceBinding;

/// Inclusive intensity range a unit accepts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntensityInterval {
    pub min: f64,
    pub max: f64,
}

impl IntensityInterval {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Inclusive on both ends.
    pub fn contains(&self, intensity: f64) -> bool {
        intensity >= self.min && intensity <= self.max
    }
}

/// Temporal rules for one unit: delays, repeats, cooldown, direction and
/// intensity filters, play-count limit, and an optional sequence binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingPolicy {
    pub timescale_mode: TimescaleMode,
    pub initial_delay: f64,
    pub cooldown: f64,
    pub repeat_count: u32,
    pub repeat_forever: bool,
    pub delay_between_repeats: f64,
    pub play_count_limit: Option<u32>,
    /// Effect invocations since the last reset.
    #[serde(skip)]
    pub play_count: u32,
    pub keep_play_count_on_reset: bool,
    pub direction_condition: DirectionCondition,
    pub play_direction_mode: PlayDirectionMode,
    pub intensity_interval: Option<IntensityInterval>,
    /// When false the unit never stretches its parent's total duration.
    pub contribute_to_total_duration: bool,
    pub exclude_from_holding_pauses: bool,
    pub interrupts_on_stop: bool,
    #[serde(skip)]
    pub sequence: Option<SequenceBinding>,
}

impl Default for TimingPolicy {
    fn default() -> Self {
        Self {
            timescale_mode: TimescaleMode::Scaled,
            initial_delay: 0.0,
            cooldown: 0.0,
            repeat_count: 0,
            repeat_forever: false,
            delay_between_repeats: 0.0,
            play_count_limit: None,
            play_count: 0,
            keep_play_count_on_reset: false,
            direction_condition: DirectionCondition::Always,
            play_direction_mode: PlayDirectionMode::FollowParent,
            intensity_interval: None,
            contribute_to_total_duration: true,
            exclude_from_holding_pauses: false,
            interrupts_on_stop: true,
            sequence: None,
        }
    }
}

fn clamp_duration(name: &str, value: f64) -> f64 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        log::warn!("timing: {name} = {value} is not a valid duration, using 0");
        0.0
    }
}

impl TimingPolicy {
    /// Clamp malformed durations to zero.
    pub fn sanitized(mut self) -> Self {
        self.initial_delay = clamp_duration("initial_delay", self.initial_delay);
        self.cooldown = clamp_duration("cooldown", self.cooldown);
        self.delay_between_repeats =
            clamp_duration("delay_between_repeats", self.delay_between_repeats);
        if let Some(interval) = self.intensity_interval {
            if interval.min > interval.max {
                log::warn!(
                    "timing: intensity interval [{}, {}] is inverted, swapping",
                    interval.min,
                    interval.max
                );
                self.intensity_interval = Some(IntensityInterval::new(interval.max, interval.min));
            }
        }
        self
    }

    /// Whether starting the unit enters the repeating or sequenced path
    /// instead of a single invocation.
    pub fn has_extended_play(&self) -> bool {
        self.repeat_forever || self.repeat_count > 0 || self.sequence.is_some()
    }

    /// How many effect invocations a repeat run performs, `None` for forever.
    pub fn plays_per_run(&self) -> Option<u32> {
        if self.repeat_forever {
            None
        } else {
            Some(self.repeat_count.saturating_add(1))
        }
    }

    /// The play-count limit is set and used up.
    pub fn play_count_reached(&self) -> bool {
        self.play_count_limit
            .is_some_and(|limit| self.play_count >= limit)
    }

    /// No interval accepts everything.
    pub fn accepts_intensity(&self, intensity: f64) -> bool {
        self.intensity_interval
            .map_or(true, |interval| interval.contains(intensity))
    }

    /// The deterministic gates: play-count limit, direction condition and
    /// intensity interval.
    pub fn passes_gates(&self, intensity: f64, direction: Direction) -> bool {
        !self.play_count_reached()
            && self.direction_condition.allows(direction)
            && self.accepts_intensity(intensity)
    }

    /// Every gate in order, short-circuiting on the first failure. `chance`
    /// is a percentage; the roll is uniform in `[0, 100)`.
    pub fn should_play<R: Rng + ?Sized>(
        &self,
        intensity: f64,
        direction: Direction,
        chance: f64,
        rng: &mut R,
    ) -> bool {
        self.passes_gates(intensity, direction) && roll_chance(chance, rng)
    }

    /// Total duration of one activation given the effect's base duration.
    pub fn total_duration(&self, base: f64) -> f64 {
        self.total_duration_scaled(base, 1.0)
    }

    /// Total duration with the parent's duration multiplier applied to the
    /// delay, the base duration and the delay between repeats.
    ///
    /// Sequence-bound units last as long as their sequence, which runs on
    /// its own beat clock and is not stretched by the multiplier.
    pub fn total_duration_scaled(&self, base: f64, multiplier: f64) -> f64 {
        if !self.contribute_to_total_duration {
            return 0.0;
        }
        let delay = self.initial_delay.max(0.0) * multiplier;
        if let Some(binding) = &self.sequence {
            return delay + binding.duration();
        }
        let base = base.max(0.0) * multiplier;
        let repeats = if self.repeat_forever {
            0
        } else {
            self.repeat_count
        };
        let gap = self.delay_between_repeats.max(0.0) * multiplier;
        delay + base + repeats as f64 * (base + gap)
    }

    /// Count one effect invocation.
    pub fn record_play(&mut self) {
        self.play_count = self.play_count.saturating_add(1);
    }

    /// Clear the play count unless configured to keep it.
    pub fn reset(&mut self) {
        if !self.keep_play_count_on_reset {
            self.play_count = 0;
        }
    }
}

/// Roll a percentage chance. 0 never passes, 100 always does.
pub fn roll_chance<R: Rng + ?Sized>(chance: f64, rng: &mut R) -> bool {
    if chance >= 100.0 {
        return true;
    }
    if chance <= 0.0 || chance.is_nan() {
        return false;
    }
    rng.gen_range(0.0..100.0) < chance
}
