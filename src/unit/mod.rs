//! Effect units: one independently timed feedback inside a composite.
//!
//! An [`EffectUnit`] wraps a boxed [`Effect`] with its [`TimingPolicy`] and the
//! resumable state that replaces coroutines: a [`Phase`] holding the next
//! deadline, advanced once per tick by comparing it against feedback time.

pub mod effect;

pub use effect::{Effect, Hold, Owner, PlayContext, Vec3};

use rand::Rng;

use crate::timing::{Direction, TimeStamp, TimingPolicy};

/// Where a unit is in its current activation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Phase {
    Idle,
    /// Waiting out the initial delay.
    Delayed { start_at: f64 },
    /// Invoking the effect on a repeat loop; `None` plays forever.
    Repeating {
        next_at: f64,
        plays_left: Option<u32>,
    },
    /// Firing at the cues of a bound sequence track.
    Sequencing { started_at: f64, cursor: usize },
}

/// What the parent hands a unit when playing or ticking it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitEnv {
    pub stamp: TimeStamp,
    /// The parent run's direction.
    pub direction: Direction,
    pub duration_multiplier: f64,
}

#[derive(Debug, Clone, Copy)]
struct Activation {
    position: Vec3,
    intensity: f64,
    direction: Direction,
    multiplier: f64,
}

impl Default for Activation {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            intensity: 1.0,
            direction: Direction::Forward,
            multiplier: 1.0,
        }
    }
}

/// One feedback with its timing rules and runtime state.
pub struct EffectUnit {
    pub label: String,
    pub active: bool,
    /// Percentage chance, `[0, 100]`, that an activation invokes the effect.
    pub chance: f64,
    pub timing: TimingPolicy,
    effect: Box<dyn Effect>,
    initialized: bool,
    phase: Phase,
    activation: Activation,
    last_played_at: Option<f64>,
    busy_until: f64,
    iteration: u32,
}

impl std::fmt::Debug for EffectUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectUnit")
            .field("label", &self.label)
            .field("kind", &self.effect.kind())
            .field("active", &self.active)
            .field("phase", &self.phase)
            .finish()
    }
}

impl EffectUnit {
    pub fn new(label: impl Into<String>, effect: impl Effect + 'static) -> Self {
        Self::boxed(label, Box::new(effect))
    }

    /// Wrap an already boxed effect, as the config builder does.
    pub fn boxed(label: impl Into<String>, effect: Box<dyn Effect>) -> Self {
        Self {
            label: label.into(),
            active: true,
            chance: 100.0,
            timing: TimingPolicy::default(),
            effect,
            initialized: false,
            phase: Phase::Idle,
            activation: Activation::default(),
            last_played_at: None,
            busy_until: f64::NEG_INFINITY,
            iteration: 0,
        }
    }

    /// Set the timing policy, clamping bad values.
    pub fn with_timing(mut self, timing: TimingPolicy) -> Self {
        self.timing = timing.sanitized();
        self
    }

    /// Set the chance, clamped to `[0, 100]`.
    pub fn with_chance(mut self, chance: f64) -> Self {
        self.chance = if chance.is_nan() {
            100.0
        } else {
            chance.clamp(0.0, 100.0)
        };
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Where the current activation is.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Time of the last accepted `play`, the anchor for cooldown.
    pub fn last_played_at(&self) -> Option<f64> {
        self.last_played_at
    }

    /// The hold the effect declares, if any.
    pub fn hold(&self) -> Option<Hold> {
        self.effect.hold()
    }

    /// Capture baselines. Call once before the first play.
    pub fn initialize(&mut self, owner: &Owner) {
        self.effect.initialize(owner);
        self.initialized = true;
    }

    /// The deterministic eligibility check the parent runs before playing.
    pub fn can_play_in(&self, direction: Direction, intensity: f64) -> bool {
        self.active && self.timing.passes_gates(intensity, direction)
    }

    /// The unit's own play direction under a parent direction.
    pub fn play_direction(&self, parent: Direction) -> Direction {
        self.timing.play_direction_mode.resolve(parent)
    }

    /// Total duration of one activation under the parent's multiplier.
    pub fn total_duration(&self, multiplier: f64) -> f64 {
        if !self.active {
            return 0.0;
        }
        self.timing
            .total_duration_scaled(self.effect.duration(), multiplier)
    }

    /// Still delaying, repeating, sequencing, or inside an effect's duration.
    pub fn is_playing(&self, stamp: TimeStamp) -> bool {
        self.phase != Phase::Idle
            || stamp.get(self.timing.timescale_mode) < self.busy_until
            || self.effect.is_running()
    }

    /// Trigger the unit. Returns `false` when it refused (inactive or in
    /// cooldown); a refusal is not an error.
    pub fn play<R: Rng + ?Sized>(
        &mut self,
        position: Vec3,
        intensity: f64,
        env: &UnitEnv,
        rng: &mut R,
    ) -> bool {
        if !self.active {
            return false;
        }
        if !self.initialized {
            log::warn!(
                "unit '{}' ({}) played before initialization",
                self.label,
                self.effect.kind()
            );
        }
        let now = env.stamp.get(self.timing.timescale_mode);
        if let Some(last) = self.last_played_at {
            if self.timing.cooldown > 0.0 && now - last < self.timing.cooldown {
                log::debug!("unit '{}': in cooldown", self.label);
                return false;
            }
        }
        // cooldown runs from the accepted play, whatever the delay or chance do
        self.last_played_at = Some(now);

        self.activation = Activation {
            position,
            intensity,
            direction: env.direction,
            multiplier: env.duration_multiplier,
        };
        let delay = self.timing.initial_delay * env.duration_multiplier;
        if delay > 0.0 {
            self.phase = Phase::Delayed {
                start_at: now + delay,
            };
        } else {
            self.start(now, now, rng);
        }
        true
    }

    /// Advance deferred work up to the current time.
    pub fn tick<R: Rng + ?Sized>(&mut self, stamp: TimeStamp, delta: f64, rng: &mut R) {
        let now = stamp.get(self.timing.timescale_mode);
        match self.phase {
            Phase::Delayed { start_at } if now >= start_at => {
                self.phase = Phase::Idle;
                self.start(start_at, now, rng);
            }
            _ => self.advance(now),
        }
        if self.is_playing(stamp) {
            self.effect.update(now, delta);
        }
    }

    /// Cancel pending work. With `interrupts_on_stop` the effect is told to
    /// stop; otherwise whatever it already started finishes on its own.
    pub fn stop(&mut self, position: Vec3, intensity: f64, stamp: TimeStamp) {
        self.phase = Phase::Idle;
        if self.timing.interrupts_on_stop {
            self.effect.stop(position, intensity);
            let now = stamp.get(self.timing.timescale_mode);
            self.busy_until = self.busy_until.min(now);
        }
    }

    /// Clear in-flight state before a fresh run, keeping play-count bookkeeping.
    pub fn prepare(&mut self) {
        self.phase = Phase::Idle;
        self.busy_until = f64::NEG_INFINITY;
        self.iteration = 0;
        self.effect.reset();
    }

    /// Clear in-flight state and play-count bookkeeping.
    pub fn reset(&mut self) {
        self.prepare();
        self.timing.reset();
    }

    /// Put the effect back to its baseline.
    pub fn restore_initial_values(&mut self) {
        self.effect.restore_initial_values();
    }

    /// Begin an activation scheduled at `at`, catching up to `now`.
    fn start<R: Rng + ?Sized>(&mut self, at: f64, now: f64, rng: &mut R) {
        let Activation {
            intensity,
            direction,
            ..
        } = self.activation;
        if !self
            .timing
            .should_play(intensity, direction, self.chance, rng)
        {
            log::debug!("unit '{}': gates refused activation", self.label);
            return;
        }
        self.iteration = 0;
        if self.timing.sequence.is_some() {
            self.phase = Phase::Sequencing {
                started_at: at,
                cursor: 0,
            };
        } else if self.timing.has_extended_play() {
            self.phase = Phase::Repeating {
                next_at: at,
                plays_left: self.timing.plays_per_run(),
            };
        } else {
            self.invoke(at);
            return;
        }
        self.advance(now);
    }

    fn advance(&mut self, now: f64) {
        match self.phase {
            Phase::Idle | Phase::Delayed { .. } => {}
            Phase::Repeating {
                mut next_at,
                mut plays_left,
            } => {
                let interval = (self.effect.duration() + self.timing.delay_between_repeats)
                    * self.activation.multiplier;
                while now >= next_at {
                    if plays_left == Some(0) || self.timing.play_count_reached() {
                        self.phase = Phase::Idle;
                        return;
                    }
                    self.invoke(next_at);
                    plays_left = plays_left.map(|n| n - 1);
                    if plays_left == Some(0) {
                        self.phase = Phase::Idle;
                        return;
                    }
                    if interval > 0.0 {
                        next_at += interval;
                    } else {
                        // zero-length cycles fire once per tick
                        self.phase = Phase::Repeating {
                            next_at: now,
                            plays_left,
                        };
                        return;
                    }
                }
                self.phase = Phase::Repeating {
                    next_at,
                    plays_left,
                };
                log::trace!("unit '{}': next repeat at {next_at}", self.label);
            }
            Phase::Sequencing {
                started_at,
                mut cursor,
            } => {
                let Some((cue_count, length)) = self
                    .timing
                    .sequence
                    .as_ref()
                    .map(|b| (b.cues().len(), b.duration()))
                else {
                    self.phase = Phase::Idle;
                    return;
                };
                while let Some(cue) = self.cue(cursor) {
                    if now < started_at + cue {
                        break;
                    }
                    if !self.timing.play_count_reached() {
                        self.invoke(started_at + cue);
                    }
                    cursor += 1;
                }
                self.phase = if cursor >= cue_count && now >= started_at + length {
                    Phase::Idle
                } else {
                    Phase::Sequencing { started_at, cursor }
                };
            }
        }
    }

    fn cue(&self, index: usize) -> Option<f64> {
        self.timing
            .sequence
            .as_ref()
            .and_then(|b| b.cues().get(index).copied())
    }

    fn invoke(&mut self, at: f64) {
        let duration = self.effect.duration().max(0.0) * self.activation.multiplier;
        let cx = PlayContext {
            position: self.activation.position,
            intensity: self.activation.intensity,
            direction: self.play_direction(self.activation.direction),
            now: at,
            duration,
            iteration: self.iteration,
        };
        self.timing.record_play();
        self.busy_until = self.busy_until.max(at + duration);
        self.iteration += 1;
        log::trace!("unit '{}': invoke #{} at {at}", self.label, cx.iteration);
        self.effect.play(&cx);
    }
}
