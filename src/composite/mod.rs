//! Composites: an ordered group of effect units played as one feedback.
//!
//! A [`Composite`] owns its units, a feedback [`Clock`] and a seeded RNG. The
//! host drives it with [`Composite::tick`] once per frame; everything that
//! waits (the composite's own delay, unit delays and repeats, holds) is
//! resumable state compared against the clock on each tick.
//!
//! A run fans out in parallel unless an eligible unit declares a blocking
//! [`Hold`], in which case the units are walked in order and the walk stops
//! at each hold.

pub mod notify;
pub mod switch;
mod walk;

pub use notify::{Notification, NotificationKind, Notifier, SubscriptionId};
pub use switch::KillSwitch;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::timing::{roll_chance, Clock, Direction, TimeStamp, TimescaleMode};
use crate::unit::{EffectUnit, Hold, Owner, UnitEnv, Vec3};
use walk::{Signal, Step, Walk};

/// Global modifiers and gates for one composite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeSettings {
    /// Initial play direction.
    pub direction: Direction,
    pub auto_revert_on_complete: bool,
    pub can_play: bool,
    pub can_play_while_already_playing: bool,
    /// Seconds between `play` and the fan-out. Not stretched by the multiplier.
    pub initial_delay: f64,
    pub cooldown: f64,
    /// Percentage chance, `[0, 100]`, that a play goes through.
    pub chance: f64,
    pub duration_multiplier: f64,
    pub time_scale: f64,
    /// Multiplies every play's intensity.
    pub intensity: f64,
    pub timescale_mode: TimescaleMode,
    /// Seed for chance rolls. `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for CompositeSettings {
    fn default() -> Self {
        Self {
            direction: Direction::Forward,
            auto_revert_on_complete: false,
            can_play: true,
            can_play_while_already_playing: true,
            initial_delay: 0.0,
            cooldown: 0.0,
            chance: 100.0,
            duration_multiplier: 1.0,
            time_scale: 1.0,
            intensity: 1.0,
            timescale_mode: TimescaleMode::Scaled,
            seed: None,
        }
    }
}

impl CompositeSettings {
    /// Clamp malformed values instead of rejecting them.
    pub fn sanitized(mut self) -> Self {
        if !(self.initial_delay.is_finite() && self.initial_delay >= 0.0) {
            log::warn!("composite: initial_delay = {} clamped to 0", self.initial_delay);
            self.initial_delay = 0.0;
        }
        if !(self.cooldown.is_finite() && self.cooldown >= 0.0) {
            log::warn!("composite: cooldown = {} clamped to 0", self.cooldown);
            self.cooldown = 0.0;
        }
        if !(self.duration_multiplier.is_finite() && self.duration_multiplier > 0.0) {
            log::warn!(
                "composite: duration_multiplier = {} must be positive, using 1",
                self.duration_multiplier
            );
            self.duration_multiplier = 1.0;
        }
        if !(self.time_scale.is_finite() && self.time_scale >= 0.0) {
            log::warn!("composite: time_scale = {} reset to 1", self.time_scale);
            self.time_scale = 1.0;
        }
        if !self.intensity.is_finite() {
            self.intensity = 1.0;
        }
        self.chance = if self.chance.is_nan() {
            100.0
        } else {
            self.chance.clamp(0.0, 100.0)
        };
        self
    }
}

#[derive(Debug)]
enum Mode {
    /// Waiting out the composite's initial delay.
    Delayed { fan_out_at: f64 },
    Parallel,
    Sequential(Walk),
}

/// One play of the composite, from `play` until completion or `stop`.
#[derive(Debug)]
struct Run {
    position: Vec3,
    intensity: f64,
    direction: Direction,
    started_at: f64,
    total_duration: f64,
    mode: Mode,
}

/// An ordered group of effect units played, stopped and reverted as one.
pub struct Composite {
    label: String,
    units: Vec<EffectUnit>,
    settings: CompositeSettings,
    kill_switch: KillSwitch,
    notifier: Notifier,
    clock: Clock,
    rng: ChaCha8Rng,
    direction: Direction,
    revert_pending: bool,
    context_active: bool,
    paused: bool,
    run: Option<Run>,
    last_played_at: Option<f64>,
    plays_since_init: u32,
}

impl std::fmt::Debug for Composite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Composite")
            .field("label", &self.label)
            .field("units", &self.units)
            .field("direction", &self.direction)
            .field("playing", &self.run.is_some())
            .finish()
    }
}

impl Composite {
    /// A composite with default settings on the global kill switch.
    pub fn new(label: impl Into<String>, units: Vec<EffectUnit>) -> Self {
        let settings = CompositeSettings::default();
        Self {
            label: label.into(),
            units,
            kill_switch: KillSwitch::global(),
            notifier: Notifier::new(),
            clock: Clock::new(),
            rng: ChaCha8Rng::from_entropy(),
            direction: settings.direction,
            revert_pending: false,
            context_active: true,
            paused: false,
            run: None,
            last_played_at: None,
            plays_since_init: 0,
            settings,
        }
    }

    /// Apply settings, clamping bad values and reseeding the RNG.
    pub fn with_settings(mut self, settings: CompositeSettings) -> Self {
        let settings = settings.sanitized();
        self.rng = match settings.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        self.direction = settings.direction;
        self.clock.set_time_scale(settings.time_scale);
        self.settings = settings;
        self
    }

    /// Use a private switch instead of the global one.
    pub fn with_kill_switch(mut self, kill_switch: KillSwitch) -> Self {
        self.kill_switch = kill_switch;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn settings(&self) -> &CompositeSettings {
        &self.settings
    }

    pub fn units(&self) -> &[EffectUnit] {
        &self.units
    }

    /// First unit with this label.
    pub fn unit(&self, label: &str) -> Option<&EffectUnit> {
        self.units.iter().find(|u| u.label == label)
    }

    /// First unit with this label, for live tweaks between plays.
    pub fn unit_mut(&mut self, label: &str) -> Option<&mut EffectUnit> {
        self.units.iter_mut().find(|u| u.label == label)
    }

    /// Initialize every unit for `owner` and clear the play counter.
    pub fn initialize(&mut self, owner: &Owner) {
        for unit in &mut self.units {
            unit.initialize(owner);
        }
        self.plays_since_init = 0;
        log::debug!("{}: initialized {} units", self.label, self.units.len());
    }

    /// Register a lifecycle observer.
    pub fn subscribe(
        &mut self,
        observer: impl FnMut(&Notification<'_>) + 'static,
    ) -> SubscriptionId {
        self.notifier.subscribe(observer)
    }

    /// Drop an observer. Returns `false` for an unknown id.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }

    // --- Playback ---

    /// Play in the current direction. Returns `false` when a gate refused.
    pub fn play(&mut self, position: Vec3, intensity: f64) -> bool {
        self.play_internal(position, intensity, false)
    }

    /// Flip the direction, then play.
    pub fn play_in_reverse(&mut self, position: Vec3, intensity: f64) -> bool {
        self.play_internal(position, intensity, true)
    }

    /// Play only if the next play would run backward.
    pub fn play_only_if_reversed(&mut self, position: Vec3, intensity: f64) -> bool {
        if self.next_direction() != Direction::Backward {
            return false;
        }
        self.play(position, intensity)
    }

    /// Play only if the next play would run forward.
    pub fn play_only_if_normal_direction(&mut self, position: Vec3, intensity: f64) -> bool {
        if self.next_direction() != Direction::Forward {
            return false;
        }
        self.play(position, intensity)
    }

    fn play_internal(&mut self, position: Vec3, intensity: f64, force_revert: bool) -> bool {
        if !self.settings.can_play {
            log::debug!("{}: play refused, can_play is off", self.label);
            return false;
        }
        if self.run.is_some() && !self.settings.can_play_while_already_playing {
            log::debug!("{}: play refused, already playing", self.label);
            return false;
        }
        if !self.kill_switch.is_enabled() {
            log::debug!("{}: play refused, feedbacks disabled", self.label);
            return false;
        }
        if !self.context_active {
            log::debug!("{}: play refused, context inactive", self.label);
            return false;
        }
        let now = self.now();
        if let Some(last) = self.last_played_at {
            if self.settings.cooldown > 0.0 && now - last < self.settings.cooldown {
                log::debug!("{}: play refused, in cooldown", self.label);
                return false;
            }
        }
        if !roll_chance(self.settings.chance, &mut self.rng) {
            log::debug!("{}: play skipped by chance", self.label);
            return false;
        }

        if self.revert_pending {
            self.revert_pending = false;
            self.revert();
        }
        if force_revert {
            self.direction = self.direction.flipped();
        }

        for unit in self.units.iter_mut().filter(|u| u.active) {
            unit.prepare();
        }
        self.paused = false;
        self.last_played_at = Some(now);
        self.plays_since_init += 1;

        let direction = self.direction;
        let intensity = intensity * self.settings.intensity;
        let total_duration = self.compute_total_duration(direction, intensity);
        let delay = self.settings.initial_delay;
        self.run = Some(Run {
            position,
            intensity,
            direction,
            started_at: now,
            total_duration,
            mode: Mode::Delayed {
                fan_out_at: now + delay,
            },
        });
        log::debug!(
            "{}: play {:?} at {now}, total duration {total_duration}",
            self.label,
            direction
        );
        if delay <= 0.0 {
            self.fan_out();
        }
        true
    }

    /// Stop the current run and every unit.
    pub fn stop(&mut self, position: Vec3, intensity: f64) {
        self.stop_with(position, intensity, true);
    }

    /// Stop the current run. Units keep whatever they started unless
    /// `stop_units` is set.
    pub fn stop_with(&mut self, position: Vec3, intensity: f64, stop_units: bool) {
        if self.run.take().is_some() {
            log::debug!("{}: stopped", self.label);
        }
        self.paused = false;
        if stop_units {
            let stamp = self.clock.stamp();
            for unit in &mut self.units {
                unit.stop(position, intensity, stamp);
            }
        }
    }

    /// Advance feedback time by `delta` seconds and run everything that came
    /// due. Does nothing while paused.
    pub fn tick(&mut self, delta: f64) {
        if self.paused {
            return;
        }
        self.clock.advance(delta);
        let stamp = self.clock.stamp();
        for unit in &mut self.units {
            unit.tick(stamp, delta, &mut self.rng);
        }

        let now = self.now();
        let due = match &self.run {
            Some(Run {
                mode: Mode::Delayed { fan_out_at },
                ..
            }) => now >= *fan_out_at,
            _ => false,
        };
        if due {
            self.fan_out();
        } else {
            self.advance_walk();
        }
        self.check_complete();
    }

    // --- Direction and pauses ---

    /// Flip the direction for the next play. The current run keeps its own.
    pub fn revert(&mut self) {
        self.direction = self.direction.flipped();
        let now = self.now();
        self.notifier
            .emit(NotificationKind::Revert, &self.label, now);
    }

    /// Revert at the start of the next play.
    pub fn revert_on_next_play(&mut self) {
        self.revert_pending = true;
    }

    /// Freeze feedback time. Units do not advance until `resume`.
    pub fn pause(&mut self) {
        if self.run.is_none() || self.paused {
            return;
        }
        self.paused = true;
        let now = self.now();
        self.notifier.emit(NotificationKind::Pause, &self.label, now);
    }

    /// Lift a pause, or release the hold the sequential walk waits on.
    pub fn resume(&mut self) {
        if self.run.is_none() {
            return;
        }
        if self.paused {
            self.paused = false;
        } else {
            let released = match &mut self.run {
                Some(Run {
                    mode: Mode::Sequential(walk),
                    ..
                }) => walk.release(),
                _ => false,
            };
            if !released {
                return;
            }
        }
        let now = self.now();
        self.notifier
            .emit(NotificationKind::Resume, &self.label, now);
        self.advance_walk();
        self.check_complete();
    }

    // --- Reset and restore ---

    /// Reset every active unit, including play-count bookkeeping, and end
    /// the current run without completing it.
    pub fn reset_units(&mut self) {
        for unit in self.units.iter_mut().filter(|u| u.active) {
            unit.reset();
        }
        self.run = None;
        self.paused = false;
    }

    /// Run every unit's restore hook, active or not.
    pub fn restore_initial_values(&mut self) {
        for unit in &mut self.units {
            unit.restore_initial_values();
        }
        let now = self.now();
        self.notifier
            .emit(NotificationKind::RestoreInitialValues, &self.label, now);
    }

    // --- Settings ---

    /// Whether the owning context (an enabled object, a live scene) lets the
    /// composite play at all.
    pub fn set_context_active(&mut self, active: bool) {
        self.context_active = active;
    }

    /// Allow or refuse future plays.
    pub fn set_can_play(&mut self, can_play: bool) {
        self.settings.can_play = can_play;
    }

    /// Scale applied to scaled feedback time from the next tick.
    pub fn set_time_scale(&mut self, scale: f64) {
        self.clock.set_time_scale(scale);
        self.settings.time_scale = self.clock.time_scale();
    }

    /// Multiplier for the intensity of future plays.
    pub fn set_intensity(&mut self, intensity: f64) {
        if intensity.is_finite() {
            self.settings.intensity = intensity;
        }
    }

    /// Takes effect on the next play.
    pub fn set_duration_multiplier(&mut self, multiplier: f64) {
        if multiplier.is_finite() && multiplier > 0.0 {
            self.settings.duration_multiplier = multiplier;
        } else {
            log::warn!("{}: ignoring duration multiplier {multiplier}", self.label);
        }
    }

    // --- State ---

    /// A run is in progress (delayed, fanned out or walking).
    pub fn is_playing(&self) -> bool {
        self.run.is_some()
    }

    /// Frozen by `pause`.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Direction the next play will use, before any pending revert.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Accepted plays since the last `initialize`.
    pub fn plays_since_init(&self) -> u32 {
        self.plays_since_init
    }

    /// Feedback time on the composite's clock.
    pub fn now(&self) -> f64 {
        self.clock.now(self.settings.timescale_mode)
    }

    /// Both clocks at the current tick.
    pub fn stamp(&self) -> TimeStamp {
        self.clock.stamp()
    }

    /// Seconds since the current run started.
    pub fn elapsed(&self) -> Option<f64> {
        self.run.as_ref().map(|run| self.now() - run.started_at)
    }

    /// The sequential walk is waiting on a script pause.
    pub fn in_script_driven_pause(&self) -> bool {
        matches!(
            &self.run,
            Some(Run {
                mode: Mode::Sequential(walk),
                ..
            }) if walk.in_script_pause()
        )
    }

    /// The sequential walk is stopped at any hold.
    pub fn in_holding_pause(&self) -> bool {
        matches!(
            &self.run,
            Some(Run {
                mode: Mode::Sequential(walk),
                ..
            }) if walk.is_holding()
        )
    }

    /// Duration of the current run, or of the next play when idle.
    pub fn total_duration(&self) -> f64 {
        match &self.run {
            Some(run) => run.total_duration,
            None => self.compute_total_duration(self.next_direction(), self.settings.intensity),
        }
    }

    fn next_direction(&self) -> Direction {
        if self.revert_pending {
            self.direction.flipped()
        } else {
            self.direction
        }
    }

    /// Longest unit plus the composite's delay in parallel mode. With holds
    /// the units between two holds form a segment and segments add up.
    fn compute_total_duration(&self, direction: Direction, intensity: f64) -> f64 {
        let multiplier = self.settings.duration_multiplier;
        let eligible = |unit: &&EffectUnit| unit.can_play_in(direction, intensity);
        let sequential = self
            .units
            .iter()
            .filter(eligible)
            .any(|u| u.hold().is_some_and(|h| h.blocks()));

        let body = if sequential {
            let mut total = 0.0;
            let mut segment: f64 = 0.0;
            for unit in self.units.iter().filter(eligible) {
                segment = segment.max(unit.total_duration(multiplier));
                match unit.hold() {
                    Some(Hold::Script { auto_resume }) => {
                        total += segment + auto_resume.unwrap_or(0.0).max(0.0) * multiplier;
                        segment = 0.0;
                    }
                    Some(hold) if hold.blocks() => {
                        total += segment;
                        segment = 0.0;
                    }
                    _ => {}
                }
            }
            total + segment
        } else {
            self.units
                .iter()
                .filter(eligible)
                .map(|u| u.total_duration(multiplier))
                .fold(0.0, f64::max)
        };
        self.settings.initial_delay + body
    }

    fn fan_out(&mut self) {
        let Some(run) = self.run.as_mut() else {
            return;
        };
        let (position, intensity, direction) = (run.position, run.intensity, run.direction);
        let sequential = self.units.iter().any(|u| {
            u.can_play_in(direction, intensity) && u.hold().is_some_and(|h| h.blocks())
        });

        let now = self.clock.now(self.settings.timescale_mode);
        self.notifier.emit(NotificationKind::Play, &self.label, now);

        if sequential {
            log::debug!("{}: sequential run", self.label);
            run.mode = Mode::Sequential(Walk::new(self.units.len(), direction));
            self.advance_walk();
            return;
        }
        run.mode = Mode::Parallel;
        let env = UnitEnv {
            stamp: self.clock.stamp(),
            direction,
            duration_multiplier: self.settings.duration_multiplier,
        };
        let order: Vec<usize> = match direction {
            Direction::Forward => (0..self.units.len()).collect(),
            Direction::Backward => (0..self.units.len()).rev().collect(),
        };
        for index in order {
            let unit = &mut self.units[index];
            if unit.can_play_in(direction, intensity) {
                unit.play(position, intensity, &env, &mut self.rng);
            }
        }
    }

    fn advance_walk(&mut self) {
        let now = self.now();
        let Some(Run {
            position,
            intensity,
            direction,
            mode: Mode::Sequential(walk),
            ..
        }) = self.run.as_mut()
        else {
            return;
        };
        let mut step = Step {
            units: &mut self.units,
            env: UnitEnv {
                stamp: self.clock.stamp(),
                direction: *direction,
                duration_multiplier: self.settings.duration_multiplier,
            },
            position: *position,
            intensity: *intensity,
            now,
            rng: &mut self.rng,
        };
        let signals = walk.advance(&mut step);
        for signal in signals {
            let kind = match signal {
                Signal::Pause => NotificationKind::Pause,
                Signal::Resume => NotificationKind::Resume,
            };
            self.notifier.emit(kind, &self.label, now);
        }
    }

    fn check_complete(&mut self) {
        let Some(run) = &self.run else {
            return;
        };
        let now = self.now();
        let stamp = self.clock.stamp();
        let finished = match &run.mode {
            Mode::Delayed { .. } => false,
            Mode::Parallel => now - run.started_at >= run.total_duration,
            Mode::Sequential(walk) => walk.is_finished(),
        };
        if !finished || self.units.iter().any(|u| u.is_playing(stamp)) {
            return;
        }
        self.complete();
    }

    fn complete(&mut self) {
        self.run = None;
        let now = self.now();
        log::debug!("{}: complete at {now}", self.label);
        self.notifier
            .emit(NotificationKind::Complete, &self.label, now);
        if self.settings.auto_revert_on_complete {
            self.revert();
        }
    }
}

impl Drop for Composite {
    fn drop(&mut self) {
        if self.run.is_some() {
            self.stop(Vec3::ZERO, 1.0);
        }
    }
}
