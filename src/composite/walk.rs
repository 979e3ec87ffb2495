//! Sequential playback: walking the unit list one hold at a time.
//!
//! When any eligible unit declares a blocking [`Hold`], a composite run plays
//! its units in list order (reverse order when running backward) and stops at
//! each hold until it is satisfied or released by `resume()`. The walk is
//! resumable state advanced once per tick, never a blocking wait.

use std::collections::HashMap;

use rand::Rng;

use crate::timing::Direction;
use crate::unit::{EffectUnit, Hold, UnitEnv, Vec3};

/// Lifecycle changes the composite turns into notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Signal {
    Pause,
    Resume,
}

/// What the walk is waiting for.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Gate {
    /// One unit to finish.
    Unit(usize),
    /// The holder and every unit started before it.
    Started { holder: usize },
    /// `resume()`, or the auto-resume deadline.
    Script { until: Option<f64> },
}

/// What happens once the gate opens.
#[derive(Debug, Clone, Copy, PartialEq)]
enum After {
    Continue,
    Loop { at: usize, loops: Option<u32> },
}

/// Everything a walk step needs from the run that owns it.
pub(super) struct Step<'a, R: Rng + ?Sized> {
    pub units: &'a mut [EffectUnit],
    pub env: UnitEnv,
    pub position: Vec3,
    pub intensity: f64,
    /// Composite time, for script deadlines.
    pub now: f64,
    pub rng: &'a mut R,
}

#[derive(Debug)]
pub(super) struct Walk {
    /// Unit indices in walk order.
    order: Vec<usize>,
    cursor: usize,
    gate: Option<(Gate, After)>,
    started: Vec<bool>,
    loops_left: HashMap<usize, u32>,
    released: bool,
}

impl Walk {
    /// A walk over `unit_count` units, reversed for a backward run.
    pub fn new(unit_count: usize, direction: Direction) -> Self {
        let order = match direction {
            Direction::Forward => (0..unit_count).collect(),
            Direction::Backward => (0..unit_count).rev().collect(),
        };
        Self {
            order,
            cursor: 0,
            gate: None,
            started: vec![false; unit_count],
            loops_left: HashMap::new(),
            released: false,
        }
    }

    /// Every unit has been visited and no hold is pending.
    pub fn is_finished(&self) -> bool {
        self.gate.is_none() && self.cursor >= self.order.len()
    }

    /// Waiting on a script pause.
    pub fn in_script_pause(&self) -> bool {
        matches!(self.gate, Some((Gate::Script { .. }, _)))
    }

    pub fn is_holding(&self) -> bool {
        self.gate.is_some()
    }

    /// Release the current hold on the next step. Returns `false` when the
    /// walk was not holding.
    pub fn release(&mut self) -> bool {
        if self.gate.is_none() {
            return false;
        }
        self.released = true;
        true
    }

    /// Play units until the walk reaches an unsatisfied hold or the end.
    /// Stops early after a loop jump so an instant loop cannot spin forever.
    pub fn advance<R: Rng + ?Sized>(&mut self, step: &mut Step<'_, R>) -> Vec<Signal> {
        let mut signals = Vec::new();
        let direction = step.env.direction;
        loop {
            if let Some((gate, after)) = self.gate {
                let forced = self.released;
                if !forced && !self.gate_open(gate, step) {
                    return signals;
                }
                if matches!(gate, Gate::Script { .. }) && !forced {
                    signals.push(Signal::Resume);
                }
                self.gate = None;
                self.released = false;
                if let After::Loop { at, loops } = after {
                    if self.take_loop(at, loops) {
                        self.cursor = self.loop_target(at, step.units);
                        log::debug!("walk: looping back to position {}", self.cursor);
                        return signals;
                    }
                }
            }

            let Some(&index) = self.order.get(self.cursor) else {
                return signals;
            };
            let at = self.cursor;
            self.cursor += 1;

            let unit = &mut step.units[index];
            if !unit.can_play_in(direction, step.intensity) {
                continue;
            }
            unit.play(step.position, step.intensity, &step.env, &mut *step.rng);
            self.started[index] = true;

            self.gate = match unit.hold() {
                None | Some(Hold::LoopStart) => None,
                Some(Hold::UntilComplete) => Some((Gate::Unit(index), After::Continue)),
                Some(Hold::UntilAllComplete) => {
                    Some((Gate::Started { holder: index }, After::Continue))
                }
                Some(Hold::Script { auto_resume }) => {
                    signals.push(Signal::Pause);
                    let until = auto_resume
                        .map(|delay| step.now + delay.max(0.0) * step.env.duration_multiplier);
                    Some((Gate::Script { until }, After::Continue))
                }
                Some(Hold::Loop { loops }) => {
                    Some((Gate::Started { holder: index }, After::Loop { at, loops }))
                }
            };
        }
    }

    fn gate_open<R: Rng + ?Sized>(&self, gate: Gate, step: &Step<'_, R>) -> bool {
        let stamp = step.env.stamp;
        match gate {
            Gate::Unit(index) => !step.units[index].is_playing(stamp),
            Gate::Started { holder } => step.units.iter().enumerate().all(|(i, unit)| {
                let waited_on =
                    i == holder || (self.started[i] && !unit.timing.exclude_from_holding_pauses);
                !waited_on || !unit.is_playing(stamp)
            }),
            Gate::Script { until } => until.is_some_and(|t| step.now >= t),
        }
    }

    /// Consume one loop for the looper at walk position `at`.
    fn take_loop(&mut self, at: usize, loops: Option<u32>) -> bool {
        let Some(loops) = loops else {
            return true;
        };
        let left = self.loops_left.entry(at).or_insert(loops);
        if *left == 0 {
            return false;
        }
        *left -= 1;
        true
    }

    /// Walk position right after the nearest preceding `LoopStart`, or the
    /// start of the walk.
    fn loop_target(&self, at: usize, units: &[EffectUnit]) -> usize {
        self.order[..at]
            .iter()
            .rposition(|&i| units[i].hold() == Some(Hold::LoopStart))
            .map_or(0, |p| p + 1)
    }
}
