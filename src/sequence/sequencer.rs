//! Beat sequencer: steps through a quantized grid at a tempo.
//!
//! The host advances it with frame deltas, like any other feedback clock, and
//! receives the tracks that fire on each beat step it crossed. Which feedbacks
//! those tracks trigger is up to the host.

use std::collections::HashSet;

use super::{QuantizedSequence, Sequence, TrackId};

/// The tracks that fired on one beat step.
#[derive(Debug, Clone, PartialEq)]
pub struct SequencerStep {
    pub step: usize,
    pub tracks: Vec<TrackId>,
}

/// Loops (or plays once) a quantized sequence.
#[derive(Debug, Clone)]
pub struct Sequencer {
    grid: QuantizedSequence,
    looping: bool,
    playing: bool,
    step: usize,
    elapsed: f64,
    next_step_at: f64,
    muted: HashSet<TrackId>,
}

impl Sequencer {
    /// Quantize `sequence` at `bpm` and prepare to play it.
    pub fn new(sequence: &Sequence, bpm: f64) -> Self {
        let muted = sequence
            .tracks
            .iter()
            .filter(|t| !t.active)
            .map(|t| t.id)
            .collect();
        Self {
            grid: sequence.quantize(bpm),
            looping: true,
            playing: false,
            step: 0,
            elapsed: 0.0,
            next_step_at: 0.0,
            muted,
        }
    }

    /// Loop back to step 0 after the last step.
    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn grid(&self) -> &QuantizedSequence {
        &self.grid
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Current step index (the next one to fire).
    pub fn step(&self) -> usize {
        self.step
    }

    /// Start from the first step; it fires on the next tick.
    pub fn play(&mut self) {
        if self.grid.beat_count() == 0 {
            log::debug!("sequencer '{}': empty grid, not starting", self.grid.name);
            return;
        }
        self.playing = true;
        self.step = 0;
        self.elapsed = 0.0;
        self.next_step_at = 0.0;
    }

    /// Stop stepping; `play` starts again from step 0.
    pub fn stop(&mut self) {
        self.playing = false;
    }

    /// Enable or disable a track. Returns `false` if the grid has no such track.
    pub fn set_track_active(&mut self, id: TrackId, active: bool) -> bool {
        if self.grid.track(id).is_none() {
            return false;
        }
        if active {
            self.muted.remove(&id);
        } else {
            self.muted.insert(id);
        }
        true
    }

    /// Whether a track fires; tracks start active.
    pub fn is_track_active(&self, id: TrackId) -> bool {
        !self.muted.contains(&id)
    }

    /// Advance by `delta` seconds and return every step crossed.
    pub fn tick(&mut self, delta: f64) -> Vec<SequencerStep> {
        let mut fired = Vec::new();
        if !self.playing {
            return fired;
        }
        if delta.is_finite() && delta > 0.0 {
            self.elapsed += delta;
        }
        while self.playing && self.elapsed >= self.next_step_at {
            let tracks: Vec<TrackId> = self
                .grid
                .tracks_at(self.step)
                .filter(|id| !self.muted.contains(id))
                .collect();
            fired.push(SequencerStep {
                step: self.step,
                tracks,
            });
            self.step += 1;
            self.next_step_at += self.grid.beat_duration;
            if self.step >= self.grid.beat_count() {
                if self.looping {
                    self.step = 0;
                } else {
                    self.playing = false;
                }
            }
        }
        fired
    }
}
