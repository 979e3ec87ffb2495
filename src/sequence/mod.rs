//! Recorded event sequences and their beat-quantized form.
//!
//! A [`Sequence`] is a list of `(track, timestamp)` events, typically captured
//! by a [`SequenceRecorder`]. [`Sequence::quantize`] snaps it onto a beat grid
//! at a target tempo, producing a [`QuantizedSequence`] that a [`Sequencer`]
//! can loop or that an effect unit can follow through a [`SequenceBinding`].

pub mod quantize;
pub mod recorder;
pub mod sequencer;

pub use quantize::{QuantizedSequence, QuantizedTrack};
pub use recorder::SequenceRecorder;
pub use sequencer::{Sequencer, SequencerStep};

use std::rc::Rc;

use serde::{Deserialize, Serialize};

/// Identifies a track within a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackId(pub u32);

/// A track: an id, an optional key that records onto it, and whether it plays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceTrack {
    pub id: TrackId,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl SequenceTrack {
    pub fn new(id: u32) -> Self {
        Self {
            id: TrackId(id),
            key: None,
            active: true,
        }
    }

    /// Bind the track to a recording key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

/// One recorded event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SequenceEvent {
    pub track_id: TrackId,
    /// Seconds from the start of the sequence.
    pub timestamp: f64,
}

impl SequenceEvent {
    pub fn new(track: u32, timestamp: f64) -> Self {
        Self {
            track_id: TrackId(track),
            timestamp,
        }
    }
}

/// A recorded sequence of track events.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Sequence {
    pub name: String,
    pub tracks: Vec<SequenceTrack>,
    pub events: Vec<SequenceEvent>,
    /// Silence appended after the last event.
    pub trailing_silence: f64,
    /// Overrides the computed length when set.
    pub fixed_length: Option<f64>,
}

impl Sequence {
    pub fn new(name: impl Into<String>, tracks: Vec<SequenceTrack>) -> Self {
        Self {
            name: name.into(),
            tracks,
            ..Default::default()
        }
    }

    /// Append events; call `sort` before relying on order.
    pub fn with_events(mut self, events: impl IntoIterator<Item = SequenceEvent>) -> Self {
        self.events.extend(events);
        self
    }

    pub fn with_trailing_silence(mut self, silence: f64) -> Self {
        self.trailing_silence = silence;
        self
    }

    /// Stable-sort events by timestamp; equal timestamps keep insertion order.
    pub fn sort(&mut self) {
        self.events
            .sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    }

    /// Drop events with non-finite timestamps and reset a non-finite
    /// silence or fixed length. Returns `true` if anything changed.
    pub fn sanitize(&mut self) -> bool {
        let before = self.events.len();
        self.events.retain(|e| e.timestamp.is_finite());
        let mut changed = self.events.len() != before;
        if changed {
            log::warn!(
                "sequence '{}': dropped {} events with non-finite timestamps",
                self.name,
                before - self.events.len()
            );
        }
        if !self.trailing_silence.is_finite() {
            log::warn!(
                "sequence '{}': trailing_silence = {} reset to 0",
                self.name,
                self.trailing_silence
            );
            self.trailing_silence = 0.0;
            changed = true;
        }
        if self.fixed_length.is_some_and(|l| !l.is_finite()) {
            log::warn!("sequence '{}': ignoring non-finite fixed_length", self.name);
            self.fixed_length = None;
            changed = true;
        }
        changed
    }

    /// Timestamp of the last event plus the trailing silence. Non-finite
    /// values are left out.
    pub fn compute_length(&self) -> f64 {
        if let Some(length) = self.fixed_length.filter(|l| l.is_finite()) {
            return length.max(0.0);
        }
        let last = self
            .events
            .iter()
            .map(|e| e.timestamp)
            .filter(|t| t.is_finite())
            .fold(0.0f64, f64::max);
        let silence = if self.trailing_silence.is_finite() {
            self.trailing_silence.max(0.0)
        } else {
            0.0
        };
        last + silence
    }

    /// Ids of every declared track, in declaration order.
    pub fn track_ids(&self) -> Vec<TrackId> {
        self.tracks.iter().map(|t| t.id).collect()
    }

    /// Find the track bound to a key.
    pub fn track_for_key(&self, key: &str) -> Option<TrackId> {
        self.tracks
            .iter()
            .find(|t| t.key.as_deref() == Some(key))
            .map(|t| t.id)
    }

    /// Snap every event onto the beat grid of `bpm`.
    pub fn quantize(&self, bpm: f64) -> QuantizedSequence {
        QuantizedSequence::build(self, bpm)
    }

    /// Timestamps of one track's events, in order.
    pub fn cues(&self, track: TrackId) -> Vec<f64> {
        let mut sorted = self.clone();
        sorted.sort();
        sorted
            .events
            .iter()
            .filter(|e| e.track_id == track && e.timestamp.is_finite())
            .map(|e| e.timestamp)
            .collect()
    }
}

/// Binds an effect unit to one track of a shared sequence: the unit fires at
/// each of the track's cues instead of on a repeat loop.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceBinding {
    pub sequence: Rc<Sequence>,
    pub track_id: TrackId,
    pub quantized: bool,
    pub target_bpm: f64,
    cues: Vec<f64>,
    length: f64,
}

impl SequenceBinding {
    /// Follow the original recorded timestamps.
    pub fn original(sequence: Rc<Sequence>, track_id: TrackId) -> Self {
        let cues = sequence.cues(track_id);
        let length = sequence.compute_length();
        Self {
            sequence,
            track_id,
            quantized: false,
            target_bpm: 0.0,
            cues,
            length,
        }
    }

    /// Follow the sequence quantized at `bpm`.
    pub fn quantized(sequence: Rc<Sequence>, track_id: TrackId, bpm: f64) -> Self {
        let grid = sequence.quantize(bpm);
        let cues = grid.cues(track_id);
        let length = grid.length;
        Self {
            sequence,
            track_id,
            quantized: true,
            target_bpm: bpm,
            cues,
            length,
        }
    }

    /// Offsets from the start of the sequence at which the unit fires.
    pub fn cues(&self) -> &[f64] {
        &self.cues
    }

    /// Length of the bound sequence in seconds.
    pub fn duration(&self) -> f64 {
        self.length
    }
}
