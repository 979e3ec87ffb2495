//! Beat quantization: snapping recorded events onto an evenly spaced grid.
//!
//! The grid has `floor(length / beat_duration)` slots. Each event snaps to
//! the nearest slot (ties go to the later slot), and each track gets one
//! row of slots marked with its id where an event landed. Output is a pure
//! function of the events, the tempo and the track list.

use serde::{Deserialize, Serialize};

use super::{Sequence, SequenceEvent, SequenceTrack, TrackId};

/// Upper bound on grid slots; longer sequences are truncated.
pub const MAX_BEATS: usize = 16_384;

/// One beat slot of a quantized track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantizedSlot {
    /// The track's id when an event landed on this slot, else `None`.
    pub track_id: Option<TrackId>,
    pub timestamp: f64,
}

/// A track's row of beat slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizedTrack {
    pub track_id: TrackId,
    pub slots: Vec<QuantizedSlot>,
}

/// A sequence snapped onto a beat grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizedSequence {
    pub name: String,
    pub bpm: f64,
    pub beat_duration: f64,
    /// Length of the source sequence in seconds.
    pub length: f64,
    pub beats: Vec<f64>,
    pub tracks: Vec<QuantizedTrack>,
    source_tracks: Vec<SequenceTrack>,
}

impl QuantizedSequence {
    pub(super) fn build(sequence: &Sequence, bpm: f64) -> Self {
        let mut source = sequence.clone();
        source.sanitize();
        let sequence = &source;
        let length = sequence.compute_length();
        let valid_bpm = bpm.is_finite() && bpm > 0.0;
        if !valid_bpm {
            log::warn!("quantize: bpm {bpm} is not usable, producing an empty grid");
        }
        let beat_duration = if valid_bpm { 60.0 / bpm } else { 0.0 };
        let full_count = if valid_bpm {
            (length / beat_duration).floor()
        } else {
            0.0
        };
        let beat_count = if full_count > MAX_BEATS as f64 {
            log::warn!(
                "quantize: '{}' spans {full_count} beats, truncating to {MAX_BEATS}",
                sequence.name
            );
            MAX_BEATS
        } else {
            full_count as usize
        };
        let truncated = full_count > MAX_BEATS as f64;
        let grid_end = beat_count as f64 * beat_duration;
        let beats: Vec<f64> = (0..beat_count).map(|i| i as f64 * beat_duration).collect();

        let mut sorted = sequence.events.clone();
        sorted.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        let snapped: Vec<(TrackId, usize)> = sorted
            .iter()
            .filter(|e| !truncated || e.timestamp < grid_end)
            .filter_map(|e| nearest_index(&beats, e.timestamp).map(|i| (e.track_id, i)))
            .collect();

        let tracks = sequence
            .tracks
            .iter()
            .map(|track| {
                let mut slots: Vec<QuantizedSlot> = beats
                    .iter()
                    .map(|&timestamp| QuantizedSlot {
                        track_id: None,
                        timestamp,
                    })
                    .collect();
                for &(id, index) in &snapped {
                    if id == track.id {
                        slots[index].track_id = Some(id);
                    }
                }
                QuantizedTrack {
                    track_id: track.id,
                    slots,
                }
            })
            .collect();

        Self {
            name: sequence.name.clone(),
            bpm,
            beat_duration,
            length,
            beats,
            tracks,
            source_tracks: sequence.tracks.clone(),
        }
    }

    /// Number of grid slots.
    pub fn beat_count(&self) -> usize {
        self.beats.len()
    }

    /// The row for one track.
    pub fn track(&self, id: TrackId) -> Option<&QuantizedTrack> {
        self.tracks.iter().find(|t| t.track_id == id)
    }

    /// Timestamps of the marked slots of one track.
    pub fn cues(&self, id: TrackId) -> Vec<f64> {
        self.track(id)
            .map(|t| {
                t.slots
                    .iter()
                    .filter(|s| s.track_id.is_some())
                    .map(|s| s.timestamp)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Tracks marked at a given beat step.
    pub fn tracks_at(&self, step: usize) -> impl Iterator<Item = TrackId> + '_ {
        self.tracks
            .iter()
            .filter_map(move |t| t.slots.get(step).and_then(|s| s.track_id))
    }

    /// Turn the grid back into a sequence of the same length, so that
    /// quantizing it again yields this grid.
    pub fn to_sequence(&self) -> Sequence {
        let mut events: Vec<SequenceEvent> = Vec::new();
        for (step, &timestamp) in self.beats.iter().enumerate() {
            for track in &self.tracks {
                if let Some(id) = track.slots[step].track_id {
                    events.push(SequenceEvent {
                        track_id: id,
                        timestamp,
                    });
                }
            }
        }
        Sequence {
            name: self.name.clone(),
            tracks: self.source_tracks.clone(),
            events,
            trailing_silence: 0.0,
            fixed_length: Some(self.length),
        }
    }
}

/// Index of the beat nearest to `value`; ties resolve to the later beat.
fn nearest_index(beats: &[f64], value: f64) -> Option<usize> {
    if beats.is_empty() {
        return None;
    }
    let upper = beats.partition_point(|&b| b < value);
    if upper == 0 {
        return Some(0);
    }
    if upper == beats.len() {
        return Some(beats.len() - 1);
    }
    if beats[upper] == value {
        return Some(upper);
    }
    let lower = upper - 1;
    if value - beats[lower] < beats[upper] - value {
        Some(lower)
    } else {
        Some(upper)
    }
}
