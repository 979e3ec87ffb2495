//! Sequence recorder: captures track hits relative to a recording start.

use super::{Sequence, SequenceEvent, SequenceTrack, TrackId};

/// Records `(track, timestamp)` events while armed.
#[derive(Debug, Clone)]
pub struct SequenceRecorder {
    name: String,
    tracks: Vec<SequenceTrack>,
    events: Vec<SequenceEvent>,
    started_at: Option<f64>,
}

impl SequenceRecorder {
    pub fn new(name: impl Into<String>, tracks: Vec<SequenceTrack>) -> Self {
        Self {
            name: name.into(),
            tracks,
            events: Vec::new(),
            started_at: None,
        }
    }

    /// Between `start` and `finish`.
    pub fn is_recording(&self) -> bool {
        self.started_at.is_some()
    }

    /// Arm the recorder at feedback time `now`, discarding earlier takes.
    pub fn start(&mut self, now: f64) {
        self.events.clear();
        self.started_at = Some(now);
    }

    /// Record a hit on `track`. Ignored when not recording or when the track
    /// is unknown or inactive.
    pub fn record(&mut self, track: TrackId, now: f64) -> bool {
        let Some(start) = self.started_at else {
            return false;
        };
        if !self.tracks.iter().any(|t| t.id == track && t.active) {
            log::debug!("recorder '{}': ignoring hit on track {:?}", self.name, track);
            return false;
        }
        self.events.push(SequenceEvent {
            track_id: track,
            timestamp: (now - start).max(0.0),
        });
        true
    }

    /// Record a hit on whichever track is bound to `key`.
    pub fn record_key(&mut self, key: &str, now: f64) -> bool {
        let track = self
            .tracks
            .iter()
            .find(|t| t.key.as_deref() == Some(key))
            .map(|t| t.id);
        match track {
            Some(id) => self.record(id, now),
            None => false,
        }
    }

    /// Events captured so far, relative to the start.
    pub fn events(&self) -> &[SequenceEvent] {
        &self.events
    }

    /// Stop recording at `now` and return the take. The time between the last
    /// hit and `now` becomes trailing silence.
    pub fn finish(&mut self, now: f64) -> Sequence {
        let start = self.started_at.take().unwrap_or(now);
        let mut sequence = Sequence::new(self.name.clone(), self.tracks.clone())
            .with_events(std::mem::take(&mut self.events));
        sequence.sort();
        let last = sequence.events.last().map_or(0.0, |e| e.timestamp);
        sequence.trailing_silence = ((now - start) - last).max(0.0);
        sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn recorder() -> SequenceRecorder {
        let mut inactive = SequenceTrack::new(2);
        inactive.active = false;
        SequenceRecorder::new(
            "take",
            vec![
                SequenceTrack::new(0).with_key("a"),
                SequenceTrack::new(1).with_key("s"),
                inactive,
            ],
        )
    }

    #[test]
    fn ignores_hits_when_not_recording() {
        let mut r = recorder();
        assert!(!r.record(TrackId(0), 1.0));
        assert!(r.events().is_empty());
    }

    #[test]
    fn records_relative_timestamps() {
        let mut r = recorder();
        r.start(10.0);
        assert!(r.record(TrackId(0), 10.5));
        assert!(r.record_key("s", 11.0));
        assert_eq!(r.events().len(), 2);
        assert_approx_eq!(r.events()[0].timestamp, 0.5);
        assert_approx_eq!(r.events()[1].timestamp, 1.0);
    }

    #[test]
    fn ignores_unknown_and_inactive_tracks() {
        let mut r = recorder();
        r.start(0.0);
        assert!(!r.record(TrackId(2), 0.1));
        assert!(!r.record(TrackId(7), 0.1));
        assert!(!r.record_key("z", 0.1));
    }

    #[test]
    fn finish_computes_trailing_silence() {
        let mut r = recorder();
        r.start(0.0);
        r.record(TrackId(1), 1.0);
        r.record(TrackId(0), 0.5);
        let seq = r.finish(3.0);
        assert!(!r.is_recording());
        assert_eq!(seq.events[0].track_id, TrackId(0));
        assert_approx_eq!(seq.trailing_silence, 2.0);
        assert_approx_eq!(seq.compute_length(), 3.0);
    }

    #[test]
    fn restart_discards_previous_take() {
        let mut r = recorder();
        r.start(0.0);
        r.record(TrackId(0), 0.5);
        r.start(1.0);
        assert!(r.events().is_empty());
    }
}
