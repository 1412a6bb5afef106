use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a target note, unique within one chart.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NoteId(pub u32);

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Independent judgment channel (voice, hand, or singer).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Channel(pub u8);

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch{}", self.0)
    }
}

/// A beat boundary on the grid, in session milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimedBeat {
    /// Ordinal of this beat in the beat list.
    pub index: usize,
    pub time_ms: f64,
    pub is_measure_start: bool,
    pub is_macrobeat: bool,
}

/// A target note with absolute timing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimedNote {
    pub id: NoteId,
    /// Target pitch; fractional values address microtones.
    pub midi_pitch: f64,
    pub start_time_ms: f64,
    pub duration_ms: f64,
    #[serde(default)]
    pub channel: Channel,
}

impl TimedNote {
    pub fn end_time_ms(&self) -> f64 {
        self.start_time_ms + self.duration_ms
    }

    /// Whether this note overlaps `[from_ms, to_ms]`.
    pub fn overlaps(&self, from_ms: f64, to_ms: f64) -> bool {
        self.start_time_ms <= to_ms && self.end_time_ms() >= from_ms
    }
}

/// One pitch-detector reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchSample {
    pub time_ms: f64,
    /// `None` when the detector heard nothing voiced.
    pub midi_pitch: Option<f64>,
    pub clarity: f64,
    #[serde(default)]
    pub channel: Channel,
}

impl PitchSample {
    pub fn new(time_ms: f64, midi_pitch: Option<f64>, clarity: f64) -> Self {
        Self {
            time_ms,
            midi_pitch,
            clarity: clarity.clamp(0.0, 1.0),
            channel: Channel::default(),
        }
    }

    pub fn unvoiced(time_ms: f64) -> Self {
        Self::new(time_ms, None, 0.0)
    }

    pub fn on_channel(mut self, channel: Channel) -> Self {
        self.channel = channel;
        self
    }
}

/// Outcome of judging one target note. Immutable once produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NotePerformance {
    pub note_id: NoteId,
    pub channel: Channel,
    pub hit: bool,
    /// Mean signed deviation of the in-tolerance samples, in cents.
    pub accuracy_cents: Option<f64>,
    /// First in-tolerance sample time relative to the note start.
    pub timing_offset_ms: Option<f64>,
    /// Voiced samples received over samples expected for the note length, in [0, 1].
    pub sampled_duration_ratio: f64,
    /// Mean signed deviation of every voiced sample, in or out of tolerance.
    pub raw_deviation_cents: Option<f64>,
}

/// Beats and notes of a chart on the session clock.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimedEvents {
    pub beats: Vec<TimedBeat>,
    pub notes: Vec<TimedNote>,
}

impl TimedEvents {
    /// Builds a timeline from notes alone, sorting them by start time.
    pub fn from_notes(mut notes: Vec<TimedNote>) -> Self {
        sort_notes(&mut notes);
        Self {
            beats: Vec::new(),
            notes,
        }
    }

    /// End of the last note, or 0 for an empty timeline.
    pub fn end_time_ms(&self) -> f64 {
        self.notes
            .iter()
            .map(TimedNote::end_time_ms)
            .fold(0.0, f64::max)
    }
}

pub(crate) fn sort_notes(notes: &mut [TimedNote]) {
    notes.sort_by(|a, b| {
        a.start_time_ms
            .total_cmp(&b.start_time_ms)
            .then(a.channel.cmp(&b.channel))
            .then(a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(id: u32, start: f64, duration: f64, channel: u8) -> TimedNote {
        TimedNote {
            id: NoteId(id),
            midi_pitch: 60.0,
            start_time_ms: start,
            duration_ms: duration,
            channel: Channel(channel),
        }
    }

    #[test]
    fn note_overlap_is_inclusive() {
        let n = note(1, 1000.0, 500.0, 0);
        assert!(n.overlaps(1500.0, 2000.0));
        assert!(n.overlaps(0.0, 1000.0));
        assert!(!n.overlaps(1500.1, 2000.0));
        assert!(!n.overlaps(0.0, 999.9));
    }

    #[test]
    fn sample_clarity_is_clamped() {
        assert_eq!(PitchSample::new(0.0, Some(60.0), 1.7).clarity, 1.0);
        assert_eq!(PitchSample::new(0.0, Some(60.0), -0.2).clarity, 0.0);
    }

    #[test]
    fn from_notes_sorts_by_start_then_channel() {
        let events = TimedEvents::from_notes(vec![
            note(3, 2000.0, 100.0, 0),
            note(2, 1000.0, 100.0, 1),
            note(1, 1000.0, 100.0, 0),
        ]);
        let ids: Vec<u32> = events.notes.iter().map(|n| n.id.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!((events.end_time_ms() - 2100.0).abs() < 1e-9);
    }

    #[test]
    fn ids_serialize_transparently() {
        let json = serde_json::to_string(&note(7, 0.0, 10.0, 2)).unwrap();
        assert!(json.contains("\"id\":7"));
        assert!(json.contains("\"channel\":2"));
    }
}
