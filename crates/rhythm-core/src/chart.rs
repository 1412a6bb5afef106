//! Chart adapter: symbolic beat positions to absolute session milliseconds.
//!
//! `to_timed_events` is a pure function of its inputs. Tempo changes are
//! integrated piecewise, so a change that lands inside a note stretches or
//! shrinks the note's duration but never moves its start.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::ChartError;
use crate::model::{Channel, NoteId, TimedBeat, TimedEvents, TimedNote, sort_notes};

const MS_PER_MINUTE: f64 = 60_000.0;

/// Tolerance for treating beat positions as coincident.
const BEAT_EPSILON: f64 = 1e-9;

/// Overlap tolerance for already timed notes, one microsecond.
const MS_EPSILON: f64 = 1e-3;

/// Longest beat grid a chart may ask for.
pub const MAX_GRID_BEATS: f64 = 100_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoChange {
    pub at_beat: f64,
    pub bpm: f64,
}

/// Validated, ordered tempo changes with precomputed segment start times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<TempoChange>", into = "Vec<TempoChange>")]
pub struct TempoMap {
    changes: Vec<TempoChange>,
    start_ms: Vec<f64>,
}

impl TempoMap {
    pub fn new(mut changes: Vec<TempoChange>) -> Result<Self, ChartError> {
        if changes.is_empty() {
            return Err(ChartError::EmptyTempoMap);
        }
        for change in &changes {
            if !change.at_beat.is_finite() || !change.bpm.is_finite() || change.bpm <= 0.0 {
                return Err(ChartError::InvalidTempo {
                    at_beat: change.at_beat,
                    bpm: change.bpm,
                });
            }
        }

        // Stable sort, then keep the last change written for any one beat.
        changes.sort_by(|a, b| a.at_beat.total_cmp(&b.at_beat));
        let mut deduped: Vec<TempoChange> = Vec::with_capacity(changes.len());
        for change in changes {
            match deduped.last_mut() {
                Some(last) if (last.at_beat - change.at_beat).abs() < BEAT_EPSILON => {
                    *last = change;
                }
                _ => deduped.push(change),
            }
        }

        let first_beat = deduped[0].at_beat;
        if first_beat.abs() >= BEAT_EPSILON {
            return Err(ChartError::MissingInitialTempo { first_beat });
        }
        deduped[0].at_beat = 0.0;

        let mut start_ms = Vec::with_capacity(deduped.len());
        let mut current = 0.0;
        for (i, change) in deduped.iter().enumerate() {
            if i > 0 {
                let prev = deduped[i - 1];
                current += (change.at_beat - prev.at_beat) * MS_PER_MINUTE / prev.bpm;
            }
            start_ms.push(current);
        }

        Ok(Self {
            changes: deduped,
            start_ms,
        })
    }

    /// A single tempo for the whole chart.
    pub fn constant(bpm: f64) -> Result<Self, ChartError> {
        Self::new(vec![TempoChange { at_beat: 0.0, bpm }])
    }

    pub fn changes(&self) -> &[TempoChange] {
        &self.changes
    }

    pub fn beat_to_ms(&self, beat: f64) -> f64 {
        let index = self.segment_for_beat(beat);
        let change = self.changes[index];
        self.start_ms[index] + (beat - change.at_beat) * MS_PER_MINUTE / change.bpm
    }

    pub fn ms_to_beat(&self, ms: f64) -> f64 {
        let index = self.start_ms.partition_point(|&t| t <= ms).saturating_sub(1);
        let change = self.changes[index];
        change.at_beat + (ms - self.start_ms[index]) * change.bpm / MS_PER_MINUTE
    }

    pub fn bpm_at(&self, beat: f64) -> f64 {
        self.changes[self.segment_for_beat(beat)].bpm
    }

    fn segment_for_beat(&self, beat: f64) -> usize {
        self.changes
            .partition_point(|c| c.at_beat <= beat)
            .saturating_sub(1)
    }
}

impl TryFrom<Vec<TempoChange>> for TempoMap {
    type Error = ChartError;

    fn try_from(changes: Vec<TempoChange>) -> Result<Self, Self::Error> {
        Self::new(changes)
    }
}

impl From<TempoMap> for Vec<TempoChange> {
    fn from(map: TempoMap) -> Self {
        map.changes
    }
}

/// Beat grouping of one measure, e.g. `[2, 2]` or `[3, 3]`.
/// Each grouping starts a macrobeat; their sum is the measure length in beats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meter {
    pub groupings: Vec<u32>,
}

impl Meter {
    /// Measure length in beats; `None` when the groupings overflow `u32`.
    pub fn beats_per_measure(&self) -> Option<u32> {
        self.groupings
            .iter()
            .try_fold(0u32, |total, &g| total.checked_add(g))
    }

    fn validate(&self) -> Result<u32, ChartError> {
        if self.groupings.is_empty() {
            return Err(ChartError::InvalidMeter("no beat groupings".to_string()));
        }
        if self.groupings.contains(&0) {
            return Err(ChartError::InvalidMeter(format!(
                "empty grouping in {:?}",
                self.groupings
            )));
        }
        self.beats_per_measure().ok_or_else(|| {
            ChartError::InvalidMeter(format!("measure of {:?} is too long", self.groupings))
        })
    }

    /// Beat offsets within a measure that start a macrobeat.
    fn macrobeat_offsets(&self) -> HashSet<u32> {
        let mut offset = 0u32;
        self.groupings
            .iter()
            .map(|&g| {
                let start = offset;
                offset = offset.saturating_add(g);
                start
            })
            .collect()
    }
}

impl Default for Meter {
    fn default() -> Self {
        Self {
            groupings: vec![1, 1, 1, 1],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartNote {
    pub id: NoteId,
    pub midi_pitch: f64,
    pub start_beat: f64,
    pub duration_beats: f64,
    #[serde(default)]
    pub channel: Channel,
}

impl ChartNote {
    pub fn end_beat(&self) -> f64 {
        self.start_beat + self.duration_beats
    }
}

/// An already-parsed chart in beat units.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Chart {
    #[serde(default)]
    pub meter: Meter,
    pub notes: Vec<ChartNote>,
    /// Grid length; defaults to the end of the last note rounded up.
    #[serde(default)]
    pub length_beats: Option<f64>,
}

/// Converts a chart into absolutely timed beats and notes.
pub fn to_timed_events(chart: &Chart, tempo_map: &TempoMap) -> Result<TimedEvents, ChartError> {
    let per_measure = chart.meter.validate()?;
    validate_notes(&chart.notes)?;

    let mut notes: Vec<TimedNote> = chart
        .notes
        .iter()
        .map(|n| {
            let start_time_ms = tempo_map.beat_to_ms(n.start_beat);
            TimedNote {
                id: n.id,
                midi_pitch: n.midi_pitch,
                start_time_ms,
                duration_ms: tempo_map.beat_to_ms(n.end_beat()) - start_time_ms,
                channel: n.channel,
            }
        })
        .collect();
    sort_notes(&mut notes);

    let length_beats = chart.length_beats.or_else(|| {
        chart
            .notes
            .iter()
            .map(ChartNote::end_beat)
            .reduce(f64::max)
            .map(f64::ceil)
    });
    let beats = match length_beats {
        Some(length) => {
            if !(length.is_finite() && length > 0.0 && length <= MAX_GRID_BEATS) {
                return Err(ChartError::InvalidGridLength(length));
            }
            build_beats(&chart.meter, per_measure, length, tempo_map)
        }
        None => Vec::new(),
    };

    Ok(TimedEvents { beats, notes })
}

/// Checks the invariants of an already timed note list: positive durations,
/// unique ids, and no overlap within a channel.
pub fn validate_timed_notes(notes: &[TimedNote]) -> Result<(), ChartError> {
    let mut seen = HashSet::with_capacity(notes.len());
    let mut by_channel: BTreeMap<Channel, Vec<&TimedNote>> = BTreeMap::new();

    for note in notes {
        let timing_ok = note.midi_pitch.is_finite()
            && note.start_time_ms.is_finite()
            && note.duration_ms.is_finite()
            && note.duration_ms > 0.0;
        if !timing_ok {
            return Err(ChartError::InvalidTimedNote {
                id: note.id,
                start_time_ms: note.start_time_ms,
                duration_ms: note.duration_ms,
            });
        }
        if !seen.insert(note.id) {
            return Err(ChartError::DuplicateNoteId(note.id));
        }
        by_channel.entry(note.channel).or_default().push(note);
    }

    for (channel, mut lane) in by_channel {
        lane.sort_by(|a, b| a.start_time_ms.total_cmp(&b.start_time_ms));
        for pair in lane.windows(2) {
            if pair[1].start_time_ms < pair[0].end_time_ms() - MS_EPSILON {
                return Err(ChartError::OverlappingNotes {
                    channel,
                    first: pair[0].id,
                    second: pair[1].id,
                });
            }
        }
    }
    Ok(())
}

fn build_beats(
    meter: &Meter,
    per_measure: u32,
    length_beats: f64,
    tempo_map: &TempoMap,
) -> Vec<TimedBeat> {
    let macrobeats = meter.macrobeat_offsets();
    let last = length_beats.floor() as u32;
    (0..=last)
        .map(|beat| {
            let offset = beat % per_measure;
            TimedBeat {
                index: beat as usize,
                time_ms: tempo_map.beat_to_ms(beat as f64),
                is_measure_start: offset == 0,
                is_macrobeat: macrobeats.contains(&offset),
            }
        })
        .collect()
}

fn validate_notes(notes: &[ChartNote]) -> Result<(), ChartError> {
    let mut seen = HashSet::with_capacity(notes.len());
    let mut by_channel: BTreeMap<Channel, Vec<&ChartNote>> = BTreeMap::new();

    for note in notes {
        let timing_ok = note.start_beat.is_finite()
            && note.start_beat >= 0.0
            && note.duration_beats.is_finite()
            && note.duration_beats > 0.0;
        if !timing_ok {
            return Err(ChartError::InvalidNoteTiming {
                id: note.id,
                start_beat: note.start_beat,
                duration_beats: note.duration_beats,
            });
        }
        if !seen.insert(note.id) {
            return Err(ChartError::DuplicateNoteId(note.id));
        }
        by_channel.entry(note.channel).or_default().push(note);
    }

    for (channel, mut lane) in by_channel {
        lane.sort_by(|a, b| a.start_beat.total_cmp(&b.start_beat));
        for pair in lane.windows(2) {
            if pair[1].start_beat < pair[0].end_beat() - BEAT_EPSILON {
                return Err(ChartError::OverlappingNotes {
                    channel,
                    first: pair[0].id,
                    second: pair[1].id,
                });
            }
        }
    }
    Ok(())
}
