use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rhythm_core::{
    Channel, Chart, ChartNote, Meter, NoteId, TempoChange, TempoMap, TimedEvents, to_timed_events,
};
use serde::{Deserialize, Serialize};

/// Chart document read by the simulator: a tempo map plus the chart body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartFile {
    #[serde(default)]
    pub title: String,
    pub tempo: TempoMap,
    #[serde(flatten)]
    pub chart: Chart,
}

impl ChartFile {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read chart {}", path.display()))?;
        let file = serde_json::from_str(&content)
            .with_context(|| format!("invalid chart {}", path.display()))?;
        Ok(file)
    }

    pub fn timeline(&self) -> Result<TimedEvents> {
        to_timed_events(&self.chart, &self.tempo)
            .with_context(|| format!("chart '{}' cannot be timed", self.title))
    }

    /// One octave of C major, a beat per note at 90 bpm.
    pub fn c_major_scale() -> Result<Self> {
        let notes = [60.0, 62.0, 64.0, 65.0, 67.0, 69.0, 71.0, 72.0]
            .into_iter()
            .enumerate()
            .map(|(i, midi_pitch)| ChartNote {
                id: NoteId(i as u32 + 1),
                midi_pitch,
                start_beat: 4.0 + i as f64,
                duration_beats: 0.9,
                channel: Channel(0),
            })
            .collect();
        Ok(Self {
            title: "C major scale".to_string(),
            tempo: TempoMap::new(vec![TempoChange {
                at_beat: 0.0,
                bpm: 90.0,
            }])?,
            chart: Chart {
                meter: Meter::default(),
                notes,
                length_beats: Some(16.0),
            },
        })
    }
}
