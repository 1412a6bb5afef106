//! Pitch axis of the highway: MIDI pitch to vertical pixels.

use rhythm_core::TimedNote;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::HighwayError;

pub const MIN_MIDI: f64 = 0.0;
pub const MAX_MIDI: f64 = 127.0;
/// Narrowest pitch range derived from a note set, one octave.
pub const MIN_SPAN_SEMITONES: f64 = 12.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighwayViewport {
    pub width: f64,
    pub height: f64,
    pub min_midi: f64,
    pub max_midi: f64,
    /// Headroom added above and below the notes by `fit_to_notes`.
    pub pitch_margin_semitones: f64,
}

impl Default for HighwayViewport {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 400.0,
            min_midi: 48.0,
            max_midi: 72.0,
            pitch_margin_semitones: 2.0,
        }
    }
}

/// Owns the viewport and keeps `min_midi < max_midi` inside the MIDI range.
#[derive(Debug, Clone, Default)]
pub struct ViewportModel {
    viewport: HighwayViewport,
}

impl ViewportModel {
    pub fn new(viewport: HighwayViewport) -> Result<Self, HighwayError> {
        let mut model = Self::default();
        model.set_size(viewport.width, viewport.height)?;
        model.set_pitch_margin(viewport.pitch_margin_semitones);
        model.set_midi_range(viewport.min_midi, viewport.max_midi);
        Ok(model)
    }

    pub fn viewport(&self) -> &HighwayViewport {
        &self.viewport
    }

    pub fn set_size(&mut self, width: f64, height: f64) -> Result<(), HighwayError> {
        let width = HighwayError::check_positive("viewport width", width)?;
        let height = HighwayError::check_positive("viewport height", height)?;
        self.viewport.width = width;
        self.viewport.height = height;
        Ok(())
    }

    /// Sets the visible pitch range, repairing it when invalid: both ends are
    /// clamped to the MIDI range and an inverted or empty range becomes one
    /// semitone wide. Non-finite input leaves the range unchanged.
    pub fn set_midi_range(&mut self, min_midi: f64, max_midi: f64) {
        if !min_midi.is_finite() || !max_midi.is_finite() {
            debug!(min_midi, max_midi, "non-finite pitch range ignored");
            return;
        }
        let mut min = min_midi.clamp(MIN_MIDI, MAX_MIDI);
        let mut max = max_midi.clamp(MIN_MIDI, MAX_MIDI);
        if min >= max {
            max = min + 1.0;
            if max > MAX_MIDI {
                max = MAX_MIDI;
                min = MAX_MIDI - 1.0;
            }
            debug!(min_midi, max_midi, min, max, "pitch range corrected");
        }
        self.viewport.min_midi = min;
        self.viewport.max_midi = max;
    }

    pub fn set_pitch_margin(&mut self, semitones: f64) {
        self.viewport.pitch_margin_semitones = if semitones.is_finite() {
            semitones.max(0.0)
        } else {
            0.0
        };
    }

    /// Fits the pitch range around `notes` with the configured margin.
    pub fn fit_to_notes(&mut self, notes: &[TimedNote]) -> Result<(), HighwayError> {
        let (min, max) =
            calculate_midi_range_from_notes(notes, self.viewport.pitch_margin_semitones)?;
        self.set_midi_range(min, max);
        Ok(())
    }

    /// Pixels per semitone.
    pub fn row_height(&self) -> f64 {
        self.viewport.height / (self.viewport.max_midi - self.viewport.min_midi)
    }

    /// Higher pitches map to smaller y; `max_midi` sits at y = 0.
    pub fn midi_to_y(&self, midi: f64) -> f64 {
        (self.viewport.max_midi - midi) * self.row_height()
    }

    pub fn y_to_midi(&self, y: f64) -> f64 {
        self.viewport.max_midi - y / self.row_height()
    }
}

/// Whole-semitone range covering `notes` plus `margin_semitones` on each
/// side, clamped to the MIDI range and at least [`MIN_SPAN_SEMITONES`] wide.
pub fn calculate_midi_range_from_notes(
    notes: &[TimedNote],
    margin_semitones: f64,
) -> Result<(f64, f64), HighwayError> {
    let (lowest, highest) = notes
        .iter()
        .map(|n| n.midi_pitch)
        .filter(|p| p.is_finite())
        .fold(None, |range: Option<(f64, f64)>, p| match range {
            None => Some((p, p)),
            Some((lo, hi)) => Some((lo.min(p), hi.max(p))),
        })
        .ok_or(HighwayError::EmptyInput)?;

    let margin = if margin_semitones.is_finite() {
        margin_semitones.max(0.0)
    } else {
        0.0
    };
    let mut min = (lowest - margin).floor().clamp(MIN_MIDI, MAX_MIDI);
    let mut max = (highest + margin).ceil().clamp(MIN_MIDI, MAX_MIDI);

    let span = max - min;
    if span < MIN_SPAN_SEMITONES {
        min -= ((MIN_SPAN_SEMITONES - span) / 2.0).floor();
        max = min + MIN_SPAN_SEMITONES;
        if min < MIN_MIDI {
            min = MIN_MIDI;
            max = MIN_MIDI + MIN_SPAN_SEMITONES;
        } else if max > MAX_MIDI {
            max = MAX_MIDI;
            min = MAX_MIDI - MIN_SPAN_SEMITONES;
        }
    }
    Ok((min, max))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rhythm_core::{Channel, NoteId};

    fn at_pitch(midi: f64) -> TimedNote {
        TimedNote {
            id: NoteId(0),
            midi_pitch: midi,
            start_time_ms: 0.0,
            duration_ms: 100.0,
            channel: Channel(0),
        }
    }

    #[test]
    fn inverted_range_is_repaired() {
        let mut model = ViewportModel::default();
        model.set_midi_range(70.0, 60.0);
        assert_eq!((model.viewport().min_midi, model.viewport().max_midi), (70.0, 71.0));

        model.set_midi_range(127.0, 127.0);
        assert_eq!((model.viewport().min_midi, model.viewport().max_midi), (126.0, 127.0));

        model.set_midi_range(-20.0, 300.0);
        assert_eq!((model.viewport().min_midi, model.viewport().max_midi), (0.0, 127.0));
    }

    #[test]
    fn higher_pitch_is_higher_on_screen() {
        let model = ViewportModel::new(HighwayViewport {
            height: 240.0,
            min_midi: 60.0,
            max_midi: 72.0,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(model.row_height(), 20.0);
        assert_eq!(model.midi_to_y(72.0), 0.0);
        assert_eq!(model.midi_to_y(60.0), 240.0);
        assert!(model.midi_to_y(67.0) < model.midi_to_y(64.0));
        assert_eq!(model.y_to_midi(120.0), 66.0);
    }

    #[test]
    fn rejects_bad_size() {
        let mut model = ViewportModel::default();
        assert!(matches!(
            model.set_size(0.0, 100.0),
            Err(HighwayError::InvalidDimension { .. })
        ));
        assert!(model.set_size(100.0, f64::NAN).is_err());
        assert_eq!(model.viewport().width, 800.0);
    }

    #[test]
    fn range_from_notes() {
        assert_eq!(
            calculate_midi_range_from_notes(&[], 2.0),
            Err(HighwayError::EmptyInput)
        );
        let wide = [at_pitch(50.5), at_pitch(70.2)];
        assert_eq!(calculate_midi_range_from_notes(&wide, 2.0), Ok((48.0, 73.0)));

        // single pitch widened to an octave around it
        assert_eq!(calculate_midi_range_from_notes(&[at_pitch(60.0)], 0.0), Ok((54.0, 66.0)));

        // widening shifts back inside the MIDI range
        assert_eq!(calculate_midi_range_from_notes(&[at_pitch(1.0)], 1.0), Ok((0.0, 12.0)));
        assert_eq!(
            calculate_midi_range_from_notes(&[at_pitch(126.0)], 0.0),
            Ok((115.0, 127.0))
        );
    }

    #[test]
    fn fit_keeps_range_on_empty_input() {
        let mut model = ViewportModel::default();
        assert!(model.fit_to_notes(&[]).is_err());
        assert_eq!(model.viewport().min_midi, 48.0);
        model.fit_to_notes(&[at_pitch(40.0), at_pitch(64.0)]).unwrap();
        assert_eq!((model.viewport().min_midi, model.viewport().max_midi), (38.0, 66.0));
    }
}
