//! Time axis of the highway.
//!
//! Notes scroll right to left. The judgment line sits at a fixed fraction of
//! the viewport width and the right edge shows `visible_ahead_ms` of future.

use rhythm_core::TimedNote;
use serde::{Deserialize, Serialize};

use crate::error::HighwayError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollSettings {
    pub viewport_width: f64,
    /// Judgment line position as a share of the width, in `[0, 1)`.
    pub judgment_line_fraction: f64,
    pub visible_ahead_ms: f64,
}

impl Default for ScrollSettings {
    fn default() -> Self {
        Self {
            viewport_width: 800.0,
            judgment_line_fraction: 0.2,
            visible_ahead_ms: 4000.0,
        }
    }
}

/// Values derived from [`ScrollSettings`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScrollConfig {
    pub pixels_per_ms: f64,
    pub judgment_line_x: f64,
    pub viewport_width: f64,
}

#[derive(Debug, Clone)]
pub struct ScrollModel {
    settings: ScrollSettings,
    config: ScrollConfig,
}

impl ScrollModel {
    pub fn new(settings: ScrollSettings) -> Result<Self, HighwayError> {
        let config = derive(&settings)?;
        Ok(Self { settings, config })
    }

    pub fn settings(&self) -> &ScrollSettings {
        &self.settings
    }

    pub fn config(&self) -> &ScrollConfig {
        &self.config
    }

    pub fn pixels_per_ms(&self) -> f64 {
        self.config.pixels_per_ms
    }

    pub fn judgment_line_x(&self) -> f64 {
        self.config.judgment_line_x
    }

    pub fn set_viewport_width(&mut self, width: f64) -> Result<(), HighwayError> {
        let settings = ScrollSettings {
            viewport_width: width,
            ..self.settings
        };
        self.config = derive(&settings)?;
        self.settings = settings;
        Ok(())
    }

    pub fn time_to_x(&self, time_ms: f64, now_ms: f64) -> f64 {
        self.config.judgment_line_x + (time_ms - now_ms) * self.config.pixels_per_ms
    }

    pub fn x_to_time(&self, x: f64, now_ms: f64) -> f64 {
        now_ms + (x - self.config.judgment_line_x) / self.config.pixels_per_ms
    }

    /// Session times at the left and right edges of the viewport.
    pub fn get_visible_time_range(&self, now_ms: f64) -> (f64, f64) {
        (
            self.x_to_time(0.0, now_ms),
            self.x_to_time(self.config.viewport_width, now_ms),
        )
    }

    /// Notes with any part on screen, in input order.
    pub fn visible_notes<'a>(&self, notes: &'a [TimedNote], now_ms: f64) -> Vec<&'a TimedNote> {
        let (from, to) = self.get_visible_time_range(now_ms);
        notes.iter().filter(|n| n.overlaps(from, to)).collect()
    }

    pub fn duration_to_width(&self, duration_ms: f64) -> f64 {
        duration_ms * self.config.pixels_per_ms
    }
}

fn derive(settings: &ScrollSettings) -> Result<ScrollConfig, HighwayError> {
    let width = HighwayError::check_positive("viewport width", settings.viewport_width)?;
    let ahead = HighwayError::check_positive("visible ahead window", settings.visible_ahead_ms)?;
    let fraction = settings.judgment_line_fraction;
    if !(0.0..1.0).contains(&fraction) {
        return Err(HighwayError::InvalidDimension {
            name: "judgment line fraction",
            value: fraction,
        });
    }
    let judgment_line_x = width * fraction;
    Ok(ScrollConfig {
        pixels_per_ms: (width - judgment_line_x) / ahead,
        judgment_line_x,
        viewport_width: width,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rhythm_core::{Channel, NoteId};

    fn model() -> ScrollModel {
        ScrollModel::new(ScrollSettings {
            viewport_width: 1000.0,
            judgment_line_fraction: 0.2,
            visible_ahead_ms: 4000.0,
        })
        .unwrap()
    }

    fn note(id: u32, start: f64, duration: f64) -> TimedNote {
        TimedNote {
            id: NoteId(id),
            midi_pitch: 60.0,
            start_time_ms: start,
            duration_ms: duration,
            channel: Channel(0),
        }
    }

    #[test]
    fn derives_speed_from_settings() {
        let scroll = model();
        assert_eq!(scroll.judgment_line_x(), 200.0);
        assert_eq!(scroll.pixels_per_ms(), 0.2);
        assert_eq!(scroll.time_to_x(5000.0, 5000.0), 200.0);
        assert_eq!(scroll.time_to_x(9000.0, 5000.0), 1000.0);
        assert_eq!(scroll.duration_to_width(500.0), 100.0);
    }

    #[test]
    fn notes_move_left_as_time_passes() {
        let scroll = model();
        assert!(scroll.time_to_x(3000.0, 1000.0) < scroll.time_to_x(3000.0, 0.0));
    }

    #[test]
    fn visible_range_covers_viewport() {
        let (from, to) = model().get_visible_time_range(10_000.0);
        assert!((from - 9000.0).abs() < 1e-9);
        assert!((to - 14_000.0).abs() < 1e-9);
    }

    #[test]
    fn filters_notes_by_overlap() {
        let notes = [
            note(1, 8000.0, 500.0),
            note(2, 8800.0, 500.0),
            note(3, 12_000.0, 100.0),
            note(4, 13_900.0, 200.0),
            note(5, 14_100.0, 100.0),
        ];
        let ids: Vec<u32> = model()
            .visible_notes(&notes, 10_000.0)
            .iter()
            .map(|n| n.id.0)
            .collect();
        assert_eq!(ids, vec![2, 3, 4]);
    }

    #[test]
    fn rejects_invalid_settings() {
        let bad_fraction = ScrollSettings {
            judgment_line_fraction: 1.0,
            ..Default::default()
        };
        assert!(ScrollModel::new(bad_fraction).is_err());

        let mut scroll = model();
        assert!(scroll.set_viewport_width(-1.0).is_err());
        assert_eq!(scroll.config().viewport_width, 1000.0);
        scroll.set_viewport_width(500.0).unwrap();
        assert_eq!(scroll.judgment_line_x(), 100.0);
        assert_eq!(scroll.pixels_per_ms(), 0.1);
    }
}
