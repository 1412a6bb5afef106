use rhythm_core::TimedNote;
use serde::Serialize;

use crate::scroll::ScrollModel;
use crate::viewport::ViewportModel;

/// Screen rectangle of one note. `y` is the top edge; the note's pitch row
/// is centered on `midi_to_y(pitch)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NoteGeometry {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl NoteGeometry {
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    /// Whether the rectangle crosses the vertical line at `x`.
    pub fn spans_x(&self, x: f64) -> bool {
        self.x <= x && x <= self.right()
    }
}

pub fn note_geometry(
    note: &TimedNote,
    now_ms: f64,
    viewport: &ViewportModel,
    scroll: &ScrollModel,
) -> NoteGeometry {
    let height = viewport.row_height();
    NoteGeometry {
        x: scroll.time_to_x(note.start_time_ms, now_ms),
        y: viewport.midi_to_y(note.midi_pitch) - height / 2.0,
        width: scroll.duration_to_width(note.duration_ms),
        height,
    }
}
