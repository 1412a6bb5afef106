// Time and pitch to screen coordinates for a horizontally scrolling note highway

mod error;
pub mod geometry;
pub mod scroll;
pub mod viewport;

pub use error::HighwayError;
pub use geometry::{NoteGeometry, note_geometry};
pub use scroll::{ScrollConfig, ScrollModel, ScrollSettings};
pub use viewport::{
    HighwayViewport, MAX_MIDI, MIN_MIDI, MIN_SPAN_SEMITONES, ViewportModel,
    calculate_midi_range_from_notes,
};
