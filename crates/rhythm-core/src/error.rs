use thiserror::Error;

use crate::model::{Channel, NoteId};
use crate::referee::{SessionAction, SessionState};

/// Invalid chart or tempo map input to the chart adapter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChartError {
    #[error("tempo map is empty")]
    EmptyTempoMap,

    #[error("tempo map must start at beat 0, first change is at beat {first_beat}")]
    MissingInitialTempo { first_beat: f64 },

    #[error("invalid tempo {bpm} bpm at beat {at_beat}")]
    InvalidTempo { at_beat: f64, bpm: f64 },

    #[error("invalid meter: {0}")]
    InvalidMeter(String),

    #[error("note {id} has invalid timing (start {start_beat}, duration {duration_beats} beats)")]
    InvalidNoteTiming {
        id: NoteId,
        start_beat: f64,
        duration_beats: f64,
    },

    #[error("note {id} has invalid timing (start {start_time_ms} ms, duration {duration_ms} ms)")]
    InvalidTimedNote {
        id: NoteId,
        start_time_ms: f64,
        duration_ms: f64,
    },

    #[error("beat grid length {0} is out of range")]
    InvalidGridLength(f64),

    #[error("duplicate note id {0}")]
    DuplicateNoteId(NoteId),

    #[error("notes {first} and {second} overlap on {channel}")]
    OverlappingNotes {
        channel: Channel,
        first: NoteId,
        second: NoteId,
    },
}

/// Misuse of the session state machine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("cannot {action} while {from}")]
    InvalidTransition {
        from: SessionState,
        action: SessionAction,
    },

    #[error("timeline can only be replaced while idle (session is {state})")]
    TimelineLocked { state: SessionState },

    #[error("invalid timeline: {0}")]
    InvalidTimeline(#[from] ChartError),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchedulerError {
    #[error("cannot schedule at non-finite time {0}")]
    InvalidTime(f64),
}

/// Failure reported by a dispatch callback. Never aborts the rest of a tick.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("event due at {at_ms} ms failed: {reason}")]
pub struct DispatchError {
    pub at_ms: f64,
    pub reason: String,
}

impl DispatchError {
    pub fn new(at_ms: f64, reason: impl Into<String>) -> Self {
        Self {
            at_ms,
            reason: reason.into(),
        }
    }
}
