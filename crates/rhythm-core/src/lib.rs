// Session clock, look-ahead scheduling, chart timing, and pitch judgment

pub mod beat_window;
pub mod chart;
pub mod conductor;
mod error;
pub mod gate;
pub mod judge;
mod model;
pub mod referee;
pub mod scheduler;
pub mod time;

pub use beat_window::{BeatWindow, BeatWindowConfig};
pub use chart::{
    Chart, ChartNote, MAX_GRID_BEATS, Meter, TempoChange, TempoMap, to_timed_events,
    validate_timed_notes,
};
pub use conductor::{ClockState, Conductor, DriftConfig};
pub use error::{ChartError, DispatchError, SchedulerError, SessionError};
pub use gate::{GateConfig, PitchAccuracyGate};
pub use judge::{AccuracyPolicy, Difficulty, Judge, JudgeConfig, JudgeConfigBuilder, JudgeStats};
pub use model::{
    Channel, NoteId, NotePerformance, PitchSample, TimedBeat, TimedEvents, TimedNote,
};
pub use referee::{
    Referee, RefereeConfig, SessionAction, SessionEvent, SessionSnapshot, SessionState,
    TickOutcome,
};
pub use scheduler::{Scheduled, Scheduler, TickReport};
pub use time::{MockTimeProvider, SystemTimeProvider, TimeProvider};

/// Milliseconds per second, used by sample-rate and clock conversions.
pub const MS_PER_SECOND: f64 = 1000.0;
