//! Session orchestration: one clock, one scheduler, one judge.
//!
//! State machine: `Idle -> Running <-> Paused -> Stopped -> Idle`.
//! Everything the session produces leaves through a single typed outbox of
//! [`SessionEvent`]s, drained by the host once per frame.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::beat_window::{BeatWindow, BeatWindowConfig};
use crate::chart::validate_timed_notes;
use crate::conductor::{Conductor, DriftConfig};
use crate::error::{DispatchError, SessionError};
use crate::gate::{GateConfig, PitchAccuracyGate};
use crate::judge::{Judge, JudgeConfig};
use crate::model::{Channel, NoteId, NotePerformance, PitchSample, TimedBeat, TimedEvents, TimedNote};
use crate::scheduler::Scheduler;
use crate::time::{SystemTimeProvider, TimeProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Running,
    Paused,
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionAction {
    Start,
    Pause,
    Resume,
    Stop,
    Reset,
}

impl fmt::Display for SessionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Stop => "stop",
            Self::Reset => "reset",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    Beat(TimedBeat),
    NoteStarted {
        note_id: NoteId,
        channel: Channel,
        at_ms: f64,
    },
    NoteFinalized(NotePerformance),
    CueFailed {
        at_ms: f64,
        reason: String,
    },
    DriftCorrected {
        drift_ms: f64,
        applied_ms: f64,
    },
}

/// Work items on the session scheduler.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Cue {
    Beat(usize),
    NoteStart { note_id: NoteId, channel: Channel },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefereeConfig {
    pub judge: JudgeConfig,
    pub lookahead_ms: f64,
    pub beat_window: BeatWindowConfig,
    pub drift: DriftConfig,
    pub gate: Option<GateConfig>,
}

impl Default for RefereeConfig {
    fn default() -> Self {
        Self {
            judge: JudgeConfig::default(),
            lookahead_ms: 0.0,
            beat_window: BeatWindowConfig::default(),
            drift: DriftConfig::default(),
            gate: None,
        }
    }
}

/// Result of one `tick`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickOutcome {
    /// Session time the tick ran at; `None` when the session was not running.
    pub now_ms: Option<f64>,
    pub dispatched: usize,
    pub finalized: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub now_ms: Option<f64>,
    pub pending_cues: usize,
    pub open_notes: usize,
    pub total_notes: usize,
}

pub struct Referee<P: TimeProvider = SystemTimeProvider> {
    state: SessionState,
    conductor: Conductor<P>,
    scheduler: Scheduler<Cue>,
    judge: Judge,
    gate: Option<PitchAccuracyGate>,
    beats: BeatWindow,
    notes: Vec<TimedNote>,
    events: Vec<SessionEvent>,
    cue_failures: Rc<RefCell<Vec<DispatchError>>>,
}

impl<P: TimeProvider> Referee<P> {
    pub fn new(config: RefereeConfig, provider: P) -> Self {
        let cue_failures = Rc::new(RefCell::new(Vec::new()));
        let mut scheduler = Scheduler::new(config.lookahead_ms);
        let sink = Rc::clone(&cue_failures);
        scheduler.set_error_handler(move |err: &DispatchError| sink.borrow_mut().push(err.clone()));

        Self {
            state: SessionState::Idle,
            conductor: Conductor::with_drift_config(provider, config.drift),
            scheduler,
            judge: Judge::new(config.judge),
            gate: config.gate.map(PitchAccuracyGate::new),
            beats: BeatWindow::new(Vec::new(), config.beat_window),
            notes: Vec::new(),
            events: Vec::new(),
            cue_failures,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn now_ms(&self) -> Option<f64> {
        self.conductor.now()
    }

    pub fn conductor(&self) -> &Conductor<P> {
        &self.conductor
    }

    pub fn judge(&self) -> &Judge {
        &self.judge
    }

    pub fn beat_window(&self) -> &BeatWindow {
        &self.beats
    }

    pub fn notes(&self) -> &[TimedNote] {
        &self.notes
    }

    /// Beats around the current session time (time 0 before start).
    pub fn visible_beats(&self) -> &[TimedBeat] {
        self.beats.visible_beats(self.now_ms().unwrap_or(0.0))
    }

    /// Replaces the chart timeline. Only allowed while idle, and only with
    /// notes that have positive durations, unique ids and no overlap within
    /// a channel. A rejected timeline leaves the current one in place.
    pub fn set_timeline(&mut self, timeline: TimedEvents) -> Result<(), SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::TimelineLocked { state: self.state });
        }
        validate_timed_notes(&timeline.notes)?;
        let config = self.beats.config();
        self.beats = BeatWindow::new(timeline.beats, config);
        self.notes = timeline.notes;
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), SessionError> {
        self.expect_state(SessionAction::Start, &[SessionState::Idle])?;

        self.scheduler.cancel_all();
        self.judge.load(&self.notes);
        if let Some(gate) = self.gate.as_mut() {
            gate.reset();
        }
        if let Err(err) = self.beats.schedule_into(&mut self.scheduler, Cue::Beat) {
            warn!("beat grid not fully scheduled: {err}");
        }
        for note in &self.notes {
            let cue = Cue::NoteStart {
                note_id: note.id,
                channel: note.channel,
            };
            if let Err(err) = self.scheduler.schedule(cue, note.start_time_ms) {
                warn!(note = %note.id, "note cue not scheduled: {err}");
            }
        }

        self.conductor.start();
        self.transition(SessionState::Running);
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), SessionError> {
        self.expect_state(SessionAction::Pause, &[SessionState::Running])?;
        self.conductor.pause();
        self.transition(SessionState::Paused);
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), SessionError> {
        self.expect_state(SessionAction::Resume, &[SessionState::Paused])?;
        self.conductor.resume();
        self.transition(SessionState::Running);
        Ok(())
    }

    /// Cancels pending cues and force-closes every open note, so each note
    /// ends up with a performance record.
    pub fn stop(&mut self) -> Result<(), SessionError> {
        self.expect_state(
            SessionAction::Stop,
            &[
                SessionState::Running,
                SessionState::Paused,
                SessionState::Stopped,
            ],
        )?;
        if self.state == SessionState::Stopped {
            return Ok(());
        }

        self.scheduler.cancel_all();
        let closed = self.judge.finalize_all();
        self.collect_finalized();
        self.conductor.stop();
        debug!(force_closed = closed, "session stopped");
        self.transition(SessionState::Stopped);
        Ok(())
    }

    /// Clears judgment state and returns to idle. The timeline is kept.
    pub fn reset(&mut self) -> Result<(), SessionError> {
        self.expect_state(
            SessionAction::Reset,
            &[SessionState::Stopped, SessionState::Idle],
        )?;
        self.scheduler.cancel_all();
        self.judge.clear();
        if let Some(gate) = self.gate.as_mut() {
            gate.reset();
        }
        self.conductor.stop();
        if self.state != SessionState::Idle {
            self.transition(SessionState::Idle);
        }
        Ok(())
    }

    /// Advances the session to the conductor's current time. A no-op unless
    /// running; never fails.
    pub fn tick(&mut self) -> TickOutcome {
        if self.state != SessionState::Running {
            return TickOutcome::default();
        }
        let Some(now) = self.conductor.now() else {
            return TickOutcome::default();
        };

        let beats = &self.beats;
        let events = &mut self.events;
        let report = self.scheduler.tick(now, |scheduled| {
            match scheduled.event {
                Cue::Beat(position) => {
                    let beat = beats.on_beat(position).ok_or_else(|| {
                        DispatchError::new(scheduled.at_ms, format!("unknown beat {position}"))
                    })?;
                    events.push(SessionEvent::Beat(*beat));
                }
                Cue::NoteStart { note_id, channel } => {
                    events.push(SessionEvent::NoteStarted {
                        note_id,
                        channel,
                        at_ms: scheduled.at_ms,
                    });
                }
            }
            Ok(())
        });
        for failure in self.cue_failures.borrow_mut().drain(..) {
            self.events.push(SessionEvent::CueFailed {
                at_ms: failure.at_ms,
                reason: failure.reason,
            });
        }

        let finalized = self.judge.tick(now);
        self.collect_finalized();

        TickOutcome {
            now_ms: Some(now),
            dispatched: report.dispatched,
            finalized,
        }
    }

    /// Records a live reading stamped with the current session time.
    /// Ignored unless running.
    pub fn record_pitch(&mut self, channel: Channel, midi_pitch: Option<f64>, clarity: f64) -> bool {
        if self.state != SessionState::Running {
            return false;
        }
        let Some(now) = self.conductor.now() else {
            return false;
        };
        self.judge
            .accept_sample(PitchSample::new(now, midi_pitch, clarity).on_channel(channel))
    }

    /// Accepts a reading stamped by the detector itself. Late readings that
    /// arrive while paused still count toward their notes.
    pub fn submit_sample(&mut self, sample: PitchSample) -> bool {
        match self.state {
            SessionState::Running | SessionState::Paused => self.judge.accept_sample(sample),
            SessionState::Idle | SessionState::Stopped => false,
        }
    }

    /// Closes one note immediately. Repeats are harmless.
    pub fn finalize_note(&mut self, id: NoteId) -> Option<NotePerformance> {
        let performance = self.judge.finalize(id);
        self.collect_finalized();
        performance
    }

    pub fn correct_drift(&mut self, external_ms: f64) -> Option<f64> {
        let before = self.conductor.now()?;
        let applied = self.conductor.correct_drift(external_ms)?;
        self.events.push(SessionEvent::DriftCorrected {
            drift_ms: external_ms - before,
            applied_ms: applied,
        });
        Some(applied)
    }

    /// Gate verdict at the current time; always true without a gate.
    pub fn should_advance(&mut self) -> bool {
        let now = self.conductor.now().unwrap_or(0.0);
        self.gate.as_mut().is_none_or(|gate| gate.should_advance(now))
    }

    pub fn gate(&self) -> Option<&PitchAccuracyGate> {
        self.gate.as_ref()
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            now_ms: self.conductor.now(),
            pending_cues: self.scheduler.len(),
            open_notes: self.judge.open_count(),
            total_notes: self.notes.len(),
        }
    }

    fn expect_state(
        &self,
        action: SessionAction,
        allowed: &[SessionState],
    ) -> Result<(), SessionError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(SessionError::InvalidTransition {
                from: self.state,
                action,
            })
        }
    }

    fn transition(&mut self, to: SessionState) {
        let from = self.state;
        self.state = to;
        debug!(%from, %to, "session state changed");
        self.events.push(SessionEvent::StateChanged { from, to });
    }

    fn collect_finalized(&mut self) {
        for performance in self.judge.drain_finalized() {
            if let Some(gate) = self.gate.as_mut() {
                gate.record(&performance);
            }
            self.events.push(SessionEvent::NoteFinalized(performance));
        }
    }
}
