//! Note highway facade for a host frame loop.
//!
//! The host calls [`NoteHighwayService::tick`] once per frame, pushes pitch
//! readings as they arrive, and reads coordinates and results back. All
//! judgment goes through the referee; the service only adds coordinate
//! mapping and the result store.

use std::collections::BTreeMap;

use note_highway::{HighwayError, NoteGeometry, ScrollModel, ViewportModel, note_geometry};
use rhythm_core::{
    Channel, NoteId, NotePerformance, PitchSample, Referee, SessionError, SessionEvent,
    SessionSnapshot, SessionState, SystemTimeProvider, TimeProvider, TimedBeat, TimedEvents,
    TimedNote,
};
use tracing::{debug, info};

use crate::config::HighwayConfig;
use crate::feedback::{FeedbackCollector, PerformanceSummary};

pub struct NoteHighwayService<P: TimeProvider = SystemTimeProvider> {
    referee: Referee<P>,
    viewport: ViewportModel,
    scroll: ScrollModel,
    collector: FeedbackCollector,
    /// Events already recorded but not yet handed to the host.
    outbox: Vec<SessionEvent>,
    auto_fit_pitch_range: bool,
    default_channel: Channel,
}

impl<P: TimeProvider> NoteHighwayService<P> {
    pub fn new(config: HighwayConfig, provider: P) -> Result<Self, HighwayError> {
        let mut viewport = ViewportModel::new(config.viewport)?;
        let scroll = ScrollModel::new(config.scroll)?;
        // The scroll width wins when the two disagree.
        viewport.set_size(scroll.config().viewport_width, viewport.viewport().height)?;
        Ok(Self {
            referee: Referee::new(config.referee_config(), provider),
            viewport,
            scroll,
            collector: FeedbackCollector::new(),
            outbox: Vec::new(),
            auto_fit_pitch_range: config.auto_fit_pitch_range,
            default_channel: config.default_channel,
        })
    }

    pub fn referee(&self) -> &Referee<P> {
        &self.referee
    }

    pub fn viewport(&self) -> &ViewportModel {
        &self.viewport
    }

    pub fn scroll(&self) -> &ScrollModel {
        &self.scroll
    }

    pub fn collector(&self) -> &FeedbackCollector {
        &self.collector
    }

    /// Replaces the target notes, keeping the current beat grid.
    pub fn set_target_notes(&mut self, notes: Vec<TimedNote>) -> Result<(), SessionError> {
        let mut timeline = TimedEvents::from_notes(notes);
        timeline.beats = self.referee.beat_window().beats().to_vec();
        self.set_timeline(timeline)
    }

    pub fn set_timeline(&mut self, timeline: TimedEvents) -> Result<(), SessionError> {
        let note_count = timeline.notes.len();
        self.referee.set_timeline(timeline)?;
        if self.auto_fit_pitch_range && note_count > 0 {
            if let Err(err) = self.viewport.fit_to_notes(self.referee.notes()) {
                debug!("pitch range kept: {err}");
            }
        }
        info!(
            notes = note_count,
            beats = self.referee.beat_window().beats().len(),
            "timeline loaded"
        );
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), SessionError> {
        self.referee.start()
    }

    pub fn pause(&mut self) -> Result<(), SessionError> {
        self.referee.pause()
    }

    pub fn resume(&mut self) -> Result<(), SessionError> {
        self.referee.resume()
    }

    /// Stops the session and returns the final events. Notes closed by the
    /// stop are in the collector when this returns.
    pub fn stop(&mut self) -> Result<Vec<SessionEvent>, SessionError> {
        self.referee.stop()?;
        Ok(self.drain())
    }

    /// Returns to idle and clears the collected results.
    pub fn reset(&mut self) -> Result<(), SessionError> {
        self.referee.reset()?;
        self.referee.drain_events();
        self.outbox.clear();
        self.collector.reset();
        Ok(())
    }

    /// Advances the session one frame and returns what happened.
    pub fn tick(&mut self) -> Vec<SessionEvent> {
        self.referee.tick();
        self.drain()
    }

    /// Live reading on the default channel, stamped with the session clock.
    pub fn record_pitch_input(&mut self, midi_pitch: Option<f64>, clarity: f64) -> bool {
        self.record_pitch_input_on(self.default_channel, midi_pitch, clarity)
    }

    pub fn record_pitch_input_on(
        &mut self,
        channel: Channel,
        midi_pitch: Option<f64>,
        clarity: f64,
    ) -> bool {
        self.referee.record_pitch(channel, midi_pitch, clarity)
    }

    /// Reading already stamped by the detector.
    pub fn submit_sample(&mut self, sample: PitchSample) -> bool {
        self.referee.submit_sample(sample)
    }

    /// Closes one note now and stores its record. Repeats return the same
    /// record and store nothing new. The finalize event is delivered with
    /// the next `tick`.
    pub fn finalize_note(&mut self, id: NoteId) -> Option<NotePerformance> {
        let performance = self.referee.finalize_note(id);
        self.collect();
        performance
    }

    pub fn get_performance_results(&self) -> &BTreeMap<NoteId, NotePerformance> {
        self.collector.results()
    }

    pub fn summary(&self) -> PerformanceSummary {
        self.collector.summary()
    }

    pub fn visible_notes(&self) -> Vec<&TimedNote> {
        self.scroll.visible_notes(self.referee.notes(), self.render_time_ms())
    }

    pub fn visible_beats(&self) -> &[TimedBeat] {
        self.referee.visible_beats()
    }

    pub fn note_geometry(&self, note: &TimedNote) -> NoteGeometry {
        note_geometry(note, self.render_time_ms(), &self.viewport, &self.scroll)
    }

    pub fn midi_to_y(&self, midi: f64) -> f64 {
        self.viewport.midi_to_y(midi)
    }

    pub fn time_to_x(&self, time_ms: f64) -> f64 {
        self.scroll.time_to_x(time_ms, self.render_time_ms())
    }

    pub fn judgment_line_x(&self) -> f64 {
        self.scroll.judgment_line_x()
    }

    pub fn set_viewport_size(&mut self, width: f64, height: f64) -> Result<(), HighwayError> {
        self.viewport.set_size(width, height)?;
        self.scroll.set_viewport_width(width)
    }

    pub fn should_advance(&mut self) -> bool {
        self.referee.should_advance()
    }

    pub fn correct_drift(&mut self, external_ms: f64) -> Option<f64> {
        self.referee.correct_drift(external_ms)
    }

    pub fn state(&self) -> SessionState {
        self.referee.state()
    }

    pub fn now_ms(&self) -> Option<f64> {
        self.referee.now_ms()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.referee.snapshot()
    }

    /// Session time used for drawing; the highway rests at 0 before start.
    fn render_time_ms(&self) -> f64 {
        self.referee.now_ms().unwrap_or(0.0)
    }

    /// Moves referee events into the outbox, storing every finalized record.
    fn collect(&mut self) {
        for event in self.referee.drain_events() {
            if let SessionEvent::NoteFinalized(performance) = &event {
                self.collector.record(*performance);
            }
            self.outbox.push(event);
        }
    }

    fn drain(&mut self) -> Vec<SessionEvent> {
        self.collect();
        std::mem::take(&mut self.outbox)
    }
}
