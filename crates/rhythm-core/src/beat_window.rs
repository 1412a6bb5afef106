use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;
use crate::model::TimedBeat;
use crate::scheduler::Scheduler;

/// How far around "now" the grid is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeatWindowConfig {
    pub window_behind_ms: f64,
    pub window_ahead_ms: f64,
}

impl Default for BeatWindowConfig {
    fn default() -> Self {
        Self {
            window_behind_ms: 1000.0,
            window_ahead_ms: 4000.0,
        }
    }
}

/// Beat grid derived from a chart. The beat list is never mutated.
#[derive(Debug, Clone, Default)]
pub struct BeatWindow {
    beats: Vec<TimedBeat>,
    config: BeatWindowConfig,
}

impl BeatWindow {
    pub fn new(beats: Vec<TimedBeat>, config: BeatWindowConfig) -> Self {
        debug_assert!(beats.windows(2).all(|w| w[0].time_ms <= w[1].time_ms));
        Self { beats, config }
    }

    pub fn beats(&self) -> &[TimedBeat] {
        &self.beats
    }

    pub fn config(&self) -> BeatWindowConfig {
        self.config
    }

    /// Schedules one cue per beat, built from the beat's list position.
    pub fn schedule_into<E>(
        &self,
        scheduler: &mut Scheduler<E>,
        cue: impl Fn(usize) -> E,
    ) -> Result<(), SchedulerError> {
        for (i, beat) in self.beats.iter().enumerate() {
            scheduler.schedule(cue(i), beat.time_ms)?;
        }
        Ok(())
    }

    /// Resolves a dispatched beat cue.
    pub fn on_beat(&self, position: usize) -> Option<&TimedBeat> {
        self.beats.get(position)
    }

    /// Beats from `now - behind` through `now + ahead`.
    pub fn visible_beats(&self, now_ms: f64) -> &[TimedBeat] {
        self.visible_beats_within(now_ms, self.config.window_behind_ms, self.config.window_ahead_ms)
    }

    pub fn visible_beats_within(&self, now_ms: f64, behind_ms: f64, ahead_ms: f64) -> &[TimedBeat] {
        let from = now_ms - behind_ms;
        let to = now_ms + ahead_ms;
        let lo = self.beats.partition_point(|b| b.time_ms < from);
        let hi = self.beats.partition_point(|b| b.time_ms <= to);
        &self.beats[lo..hi.max(lo)]
    }
}
