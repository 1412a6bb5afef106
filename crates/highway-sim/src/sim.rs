//! Offline session run on a virtual clock with a synthetic singer.

use anyhow::{Result, bail};
use highway_service::{HighwayConfig, NoteHighwayService, PerformanceSummary};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rhythm_core::{
    MS_PER_SECOND, MockTimeProvider, NotePerformance, PitchSample, SessionEvent, TimedEvents,
    TimedNote,
};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Time simulated after the last note so every window can close.
const TAIL_MS: f64 = 1000.0;

/// Synthetic detector output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SingerModel {
    /// Constant offset from every target pitch.
    pub detune_cents: f64,
    /// Uniform random spread around the detuned pitch.
    pub jitter_cents: f64,
    pub sample_rate_hz: f64,
    pub clarity: f64,
}

impl Default for SingerModel {
    fn default() -> Self {
        Self {
            detune_cents: 0.0,
            jitter_cents: 10.0,
            sample_rate_hz: 20.0,
            clarity: 0.9,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub title: String,
    pub frames: u64,
    pub samples: u64,
    pub summary: PerformanceSummary,
    pub notes: Vec<NotePerformance>,
}

pub struct Simulation {
    config: HighwayConfig,
    singer: SingerModel,
    fps: u32,
    rng: StdRng,
}

impl Simulation {
    pub fn new(config: HighwayConfig, singer: SingerModel, fps: u32, seed: u64) -> Result<Self> {
        if fps == 0 {
            bail!("fps must be positive");
        }
        if !(singer.sample_rate_hz.is_finite() && singer.sample_rate_hz > 0.0) {
            bail!("sample rate must be positive, got {}", singer.sample_rate_hz);
        }
        Ok(Self {
            config,
            singer,
            fps,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    pub fn run(&mut self, title: &str, timeline: TimedEvents) -> Result<SimulationReport> {
        let clock = MockTimeProvider::new();
        let mut service = NoteHighwayService::new(self.config.clone(), &clock)?;
        let end_ms = timeline.end_time_ms() + TAIL_MS;
        let notes = timeline.notes.clone();
        service.set_timeline(timeline)?;
        service.start()?;

        let frame_ms = MS_PER_SECOND / f64::from(self.fps);
        let sample_interval_ms = MS_PER_SECOND / self.singer.sample_rate_hz;
        let mut next_sample_ms = 0.0;
        let mut frames = 0u64;
        let mut samples = 0u64;

        loop {
            clock.advance_ms(frame_ms);
            frames += 1;
            let Some(now) = service.now_ms() else {
                bail!("session clock stopped unexpectedly");
            };

            while next_sample_ms <= now {
                for sample in self.sing(&notes, next_sample_ms) {
                    service.submit_sample(sample);
                    samples += 1;
                }
                next_sample_ms += sample_interval_ms;
            }

            for event in service.tick() {
                log_event(&event);
            }
            if !service.should_advance() {
                debug!(now_ms = now, "lesson gate holding");
            }
            if now >= end_ms {
                break;
            }
        }

        for event in service.stop()? {
            log_event(&event);
        }

        let notes = service
            .collector()
            .in_arrival_order()
            .copied()
            .collect();
        Ok(SimulationReport {
            title: title.to_string(),
            frames,
            samples,
            summary: service.summary(),
            notes,
        })
    }

    /// What the detectors hear at `time_ms`: one reading per sounding
    /// target, detuned and jittered, or silence between notes.
    fn sing(&mut self, notes: &[TimedNote], time_ms: f64) -> Vec<PitchSample> {
        let spread = self.singer.jitter_cents.abs();
        let mut heard: Vec<PitchSample> = notes
            .iter()
            .filter(|n| n.start_time_ms <= time_ms && time_ms < n.end_time_ms())
            .map(|note| {
                let jitter = if spread > 0.0 {
                    self.rng.gen_range(-spread..=spread)
                } else {
                    0.0
                };
                let cents = self.singer.detune_cents + jitter;
                PitchSample::new(time_ms, Some(note.midi_pitch + cents / 100.0), self.singer.clarity)
                    .on_channel(note.channel)
            })
            .collect();
        if heard.is_empty() {
            heard.push(PitchSample::unvoiced(time_ms));
        }
        heard
    }
}

fn log_event(event: &SessionEvent) {
    match event {
        SessionEvent::NoteFinalized(p) => info!(
            note = %p.note_id,
            hit = p.hit,
            accuracy_cents = ?p.accuracy_cents,
            timing_offset_ms = ?p.timing_offset_ms,
            "note judged"
        ),
        SessionEvent::CueFailed { at_ms, reason } => warn!(at_ms, "cue failed: {reason}"),
        other => debug!(?other, "session event"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart_file::ChartFile;

    fn run(singer: SingerModel, seed: u64) -> SimulationReport {
        let chart = ChartFile::c_major_scale().unwrap();
        let mut sim = Simulation::new(HighwayConfig::default(), singer, 60, seed).unwrap();
        sim.run(&chart.title, chart.timeline().unwrap()).unwrap()
    }

    #[test]
    fn in_tune_singer_hits_everything() {
        let report = run(SingerModel::default(), 7);
        assert_eq!(report.summary.total, 8);
        assert_eq!(report.summary.hits, 8);
        assert!(report.summary.mean_abs_accuracy_cents.unwrap() <= 10.0);
    }

    #[test]
    fn badly_detuned_singer_misses() {
        let singer = SingerModel {
            detune_cents: 150.0,
            jitter_cents: 0.0,
            ..Default::default()
        };
        let report = run(singer, 7);
        assert_eq!(report.summary.total, 8);
        assert_eq!(report.summary.hits, 0);
    }

    #[test]
    fn same_seed_same_report() {
        let a = run(SingerModel::default(), 42);
        let b = run(SingerModel::default(), 42);
        assert_eq!(a.notes, b.notes);
        assert_eq!(a.frames, b.frames);
    }

    #[test]
    fn rejects_zero_fps() {
        assert!(Simulation::new(HighwayConfig::default(), SingerModel::default(), 0, 1).is_err());
    }
}
