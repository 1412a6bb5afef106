//! Pitch-accuracy judgment of target notes.
//!
//! Each note owns an evaluation window `[start, end + grace]`. The grace period
//! ends early where the next note on the same channel starts, so a sample
//! belongs to at most one note of a channel. Voiced samples that land in an
//! open window are kept until the window closes; the note is then reduced to
//! exactly one `NotePerformance`.
//! Aggregation runs over samples sorted by timestamp, so the result does not
//! depend on the order in which samples arrived.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::MS_PER_SECOND;
use crate::model::{Channel, NoteId, NotePerformance, PitchSample, TimedNote};

const CENTS_PER_SEMITONE: f64 = 100.0;

/// What `accuracy_cents` reports when no sample was within tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccuracyPolicy {
    /// Report `None`; the raw mean stays available in `raw_deviation_cents`.
    #[default]
    InToleranceOnly,
    /// Report the mean over every voiced sample instead.
    FallbackToRawMean,
}

/// Lesson difficulty presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    /// Largest |deviation| that still counts as in tune.
    pub tolerance_cents: f64,
    /// In-tolerance share of voiced samples needed for a hit.
    pub hit_threshold_ratio: f64,
    /// Samples below this clarity are treated as unvoiced.
    pub clarity_threshold: f64,
    /// Trailing time after the note end during which samples still count.
    pub grace_ms: f64,
    /// Extra wait before a window closes on `tick`, so samples stamped inside
    /// the window but delivered late are still counted.
    pub late_sample_allowance_ms: f64,
    /// Detector rate used to derive the expected sample count of a note.
    pub nominal_sample_rate_hz: f64,
    pub accuracy_policy: AccuracyPolicy,
}

impl JudgeConfig {
    pub fn for_difficulty(difficulty: Difficulty) -> Self {
        let (tolerance_cents, hit_threshold_ratio) = match difficulty {
            Difficulty::Beginner => (50.0, 0.5),
            Difficulty::Intermediate => (35.0, 0.6),
            Difficulty::Advanced => (20.0, 0.7),
        };
        Self {
            tolerance_cents,
            hit_threshold_ratio,
            clarity_threshold: 0.5,
            grace_ms: 150.0,
            late_sample_allowance_ms: 100.0,
            nominal_sample_rate_hz: 20.0,
            accuracy_policy: AccuracyPolicy::default(),
        }
    }

    pub fn builder() -> JudgeConfigBuilder {
        JudgeConfigBuilder::default()
    }
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self::for_difficulty(Difficulty::default())
    }
}

#[derive(Debug, Default)]
pub struct JudgeConfigBuilder {
    difficulty: Difficulty,
    tolerance_cents: Option<f64>,
    hit_threshold_ratio: Option<f64>,
    clarity_threshold: Option<f64>,
    grace_ms: Option<f64>,
    late_sample_allowance_ms: Option<f64>,
    nominal_sample_rate_hz: Option<f64>,
    accuracy_policy: Option<AccuracyPolicy>,
}

impl JudgeConfigBuilder {
    pub fn difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn tolerance_cents(mut self, cents: f64) -> Self {
        self.tolerance_cents = Some(cents);
        self
    }

    pub fn hit_threshold_ratio(mut self, ratio: f64) -> Self {
        self.hit_threshold_ratio = Some(ratio);
        self
    }

    pub fn clarity_threshold(mut self, clarity: f64) -> Self {
        self.clarity_threshold = Some(clarity);
        self
    }

    pub fn grace_ms(mut self, ms: f64) -> Self {
        self.grace_ms = Some(ms);
        self
    }

    pub fn late_sample_allowance_ms(mut self, ms: f64) -> Self {
        self.late_sample_allowance_ms = Some(ms);
        self
    }

    pub fn nominal_sample_rate_hz(mut self, hz: f64) -> Self {
        self.nominal_sample_rate_hz = Some(hz);
        self
    }

    pub fn accuracy_policy(mut self, policy: AccuracyPolicy) -> Self {
        self.accuracy_policy = Some(policy);
        self
    }

    pub fn build(self) -> JudgeConfig {
        let default = JudgeConfig::for_difficulty(self.difficulty);
        JudgeConfig {
            tolerance_cents: self.tolerance_cents.unwrap_or(default.tolerance_cents),
            hit_threshold_ratio: self
                .hit_threshold_ratio
                .unwrap_or(default.hit_threshold_ratio),
            clarity_threshold: self.clarity_threshold.unwrap_or(default.clarity_threshold),
            grace_ms: self.grace_ms.unwrap_or(default.grace_ms),
            late_sample_allowance_ms: self
                .late_sample_allowance_ms
                .unwrap_or(default.late_sample_allowance_ms),
            nominal_sample_rate_hz: self
                .nominal_sample_rate_hz
                .unwrap_or(default.nominal_sample_rate_hz),
            accuracy_policy: self.accuracy_policy.unwrap_or(default.accuracy_policy),
        }
    }
}

/// Sample bookkeeping, mostly for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JudgeStats {
    pub accepted_samples: u64,
    pub unvoiced_samples: u64,
    pub discarded_samples: u64,
    pub finalized_notes: u64,
}

#[derive(Debug, Clone, Copy)]
struct VoicedSample {
    time_ms: f64,
    midi_pitch: f64,
    clarity: f64,
}

#[derive(Debug, Clone)]
struct Evaluation {
    note: TimedNote,
    /// Start of the next note on the same channel; samples from here on
    /// belong to that note.
    handoff_ms: f64,
    samples: Vec<VoicedSample>,
    result: Option<NotePerformance>,
}

#[derive(Debug, Default)]
pub struct Judge {
    config: JudgeConfig,
    evaluations: Vec<Evaluation>,
    by_id: HashMap<NoteId, usize>,
    /// Open evaluations per channel, ordered by note start.
    open: BTreeMap<Channel, Vec<usize>>,
    outbox: Vec<NotePerformance>,
    stats: JudgeStats,
}

impl Judge {
    pub fn new(config: JudgeConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &JudgeConfig {
        &self.config
    }

    /// Replaces the configuration for notes closed from now on.
    pub fn set_config(&mut self, config: JudgeConfig) {
        self.config = config;
    }

    pub fn stats(&self) -> JudgeStats {
        self.stats
    }

    /// Opens an evaluation for every note, discarding all previous state.
    pub fn load(&mut self, notes: &[TimedNote]) {
        self.clear();
        let mut order: Vec<usize> = (0..notes.len()).collect();
        order.sort_by(|&a, &b| notes[a].start_time_ms.total_cmp(&notes[b].start_time_ms));
        for i in order {
            let note = notes[i];
            if self.by_id.contains_key(&note.id) {
                debug!(note = %note.id, "duplicate note id ignored by judge");
                continue;
            }
            let slot = self.evaluations.len();
            self.evaluations.push(Evaluation {
                note,
                handoff_ms: f64::INFINITY,
                samples: Vec::new(),
                result: None,
            });
            self.by_id.insert(note.id, slot);
            let lane = self.open.entry(note.channel).or_default();
            if let Some(&previous) = lane.last() {
                self.evaluations[previous].handoff_ms = note.start_time_ms;
            }
            lane.push(slot);
        }
    }

    pub fn clear(&mut self) {
        self.evaluations.clear();
        self.by_id.clear();
        self.open.clear();
        self.outbox.clear();
        self.stats = JudgeStats::default();
    }

    pub fn note_count(&self) -> usize {
        self.evaluations.len()
    }

    pub fn open_count(&self) -> usize {
        self.open.values().map(Vec::len).sum()
    }

    pub fn is_open(&self, id: NoteId) -> bool {
        self.by_id
            .get(&id)
            .is_some_and(|&slot| self.evaluations[slot].result.is_none())
    }

    /// Routes a sample to the open windows on its channel that contain it.
    /// Returns whether any window accepted it.
    pub fn accept_sample(&mut self, sample: PitchSample) -> bool {
        let voiced_pitch = sample
            .midi_pitch
            .filter(|p| p.is_finite() && sample.clarity >= self.config.clarity_threshold);
        let Some(midi_pitch) = voiced_pitch else {
            self.stats.unvoiced_samples += 1;
            return false;
        };
        if !sample.time_ms.is_finite() {
            self.stats.discarded_samples += 1;
            return false;
        }

        let grace = self.config.grace_ms;
        let mut accepted = false;
        if let Some(lane) = self.open.get(&sample.channel) {
            let earliest = lane
                .first()
                .map(|&slot| self.evaluations[slot].note.start_time_ms);
            if earliest.is_some_and(|start| sample.time_ms >= start) {
                for &slot in lane {
                    let eval = &mut self.evaluations[slot];
                    if eval.note.start_time_ms > sample.time_ms {
                        break;
                    }
                    let in_window = sample.time_ms <= eval.note.end_time_ms() + grace
                        && sample.time_ms < eval.handoff_ms;
                    if in_window {
                        eval.samples.push(VoicedSample {
                            time_ms: sample.time_ms,
                            midi_pitch,
                            clarity: sample.clarity,
                        });
                        accepted = true;
                    }
                }
            }
        }

        if accepted {
            self.stats.accepted_samples += 1;
        } else {
            self.stats.discarded_samples += 1;
            trace!(
                time_ms = sample.time_ms,
                channel = %sample.channel,
                "pitch sample outside every open window"
            );
        }
        accepted
    }

    /// Closes every window whose grace period and late-sample allowance have
    /// elapsed by `now_ms`. Returns how many notes were closed.
    pub fn tick(&mut self, now_ms: f64) -> usize {
        let closing = self.config.grace_ms + self.config.late_sample_allowance_ms;
        let expired = self.open_slots_where(|note| now_ms > note.end_time_ms() + closing);
        for &slot in &expired {
            self.close(slot);
        }
        expired.len()
    }

    /// Closes one note now. Closing an already closed note returns the
    /// original record again and emits nothing. `None` for unknown ids.
    pub fn finalize(&mut self, id: NoteId) -> Option<NotePerformance> {
        let slot = *self.by_id.get(&id)?;
        match self.evaluations[slot].result {
            Some(done) => Some(done),
            None => Some(self.close(slot)),
        }
    }

    /// Force-closes every open window. Returns how many notes were closed.
    pub fn finalize_all(&mut self) -> usize {
        let open = self.open_slots_where(|_| true);
        for &slot in &open {
            self.close(slot);
        }
        open.len()
    }

    pub fn performance(&self, id: NoteId) -> Option<&NotePerformance> {
        let slot = *self.by_id.get(&id)?;
        self.evaluations[slot].result.as_ref()
    }

    /// Takes every record produced since the last drain, in close order.
    pub fn drain_finalized(&mut self) -> Vec<NotePerformance> {
        std::mem::take(&mut self.outbox)
    }

    /// Open slots matching `pred`, ordered by note end then id.
    fn open_slots_where(&self, pred: impl Fn(&TimedNote) -> bool) -> Vec<usize> {
        let mut slots: Vec<usize> = self
            .open
            .values()
            .flatten()
            .copied()
            .filter(|&slot| pred(&self.evaluations[slot].note))
            .collect();
        slots.sort_by(|&a, &b| {
            let (na, nb) = (&self.evaluations[a].note, &self.evaluations[b].note);
            na.end_time_ms()
                .total_cmp(&nb.end_time_ms())
                .then(na.id.cmp(&nb.id))
        });
        slots
    }

    fn close(&mut self, slot: usize) -> NotePerformance {
        let eval = &mut self.evaluations[slot];
        let samples = std::mem::take(&mut eval.samples);
        let performance = evaluate(&eval.note, samples, &self.config);
        eval.result = Some(performance);

        let channel = eval.note.channel;
        if let Some(lane) = self.open.get_mut(&channel) {
            lane.retain(|&s| s != slot);
            if lane.is_empty() {
                self.open.remove(&channel);
            }
        }

        self.stats.finalized_notes += 1;
        self.outbox.push(performance);
        debug!(
            note = %performance.note_id,
            hit = performance.hit,
            accuracy_cents = ?performance.accuracy_cents,
            raw_deviation_cents = ?performance.raw_deviation_cents,
            "note window closed"
        );
        performance
    }
}

fn evaluate(
    note: &TimedNote,
    mut samples: Vec<VoicedSample>,
    config: &JudgeConfig,
) -> NotePerformance {
    samples.sort_by(|a, b| {
        a.time_ms
            .total_cmp(&b.time_ms)
            .then(a.midi_pitch.total_cmp(&b.midi_pitch))
            .then(a.clarity.total_cmp(&b.clarity))
    });

    let deviations: Vec<(f64, f64)> = samples
        .iter()
        .map(|s| (s.time_ms, CENTS_PER_SEMITONE * (s.midi_pitch - note.midi_pitch)))
        .collect();
    let in_tolerance: Vec<(f64, f64)> = deviations
        .iter()
        .copied()
        .filter(|(_, cents)| cents.abs() <= config.tolerance_cents)
        .collect();

    let voiced = deviations.len();
    let hit = voiced > 0
        && in_tolerance.len() as f64 / voiced as f64 >= config.hit_threshold_ratio;

    let raw_deviation_cents = mean(deviations.iter().map(|(_, c)| *c));
    let accuracy_cents = match mean(in_tolerance.iter().map(|(_, c)| *c)) {
        Some(cents) => Some(cents),
        None => match config.accuracy_policy {
            AccuracyPolicy::InToleranceOnly => None,
            AccuracyPolicy::FallbackToRawMean => raw_deviation_cents,
        },
    };
    let timing_offset_ms = in_tolerance.first().map(|(t, _)| t - note.start_time_ms);

    let expected =
        (note.duration_ms / MS_PER_SECOND * config.nominal_sample_rate_hz).max(1.0);
    let sampled_duration_ratio = (voiced as f64 / expected).min(1.0);

    NotePerformance {
        note_id: note.id,
        channel: note.channel,
        hit,
        accuracy_cents,
        timing_offset_ms,
        sampled_duration_ratio,
        raw_deviation_cents,
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (count > 0).then(|| sum / count as f64)
}
