//! Append-only store of finalized note records.

use std::collections::BTreeMap;

use rhythm_core::{Channel, NoteId, NotePerformance};
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ChannelSummary {
    pub total: usize,
    pub hits: usize,
    pub hit_rate: f64,
}

/// Aggregate view of a session's records.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceSummary {
    pub total: usize,
    pub hits: usize,
    pub misses: usize,
    pub hit_rate: f64,
    /// Mean of the per-note signed accuracy over notes that have one.
    pub mean_accuracy_cents: Option<f64>,
    pub mean_abs_accuracy_cents: Option<f64>,
    pub mean_timing_offset_ms: Option<f64>,
    pub per_channel: BTreeMap<Channel, ChannelSummary>,
}

#[derive(Debug, Clone, Default)]
pub struct FeedbackCollector {
    records: BTreeMap<NoteId, NotePerformance>,
    arrival: Vec<NoteId>,
}

impl FeedbackCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a record. A second record for the same note is ignored and
    /// `false` is returned.
    pub fn record(&mut self, performance: NotePerformance) -> bool {
        if self.records.contains_key(&performance.note_id) {
            debug!(note = %performance.note_id, "duplicate performance record ignored");
            return false;
        }
        self.records.insert(performance.note_id, performance);
        self.arrival.push(performance.note_id);
        true
    }

    pub fn get(&self, id: NoteId) -> Option<&NotePerformance> {
        self.records.get(&id)
    }

    pub fn results(&self) -> &BTreeMap<NoteId, NotePerformance> {
        &self.records
    }

    /// Records in the order they were finalized.
    pub fn in_arrival_order(&self) -> impl Iterator<Item = &NotePerformance> {
        self.arrival.iter().filter_map(|id| self.records.get(id))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn reset(&mut self) {
        self.records.clear();
        self.arrival.clear();
    }

    pub fn summary(&self) -> PerformanceSummary {
        let total = self.records.len();
        let hits = self.records.values().filter(|p| p.hit).count();

        let mut per_channel: BTreeMap<Channel, ChannelSummary> = BTreeMap::new();
        for p in self.records.values() {
            let entry = per_channel.entry(p.channel).or_default();
            entry.total += 1;
            if p.hit {
                entry.hits += 1;
            }
        }
        for entry in per_channel.values_mut() {
            entry.hit_rate = ratio(entry.hits, entry.total);
        }

        let accuracies = || self.records.values().filter_map(|p| p.accuracy_cents);
        PerformanceSummary {
            total,
            hits,
            misses: total - hits,
            hit_rate: ratio(hits, total),
            mean_accuracy_cents: mean(accuracies()),
            mean_abs_accuracy_cents: mean(accuracies().map(f64::abs)),
            mean_timing_offset_ms: mean(self.records.values().filter_map(|p| p.timing_offset_ms)),
            per_channel,
        }
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (count > 0).then(|| sum / count as f64)
}
