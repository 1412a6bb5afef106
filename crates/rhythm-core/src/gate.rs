//! Lesson gating on recent accuracy.
//!
//! The gate only answers whether the caller may reveal material past the next
//! gate point. It never touches the session clock.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::NotePerformance;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Number of most recent notes considered.
    pub trailing_notes: usize,
    /// Share of trailing notes that must be hits.
    pub required_hit_ratio: f64,
    /// When set, a hit only counts if it was held at least this long
    /// (as `sampled_duration_ratio`).
    pub min_sustain_ratio: Option<f64>,
    /// Session times at which advancing is withheld until the ratio is met.
    pub gate_points_ms: Vec<f64>,
    /// Withhold at a gate point while no note has been judged yet. When
    /// false an empty trailing window lets the gate open.
    pub withhold_without_evidence: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            trailing_notes: 4,
            required_hit_ratio: 0.7,
            min_sustain_ratio: None,
            gate_points_ms: Vec::new(),
            withhold_without_evidence: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PitchAccuracyGate {
    config: GateConfig,
    recent: VecDeque<bool>,
    /// Number of gate points already passed.
    passed: usize,
}

impl PitchAccuracyGate {
    pub fn new(mut config: GateConfig) -> Self {
        config.trailing_notes = config.trailing_notes.max(1);
        config.gate_points_ms.retain(|t| t.is_finite());
        config.gate_points_ms.sort_by(f64::total_cmp);
        Self {
            recent: VecDeque::with_capacity(config.trailing_notes),
            config,
            passed: 0,
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn record(&mut self, performance: &NotePerformance) {
        let sustained = self
            .config
            .min_sustain_ratio
            .is_none_or(|min| performance.sampled_duration_ratio >= min);
        if self.recent.len() == self.config.trailing_notes {
            self.recent.pop_front();
        }
        self.recent.push_back(performance.hit && sustained);
    }

    /// Hit share over the trailing window; `None` before any record.
    pub fn trailing_hit_ratio(&self) -> Option<f64> {
        if self.recent.is_empty() {
            return None;
        }
        let hits = self.recent.iter().filter(|&&h| h).count();
        Some(hits as f64 / self.recent.len() as f64)
    }

    /// Whether the playhead may move past `now_ms`.
    ///
    /// Before the next gate point this is always true. At or past it, the
    /// trailing window must meet the required ratio; when it does, the gate
    /// point counts as passed and stays open.
    pub fn should_advance(&mut self, now_ms: f64) -> bool {
        while let Some(&gate_ms) = self.config.gate_points_ms.get(self.passed) {
            if now_ms < gate_ms {
                return true;
            }
            let satisfied = match self.trailing_hit_ratio() {
                Some(ratio) => ratio >= self.config.required_hit_ratio,
                None => !self.config.withhold_without_evidence,
            };
            if !satisfied {
                return false;
            }
            debug!(gate_ms, "lesson gate passed");
            self.passed += 1;
        }
        true
    }

    pub fn passed_gates(&self) -> usize {
        self.passed
    }

    pub fn reset(&mut self) {
        self.recent.clear();
        self.passed = 0;
    }
}
