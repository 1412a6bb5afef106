//! Authoritative session clock.
//!
//! Session time is always derived from the wall clock as
//! `(wall_now - reference) + accumulated`, never by summing frame deltas, so
//! irregular frame pacing cannot introduce drift.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::time::{SystemTimeProvider, TimeProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockState {
    Stopped,
    Running,
    Paused,
}

/// Limits for re-anchoring against an external transport clock.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    /// Drift below this is left alone.
    pub min_drift_ms: f64,
    /// Largest single correction step, to avoid visible jumps.
    pub max_step_ms: f64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            min_drift_ms: 20.0,
            max_step_ms: 40.0,
        }
    }
}

pub struct Conductor<P: TimeProvider = SystemTimeProvider> {
    provider: P,
    state: ClockState,
    /// Wall-clock anchor (microseconds) of the current running span.
    reference_us: i64,
    /// Session time accumulated before the current running span.
    accumulated_ms: f64,
    drift: DriftConfig,
}

impl<P: TimeProvider> Conductor<P> {
    pub fn new(provider: P) -> Self {
        Self::with_drift_config(provider, DriftConfig::default())
    }

    pub fn with_drift_config(provider: P, drift: DriftConfig) -> Self {
        Self {
            provider,
            state: ClockState::Stopped,
            reference_us: 0,
            accumulated_ms: 0.0,
            drift,
        }
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ClockState::Running
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn drift_config(&self) -> DriftConfig {
        self.drift
    }

    /// Current session time, or `None` before `start`.
    pub fn now(&self) -> Option<f64> {
        match self.state {
            ClockState::Stopped => None,
            ClockState::Paused => Some(self.accumulated_ms),
            ClockState::Running => Some(self.running_now()),
        }
    }

    /// Starts at session time 0. No-op if already started.
    pub fn start(&mut self) {
        if self.state != ClockState::Stopped {
            return;
        }
        self.reference_us = self.provider.now_us();
        self.accumulated_ms = 0.0;
        self.state = ClockState::Running;
        debug!("conductor started");
    }

    pub fn pause(&mut self) {
        if self.state != ClockState::Running {
            return;
        }
        self.accumulated_ms = self.running_now();
        self.state = ClockState::Paused;
        debug!(at_ms = self.accumulated_ms, "conductor paused");
    }

    pub fn resume(&mut self) {
        if self.state != ClockState::Paused {
            return;
        }
        self.reference_us = self.provider.now_us();
        self.state = ClockState::Running;
        debug!(at_ms = self.accumulated_ms, "conductor resumed");
    }

    pub fn stop(&mut self) {
        self.state = ClockState::Stopped;
        self.accumulated_ms = 0.0;
        self.reference_us = 0;
    }

    /// Moves session time to `time_ms` (clamped to >= 0). The only way time
    /// goes backward. Ignored while stopped.
    pub fn seek(&mut self, time_ms: f64) {
        if self.state == ClockState::Stopped || !time_ms.is_finite() {
            return;
        }
        self.accumulated_ms = time_ms.max(0.0);
        self.reference_us = self.provider.now_us();
    }

    /// Nudges the clock toward an external transport time.
    ///
    /// Returns the applied step, or `None` when the drift is under the
    /// threshold or the clock is not running.
    pub fn correct_drift(&mut self, external_ms: f64) -> Option<f64> {
        if self.state != ClockState::Running || !external_ms.is_finite() {
            return None;
        }
        let now = self.running_now();
        let drift = external_ms - now;
        if drift.abs() < self.drift.min_drift_ms {
            return None;
        }
        let step = drift.clamp(-self.drift.max_step_ms, self.drift.max_step_ms);
        self.seek(now + step);
        debug!(drift_ms = drift, step_ms = step, "conductor drift corrected");
        Some(step)
    }

    fn running_now(&self) -> f64 {
        let elapsed_us = self.provider.now_us() - self.reference_us;
        self.accumulated_ms + elapsed_us as f64 / 1000.0
    }
}
