use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use note_highway::{HighwayViewport, ScrollSettings};
use rhythm_core::{BeatWindowConfig, Channel, DriftConfig, GateConfig, JudgeConfig, RefereeConfig};
use serde::{Deserialize, Serialize};

/// Session and highway settings, stored as JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HighwayConfig {
    pub viewport: HighwayViewport,
    /// Refit the pitch range whenever target notes are replaced.
    pub auto_fit_pitch_range: bool,
    pub scroll: ScrollSettings,
    pub judge: JudgeConfig,
    pub lookahead_ms: f64,
    pub beat_window: BeatWindowConfig,
    pub drift: DriftConfig,
    pub gate: Option<GateConfig>,
    /// Channel used by `record_pitch_input`.
    pub default_channel: Channel,
}

impl Default for HighwayConfig {
    fn default() -> Self {
        Self {
            viewport: HighwayViewport::default(),
            auto_fit_pitch_range: true,
            scroll: ScrollSettings::default(),
            judge: JudgeConfig::default(),
            lookahead_ms: 100.0,
            beat_window: BeatWindowConfig::default(),
            drift: DriftConfig::default(),
            gate: None,
            default_channel: Channel(0),
        }
    }
}

impl HighwayConfig {
    /// Loads config from a specified path.
    /// Returns default config if file doesn't exist.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("invalid highway config {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn referee_config(&self) -> RefereeConfig {
        RefereeConfig {
            judge: self.judge.clone(),
            lookahead_ms: self.lookahead_ms,
            beat_window: self.beat_window,
            drift: self.drift,
            gate: self.gate.clone(),
        }
    }
}
