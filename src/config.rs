//! Engine configuration.
//!
//! Every field has a default, so an empty JSON object (or no file at all)
//! yields a working configuration.

use crate::audio::{Waveform, SAMPLE_RATE};
use crate::error::EngineError;
use crate::player::FadeOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Tunables for an [`crate::AmbienceEngine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Default crossfade durations for tracks.
    pub fade: FadeOptions,
    /// Wait after a track fade-out before its nodes are removed.
    pub disposal_grace_ms: u64,
    /// Scheduler control-loop period.
    pub tick_interval_ms: u64,
    /// How far ahead of the audio clock chords are scheduled.
    pub lookahead_secs: f64,
    /// Delay before the first chord of a session.
    pub start_delay_secs: f64,
    /// Master fade-out when a generative session stops.
    pub stop_fade_secs: f64,
    /// Wait after that fade before the session's nodes are removed.
    pub teardown_grace_ms: u64,
    /// Master level of generative sessions.
    pub master_level: f32,
    /// Oscillator wave shape of generative voices.
    pub waveform: Waveform,
    /// Directory that relative and site-rooted track locators resolve against.
    pub track_root: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            fade: FadeOptions::default(),
            disposal_grace_ms: 120,
            tick_interval_ms: 25,
            lookahead_secs: 0.1,
            start_delay_secs: 0.05,
            stop_fade_secs: 0.2,
            teardown_grace_ms: 100,
            master_level: 0.9,
            waveform: Waveform::Triangle,
            track_root: None,
        }
    }
}

impl EngineConfig {
    /// Parses a config from JSON text.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        serde_json::from_str(json).map_err(EngineError::ConfigParse)
    }

    /// Loads a config from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is not a valid config.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| EngineError::Config {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Disposal grace in seconds.
    pub fn disposal_grace_secs(&self) -> f64 {
        self.disposal_grace_ms as f64 / 1000.0
    }
}
