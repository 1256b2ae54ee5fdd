//! Engine error types.
//!
//! None of these escape the playback entry points: `play_track` and `play`
//! log them and degrade to silence. They surface from configuration loading,
//! parameter parsing and export, where the caller can act on them.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the ambience engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Config file could not be read.
    #[error("failed to read config {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid JSON for [`crate::EngineConfig`].
    #[error("invalid config: {0}")]
    ConfigParse(#[source] serde_json::Error),

    /// Mood parameters are not valid JSON.
    #[error("invalid mood parameters: {0}")]
    MoodParse(#[source] serde_json::Error),

    /// Mood parameters are JSON but not an object.
    #[error("mood parameters must be a JSON object, got {0}")]
    MoodShape(String),

    /// Track could not be opened.
    #[error("failed to open track {locator}: {source}")]
    TrackOpen {
        locator: String,
        #[source]
        source: std::io::Error,
    },

    /// Track could not be decoded.
    #[error("failed to decode track {locator}: {source}")]
    TrackDecode {
        locator: String,
        #[source]
        source: rodio::decoder::DecoderError,
    },

    /// WAV export failed.
    #[error("export failed: {0}")]
    Export(#[from] hound::Error),

    /// The audio graph rejected an operation.
    #[error(transparent)]
    Graph(#[from] crate::audio::GraphError),
}
