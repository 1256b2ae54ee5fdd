//! ambience - real-time audio engine for an interactive art installation.
//!
//! This library provides a crossfading single-track player and a generative
//! music scheduler that turns mood parameters into an endless chord sequence,
//! both rendering through one shared audio graph.

pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod handle;
pub mod music;
pub mod player;

// Re-export commonly used types
pub use audio::{AudioContext, ContextState};
pub use config::EngineConfig;
pub use engine::AmbienceEngine;
pub use error::EngineError;
pub use handle::StopHandle;
pub use music::{Mode, MoodParams};
pub use player::{CrossfadePlayer, FadeOptions, SessionPhase};
