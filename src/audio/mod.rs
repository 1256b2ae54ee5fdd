//! Audio engine plumbing.
//!
//! This module provides the node graph that everything renders through and
//! the output context that feeds it to rodio. It supports:
//! - Sample-accurate parameter automation on the audio clock
//! - Oscillator, gain, delay and streaming track nodes
//! - Callbacks scheduled on the audio clock for node teardown
//! - Offline rendering and WAV export

pub mod context;
pub mod export;
pub mod graph;
pub mod param;
pub mod voice;

pub use context::{AudioContext, ContextState, GraphHandle, SAMPLE_RATE};
pub use export::render_mood_to_wav;
pub use graph::{AudioGraph, GraphError, NodeId, Output, Waveform};
pub use param::AudioParam;
pub use voice::{Envelope, Voice};
