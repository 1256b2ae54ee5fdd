//! Audio output context.
//!
//! Owns the shared [`AudioGraph`] and the rodio output stream that pulls
//! frames out of it. The device is opened lazily on first use; a device
//! that cannot be opened leaves the context running without output, so
//! every later call stays safe and the engine is simply silent.

use super::graph::AudioGraph;
use rodio::{OutputStream, OutputStreamHandle, Source};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Sample rate for the output graph (44.1 kHz standard).
pub const SAMPLE_RATE: u32 = 44100;

/// Frames rendered per lock of the graph.
/// Smaller = lower latency but more lock traffic.
const BUFFER_SIZE: usize = 256;

/// Lifecycle of an [`AudioContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// No output has been requested yet.
    Uninitialized,
    /// The audio clock advances as frames are rendered.
    Running,
    /// Output is silent and the audio clock is frozen.
    Suspended,
}

/// Clonable, thread-safe handle to a context's graph.
#[derive(Clone)]
pub struct GraphHandle {
    graph: Arc<Mutex<AudioGraph>>,
}

impl GraphHandle {
    fn new(graph: AudioGraph) -> Self {
        Self {
            graph: Arc::new(Mutex::new(graph)),
        }
    }

    /// Runs `f` with the graph locked.
    ///
    /// Returns `None` if the lock is poisoned; the caller treats that the
    /// same as any other graph failure and carries on silently.
    pub fn with<R>(&self, f: impl FnOnce(&mut AudioGraph) -> R) -> Option<R> {
        match self.graph.lock() {
            Ok(mut graph) => Some(f(&mut graph)),
            Err(_) => {
                tracing::debug!("Audio graph lock poisoned; skipping graph operation");
                None
            }
        }
    }

    /// Returns true while some other handle (the owning context, a player,
    /// the output stream) still refers to the same graph.
    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.graph) > 1
    }

    /// Current audio-clock time, or 0 if the graph is unavailable.
    pub fn current_time(&self) -> f64 {
        self.with(|graph| graph.current_time()).unwrap_or(0.0)
    }
}

/// Audio source that renders frames from the shared graph.
/// Implements rodio's Source trait for playback.
struct GraphSource {
    graph: GraphHandle,
    suspended: Arc<AtomicBool>,
    sample_rate: u32,
    left_buf: Vec<f32>,
    right_buf: Vec<f32>,
    buf_pos: usize,
    channel: usize,
}

impl GraphSource {
    fn new(graph: GraphHandle, suspended: Arc<AtomicBool>, sample_rate: u32) -> Self {
        Self {
            graph,
            suspended,
            sample_rate,
            left_buf: vec![0.0; BUFFER_SIZE],
            right_buf: vec![0.0; BUFFER_SIZE],
            buf_pos: BUFFER_SIZE, // Start at end to trigger first render
            channel: 0,
        }
    }
}

impl Iterator for GraphSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.buf_pos >= BUFFER_SIZE {
            let rendered = !self.suspended.load(Ordering::Relaxed)
                && self
                    .graph
                    .with(|graph| graph.render(&mut self.left_buf, &mut self.right_buf))
                    .is_some();
            if !rendered {
                // Suspended: silence without advancing the audio clock
                self.left_buf.fill(0.0);
                self.right_buf.fill(0.0);
            }
            self.buf_pos = 0;
        }

        // Interleave stereo samples: L, R, L, R, ...
        let sample = if self.channel == 0 {
            self.left_buf[self.buf_pos]
        } else {
            self.right_buf[self.buf_pos]
        };

        self.channel = 1 - self.channel;
        if self.channel == 0 {
            self.buf_pos += 1;
        }

        Some(sample)
    }
}

impl Source for GraphSource {
    fn current_frame_len(&self) -> Option<usize> {
        None // Continuous stream
    }

    fn channels(&self) -> u16 {
        2
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

/// Where rendered frames go.
enum OutputMode {
    /// A hardware device, opened on first use.
    Device(Option<(OutputStream, OutputStreamHandle)>),
    /// No device: the owner renders frames explicitly.
    Offline,
}

/// Handle to the audio pipeline shared by every session of one engine.
pub struct AudioContext {
    graph: GraphHandle,
    suspended: Arc<AtomicBool>,
    state: ContextState,
    output: OutputMode,
}

impl AudioContext {
    /// Creates a context that will play through the default output device.
    ///
    /// Nothing is opened until [`AudioContext::ensure`] is called.
    pub fn new(sample_rate: u32) -> Self {
        Self::with_output(sample_rate, OutputMode::Device(None))
    }

    /// Creates a context with no device. Its clock only moves when
    /// [`AudioContext::render_offline`] is called.
    pub fn offline(sample_rate: u32) -> Self {
        Self::with_output(sample_rate, OutputMode::Offline)
    }

    fn with_output(sample_rate: u32, output: OutputMode) -> Self {
        Self {
            graph: GraphHandle::new(AudioGraph::new(sample_rate)),
            suspended: Arc::new(AtomicBool::new(false)),
            state: ContextState::Uninitialized,
            output,
        }
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> ContextState {
        self.state
    }

    /// Handle to the shared graph.
    pub fn graph(&self) -> GraphHandle {
        self.graph.clone()
    }

    /// Makes sure the context is running: opens the output on first use and
    /// resumes it if suspended.
    ///
    /// Failing to open the device is logged and otherwise ignored. The graph
    /// keeps accepting work; it just never reaches a speaker.
    pub fn ensure(&mut self) -> GraphHandle {
        match self.state {
            ContextState::Uninitialized => {
                if matches!(self.output, OutputMode::Device(None)) {
                    match self.open_device() {
                        Ok(stream) => self.output = OutputMode::Device(Some(stream)),
                        Err(e) => tracing::warn!("Audio output unavailable: {:#}", e),
                    }
                }
                self.state = ContextState::Running;
            }
            ContextState::Suspended => self.resume(),
            ContextState::Running => {}
        }
        self.graph()
    }

    fn open_device(&self) -> anyhow::Result<(OutputStream, OutputStreamHandle)> {
        use anyhow::Context;

        let (stream, handle) =
            OutputStream::try_default().context("Failed to open audio output")?;
        let sample_rate = self.graph.with(|graph| graph.sample_rate()).unwrap_or(SAMPLE_RATE);
        let source = GraphSource::new(self.graph(), Arc::clone(&self.suspended), sample_rate);
        handle
            .play_raw(source)
            .context("Failed to start audio playback")?;
        tracing::info!(sample_rate, "Audio output opened");
        Ok((stream, handle))
    }

    /// Freezes the audio clock and silences output.
    pub fn suspend(&mut self) {
        if self.state == ContextState::Running {
            self.suspended.store(true, Ordering::Relaxed);
            self.state = ContextState::Suspended;
        }
    }

    /// Undoes [`AudioContext::suspend`].
    pub fn resume(&mut self) {
        if self.state == ContextState::Suspended {
            self.suspended.store(false, Ordering::Relaxed);
            self.state = ContextState::Running;
        }
    }

    /// Renders `frames` frames into the void, advancing the audio clock.
    ///
    /// Only offline contexts render on demand; for a device-backed context
    /// this does nothing. Suspended contexts do not advance.
    pub fn render_offline(&self, frames: usize) {
        if !matches!(self.output, OutputMode::Offline) || self.suspended.load(Ordering::Relaxed) {
            return;
        }
        let mut left = vec![0.0; BUFFER_SIZE];
        let mut right = vec![0.0; BUFFER_SIZE];
        let mut remaining = frames;
        while remaining > 0 {
            let chunk = remaining.min(BUFFER_SIZE);
            self.graph
                .with(|graph| graph.render(&mut left[..chunk], &mut right[..chunk]));
            remaining -= chunk;
        }
    }

    /// Renders `seconds` worth of frames offline.
    pub fn advance(&self, seconds: f64) {
        let rate = self.graph.with(|graph| graph.sample_rate()).unwrap_or(SAMPLE_RATE);
        self.render_offline((seconds * f64::from(rate)).round() as usize);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_context_lifecycle() {
        let mut ctx = AudioContext::offline(1000);
        assert_eq!(ctx.state(), ContextState::Uninitialized);

        ctx.ensure();
        assert_eq!(ctx.state(), ContextState::Running);

        ctx.advance(0.5);
        assert!((ctx.graph().current_time() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_suspended_clock_is_frozen() {
        let mut ctx = AudioContext::offline(1000);
        ctx.ensure();
        ctx.suspend();
        assert_eq!(ctx.state(), ContextState::Suspended);

        ctx.advance(1.0);
        assert_eq!(ctx.graph().current_time(), 0.0);

        // ensure() resumes opportunistically
        ctx.ensure();
        assert_eq!(ctx.state(), ContextState::Running);
        ctx.advance(0.25);
        assert!((ctx.graph().current_time() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_suspend_before_start_is_ignored() {
        let mut ctx = AudioContext::offline(1000);
        ctx.suspend();
        assert_eq!(ctx.state(), ContextState::Uninitialized);
    }

    #[test]
    fn test_graph_source_renders_interleaved() {
        let ctx = AudioContext::offline(1000);
        let mut source = GraphSource::new(ctx.graph(), Arc::new(AtomicBool::new(false)), 1000);
        assert_eq!(source.channels(), 2);

        let samples: Vec<f32> = source.by_ref().take(BUFFER_SIZE * 2).collect();
        assert!(samples.iter().all(|&s| s == 0.0));
        assert!((ctx.graph().current_time() - BUFFER_SIZE as f64 / 1000.0).abs() < 1e-9);
    }
}
