//! Generative music scheduler.
//!
//! A [`MusicSession`] owns the node graph of one `play` call: three voices,
//! a master gain and a delay-line reverb. [`GenerativeScheduler::play`]
//! builds a session and drives it from a control thread that wakes every
//! tick, asks the [`Sequencer`] for chords inside the lookahead window, and
//! schedules their envelopes on the audio clock at the chords' exact times.

use super::sequencer::Sequencer;
use super::{MoodParams, ScaleDefinition};
use crate::audio::graph::{AudioGraph, GraphError, NodeId, Output, Waveform};
use crate::audio::voice::{Envelope, Voice};
use crate::audio::GraphHandle;
use crate::config::EngineConfig;
use crate::handle::StopHandle;
use crossbeam_channel::RecvTimeoutError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Voices per session.
pub const VOICE_COUNT: usize = 3;

/// Delay time of the simulated room.
const REVERB_DELAY_SECS: f64 = 0.18;

/// Send level into the delay line at full reverb.
const REVERB_SEND_LEVEL: f64 = 0.6;

/// Feedback gain per unit of reverb, before the stability cap.
const REVERB_FEEDBACK_PER_UNIT: f64 = 0.4;

/// Upper bound for the delay line's feedback gain.
///
/// A single delay with feedback `g` is stable for `|g| < 1`, and its gain on
/// a sustained input is `1 / (1 - g)`. Capping `g` at 0.5 keeps the wet path
/// within 2x (+6 dB) of the send. Peaks of the summed voices are still
/// limited by the graph's output clamp.
pub const MAX_REVERB_FEEDBACK: f64 = 0.5;

/// Feedback gain of the reverb delay line for a reverb amount in 0..1.
pub fn reverb_feedback(reverb_amount: f64) -> f64 {
    (reverb_amount.clamp(0.0, 1.0) * REVERB_FEEDBACK_PER_UNIT).min(MAX_REVERB_FEEDBACK)
}

/// Timing knobs for the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    /// How often the control loop wakes.
    pub tick_interval: Duration,
    /// How far ahead of the audio clock chords are scheduled.
    pub lookahead: f64,
    /// Delay between `play` and the first chord.
    pub start_delay: f64,
    /// Master level while playing.
    pub master_level: f32,
    /// Master fade-out on stop.
    pub stop_fade: f64,
    /// Extra wait after the fade before the nodes are removed.
    pub teardown_grace: f64,
    /// Oscillator wave shape.
    pub waveform: Waveform,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for SchedulerSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            tick_interval: Duration::from_millis(config.tick_interval_ms.max(1)),
            lookahead: config.lookahead_secs,
            start_delay: config.start_delay_secs,
            master_level: config.master_level,
            stop_fade: config.stop_fade_secs,
            teardown_grace: config.teardown_grace_ms as f64 / 1000.0,
            waveform: config.waveform,
        }
    }
}

/// The nodes of one session, kept for teardown.
#[derive(Debug, Clone, Copy)]
struct SessionNodes {
    voices: [Voice; VOICE_COUNT],
    master: NodeId,
    reverb_send: NodeId,
    delay: NodeId,
    feedback: NodeId,
}

impl SessionNodes {
    /// Ramps the master to silence from its current level over `fade` and
    /// removes every node `grace` seconds after the ramp ends.
    fn fade_out(self, graph: &mut AudioGraph, fade: f64, grace: f64) {
        let now = graph.current_time();
        if let Ok(master) = graph.gain_mut(self.master) {
            master.cancel_and_hold_at_time(now);
            master.linear_ramp_to_value_at_time(0.0, now + fade);
        }
        graph.schedule_callback(now + fade + grace, Box::new(move |graph| self.teardown(graph)));
    }

    fn teardown(&self, graph: &mut AudioGraph) {
        for voice in &self.voices {
            voice.dispose(graph);
        }
        for node in [self.reverb_send, self.delay, self.feedback, self.master] {
            let _ = graph.disconnect(node);
            let _ = graph.remove(node);
        }
    }
}

/// One running generative session.
pub struct MusicSession {
    sequencer: Sequencer,
    nodes: SessionNodes,
    envelope: Envelope,
    lookahead: f64,
}

impl MusicSession {
    /// Builds the session's node graph and a sequencer whose first chord
    /// lands `settings.start_delay` after the current audio-clock time.
    ///
    /// `params` are sanitized first, so out-of-range input plays the default
    /// scale rather than nothing.
    pub fn build(
        graph: &mut AudioGraph,
        params: &MoodParams,
        settings: &SchedulerSettings,
    ) -> Result<Self, GraphError> {
        let params = params.sanitized();
        let now = graph.current_time();

        let master = graph.create_gain(settings.master_level);
        graph.connect(master, Output::Destination)?;

        // Simulated room: send -> delay <-> feedback, delay -> master
        let reverb_send = graph.create_gain((params.reverb_amount * REVERB_SEND_LEVEL) as f32);
        let delay = graph.create_delay(REVERB_DELAY_SECS);
        let feedback = graph.create_gain(reverb_feedback(params.reverb_amount) as f32);
        graph.connect(reverb_send, delay)?;
        graph.connect(delay, feedback)?;
        graph.connect(feedback, delay)?;
        graph.connect(delay, master)?;

        let outputs = [Output::Node(master), Output::Node(reverb_send)];
        let voices = [
            Voice::create(graph, settings.waveform, &outputs, now)?,
            Voice::create(graph, settings.waveform, &outputs, now)?,
            Voice::create(graph, settings.waveform, &outputs, now)?,
        ];

        let scale = ScaleDefinition::new(params.key, params.scale);
        tracing::info!(
            scale = %scale,
            tempo = params.tempo,
            density = params.density,
            reverb = params.reverb_amount,
            "Starting generative session"
        );

        Ok(Self {
            sequencer: Sequencer::new(scale, params.tempo, params.density, now + settings.start_delay),
            nodes: SessionNodes {
                voices,
                master,
                reverb_send,
                delay,
                feedback,
            },
            envelope: Envelope::for_reverb(params.reverb_amount),
            lookahead: settings.lookahead,
        })
    }

    /// The sequencer driving this session.
    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    /// The session's voices.
    pub fn voices(&self) -> &[Voice; VOICE_COUNT] {
        &self.nodes.voices
    }

    /// The master gain node.
    pub fn master(&self) -> NodeId {
        self.nodes.master
    }

    /// One control step: schedules every chord inside the lookahead window.
    ///
    /// Returns the number of chords scheduled. A voice that fails to accept
    /// a note is skipped; the rest of the chord still plays.
    pub fn tick(&mut self, graph: &mut AudioGraph) -> usize {
        let events = self.sequencer.drain(graph.current_time(), self.lookahead);
        for event in &events {
            for (voice, note) in self.nodes.voices.iter().zip(event.notes.iter()) {
                if let Err(e) = voice.trigger(
                    graph,
                    note.frequency() as f32,
                    event.time,
                    event.sustain,
                    &self.envelope,
                ) {
                    tracing::debug!("Skipping note {}: {}", note, e);
                }
            }
        }
        events.len()
    }

    /// Fades the master out over `fade` seconds and schedules removal of all
    /// nodes `grace` seconds after the fade ends.
    pub fn begin_stop(&self, graph: &mut AudioGraph, fade: f64, grace: f64) {
        self.nodes.fade_out(graph, fade, grace);
    }
}

/// Starts generative sessions on a shared graph.
pub struct GenerativeScheduler {
    graph: GraphHandle,
    settings: SchedulerSettings,
}

impl GenerativeScheduler {
    /// Creates a scheduler for `graph`.
    pub fn new(graph: GraphHandle, settings: SchedulerSettings) -> Self {
        Self { graph, settings }
    }

    /// Starts an endless generative session and returns its stop handle.
    ///
    /// Never fails: if the session cannot be built the handle is a no-op
    /// and the result is silence.
    pub fn play(&self, params: &MoodParams) -> StopHandle {
        let settings = self.settings.clone();
        let built = self
            .graph
            .with(|graph| MusicSession::build(graph, params, &settings));
        let session = match built {
            Some(Ok(session)) => session,
            Some(Err(e)) => {
                tracing::warn!("Failed to build music session: {}", e);
                return StopHandle::noop();
            }
            None => return StopHandle::noop(),
        };

        let stopped = Arc::new(AtomicBool::new(false));
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let nodes = session.nodes;

        let loop_graph = self.graph.clone();
        let loop_stopped = Arc::clone(&stopped);
        let tick_interval = settings.tick_interval;
        let spawned = std::thread::Builder::new()
            .name("music-scheduler".into())
            .spawn(move || run_control_loop(session, loop_graph, loop_stopped, stop_rx, tick_interval));
        if let Err(e) = spawned {
            tracing::warn!("Failed to start scheduler thread: {}", e);
            self.graph.with(|graph| nodes.teardown(graph));
            return StopHandle::noop();
        }

        let graph = self.graph.clone();
        StopHandle::new(move || {
            let _ = stop_tx.try_send(());
            graph.with(|graph| {
                // Under the graph lock, so no tick can slip in after this
                stopped.store(true, Ordering::SeqCst);
                nodes.fade_out(graph, settings.stop_fade, settings.teardown_grace);
            });
            tracing::info!("Generative session stopped");
        })
    }
}

/// Ticks `session` until it is stopped or nothing else holds the graph.
///
/// Dropping every stop handle does not end the session; the loop then keeps
/// time with a plain sleep.
fn run_control_loop(
    mut session: MusicSession,
    graph: GraphHandle,
    stopped: Arc<AtomicBool>,
    stop_rx: crossbeam_channel::Receiver<()>,
    tick_interval: Duration,
) {
    loop {
        if !graph.is_shared() {
            break;
        }
        let alive = graph.with(|graph| {
            if stopped.load(Ordering::SeqCst) {
                return false;
            }
            let scheduled = session.tick(graph);
            if scheduled > 0 {
                tracing::trace!(scheduled, "Scheduled chords");
            }
            true
        });
        if alive != Some(true) {
            break;
        }

        match stop_rx.recv_timeout(tick_interval) {
            Ok(()) => break,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => std::thread::sleep(tick_interval),
        }
    }
    tracing::debug!("Scheduler control loop exited");
}
