//! Crossfade track player.
//!
//! Keeps at most one active [`PlaybackSession`]. Starting a new track fades
//! the previous one out from whatever level it is at while the new one fades
//! in; the old session's nodes are removed by a callback on the audio clock
//! once its fade (plus a short grace) has elapsed. A track that simply runs
//! out is removed right away, without a fade.

use crate::audio::{AudioGraph, GraphHandle, NodeId, Output};
use crate::error::EngineError;
use crate::handle::StopHandle;
use rodio::cpal::FromSample;
use rodio::source::UniformSourceIterator;
use rodio::{Decoder, Sample, Source};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Channels the graph renders.
const GRAPH_CHANNELS: u16 = 2;

/// Fade durations for [`CrossfadePlayer::play_track`], in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FadeOptions {
    pub fade_in: f64,
    pub fade_out: f64,
}

impl Default for FadeOptions {
    fn default() -> Self {
        Self {
            fade_in: 0.8,
            fade_out: 0.8,
        }
    }
}

impl FadeOptions {
    /// Negative or non-finite durations become zero.
    fn sanitized(self) -> Self {
        Self {
            fade_in: non_negative(self.fade_in),
            fade_out: non_negative(self.fade_out),
        }
    }
}

fn non_negative(secs: f64) -> f64 {
    if secs.is_finite() {
        secs.max(0.0)
    } else {
        0.0
    }
}

/// Lifecycle of a playback session. Phases only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum SessionPhase {
    Idle = 0,
    Starting = 1,
    Playing = 2,
    Fading = 3,
    Disposed = 4,
}

impl SessionPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionPhase::Idle,
            1 => SessionPhase::Starting,
            2 => SessionPhase::Playing,
            3 => SessionPhase::Fading,
            _ => SessionPhase::Disposed,
        }
    }
}

/// Shared, forward-only phase cell (written from both the control and the
/// render thread).
#[derive(Debug)]
struct PhaseCell(AtomicU8);

impl PhaseCell {
    fn new(phase: SessionPhase) -> Self {
        Self(AtomicU8::new(phase as u8))
    }

    fn get(&self) -> SessionPhase {
        SessionPhase::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Moves to `phase` unless already past it.
    fn advance(&self, phase: SessionPhase) {
        self.0.fetch_max(phase as u8, Ordering::SeqCst);
    }
}

/// One track being played.
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    id: Uuid,
    locator: String,
    /// Absent when the track could not be opened.
    source: Option<NodeId>,
    gain: NodeId,
    phase: Arc<PhaseCell>,
}

impl PlaybackSession {
    /// Unique session id (for logs).
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The locator this session was started with.
    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// The track source node, if the track opened.
    pub fn source(&self) -> Option<NodeId> {
        self.source
    }

    /// The session's fade gain node.
    pub fn gain(&self) -> NodeId {
        self.gain
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase.get()
    }

    /// Ramps the gain from its current value to zero over `fade_out` and
    /// schedules disposal `grace` seconds after the ramp ends.
    fn fade_out(self, graph: &mut AudioGraph, fade_out: f64, grace: f64) {
        if self.phase() == SessionPhase::Disposed {
            return;
        }
        self.phase.advance(SessionPhase::Fading);

        let now = graph.current_time();
        match graph.gain_mut(self.gain) {
            Ok(gain) => {
                gain.cancel_and_hold_at_time(now);
                gain.linear_ramp_to_value_at_time(0.0, now + fade_out);
            }
            Err(e) => tracing::debug!("Fade-out skipped: {}", e),
        }

        tracing::debug!(session = %self.id, fade_out, "Fading out track");
        graph.schedule_callback(now + fade_out + grace, Box::new(move |graph| self.dispose(graph)));
    }

    /// Pauses the source, detaches its end listener and removes both nodes.
    /// Every step tolerates nodes that are already gone.
    fn dispose(&self, graph: &mut AudioGraph) {
        if let Some(source) = self.source {
            let _ = graph.pause(source);
            let _ = graph.set_on_ended(source, None);
            let _ = graph.disconnect(source);
            let _ = graph.remove(source);
        }
        let _ = graph.disconnect(self.gain);
        let _ = graph.remove(self.gain);
        if self.phase() != SessionPhase::Disposed {
            self.phase.advance(SessionPhase::Disposed);
            tracing::debug!(session = %self.id, locator = %self.locator, "Track disposed");
        }
    }
}

/// State shared by the player and its stop handles.
struct PlayerShared {
    graph: GraphHandle,
    active: Mutex<Option<PlaybackSession>>,
    disposal_grace: f64,
}

impl PlayerShared {
    fn active(&self) -> MutexGuard<'_, Option<PlaybackSession>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fades out and disposes whichever session is active.
    fn stop_active(&self, fade_out: f64) {
        let mut active = self.active();
        if let Some(session) = active.take() {
            tracing::info!(session = %session.id, locator = %session.locator, "Stopping track");
            self.graph
                .with(|graph| session.fade_out(graph, fade_out, self.disposal_grace));
        }
    }
}

/// Plays one foreground track at a time with crossfades.
pub struct CrossfadePlayer {
    shared: Arc<PlayerShared>,
    track_root: Option<PathBuf>,
}

impl CrossfadePlayer {
    /// Creates a player on `graph`.
    ///
    /// # Arguments
    ///
    /// * `graph` - The graph to play into
    /// * `disposal_grace` - Seconds to wait after a fade-out before removing nodes
    /// * `track_root` - Directory relative track locators resolve against
    pub fn new(graph: GraphHandle, disposal_grace: f64, track_root: Option<PathBuf>) -> Self {
        Self {
            shared: Arc::new(PlayerShared {
                graph,
                active: Mutex::new(None),
                disposal_grace: disposal_grace.max(0.0),
            }),
            track_root,
        }
    }

    /// Snapshot of the active session, if any.
    pub fn active_session(&self) -> Option<PlaybackSession> {
        self.shared.active().clone()
    }

    /// Phase of the active slot; `Idle` when nothing has been played or the
    /// last session was stopped.
    pub fn phase(&self) -> SessionPhase {
        self.shared
            .active()
            .as_ref()
            .map_or(SessionPhase::Idle, PlaybackSession::phase)
    }

    /// Opens and plays the track at `locator`, crossfading from the current one.
    ///
    /// A track that cannot be opened or decoded is logged and results in a
    /// silent session; the returned handle is valid either way.
    pub fn play_track(&self, locator: &str, options: FadeOptions) -> StopHandle {
        let path = resolve_locator(locator, self.track_root.as_deref());
        match open_track(locator, &path) {
            Ok(decoder) => self.play_source(locator, decoder, options),
            Err(e) => {
                tracing::warn!("{}", e);
                self.start_session(locator, None, options)
            }
        }
    }

    /// Plays an already-open rodio source, crossfading from the current one.
    ///
    /// The source is converted to the graph's channel count and sample rate.
    pub fn play_source<S>(&self, label: &str, source: S, options: FadeOptions) -> StopHandle
    where
        S: Source + Send + 'static,
        S::Item: Sample + Send,
        f32: FromSample<S::Item>,
    {
        let sample_rate = self
            .shared
            .graph
            .with(|graph| graph.sample_rate())
            .unwrap_or(crate::audio::SAMPLE_RATE);
        let samples: UniformSourceIterator<S, f32> =
            UniformSourceIterator::new(source, GRAPH_CHANNELS, sample_rate);
        self.start_session(label, Some(Box::new(samples)), options)
    }

    /// Stops whichever session is active, fading it out over `fade_out`.
    pub fn stop(&self, fade_out: f64) {
        self.shared.stop_active(non_negative(fade_out));
    }

    fn start_session(
        &self,
        locator: &str,
        samples: Option<Box<dyn Iterator<Item = f32> + Send>>,
        options: FadeOptions,
    ) -> StopHandle {
        let options = options.sanitized();
        let shared = &self.shared;
        let mut active = shared.active();

        let session = shared.graph.with(|graph| {
            if let Some(previous) = active.take() {
                previous.fade_out(graph, options.fade_out, shared.disposal_grace);
            }
            build_session(graph, locator, samples, options.fade_in)
        });

        let Some(session) = session else {
            return StopHandle::noop();
        };
        tracing::info!(
            session = %session.id,
            locator = %session.locator,
            fade_in = options.fade_in,
            "Starting track"
        );
        *active = Some(session);
        drop(active);

        let shared = Arc::clone(&self.shared);
        StopHandle::new(move || shared.stop_active(options.fade_out))
    }
}

/// Creates the nodes of a new session and starts its fade-in.
fn build_session(
    graph: &mut AudioGraph,
    locator: &str,
    samples: Option<Box<dyn Iterator<Item = f32> + Send>>,
    fade_in: f64,
) -> PlaybackSession {
    let now = graph.current_time();
    let phase = Arc::new(PhaseCell::new(SessionPhase::Starting));

    let gain = graph.create_gain(0.0);
    if let Err(e) = graph.connect(gain, Output::Destination) {
        tracing::debug!("Connecting track gain failed: {}", e);
    }
    if let Ok(param) = graph.gain_mut(gain) {
        param.set_value_at_time(0.0, now);
        param.linear_ramp_to_value_at_time(1.0, now + fade_in);
    }

    let source = samples.map(|samples| graph.create_track(samples));
    let session = PlaybackSession {
        id: Uuid::new_v4(),
        locator: locator.to_string(),
        source,
        gain,
        phase,
    };

    if let Some(source) = source {
        if let Err(e) = graph.connect(source, gain) {
            tracing::debug!("Connecting track source failed: {}", e);
        }

        let started = Arc::clone(&session.phase);
        let _ = graph.set_on_started(
            source,
            Some(Box::new(move |_: &mut AudioGraph| {
                started.advance(SessionPhase::Playing)
            })),
        );

        // Natural end: no fade, dispose immediately
        let ended = session.clone();
        let _ = graph.set_on_ended(
            source,
            Some(Box::new(move |graph: &mut AudioGraph| {
                tracing::debug!(session = %ended.id, "Track ended");
                ended.dispose(graph);
            })),
        );
    }

    session
}

/// Maps a track locator to a file path.
///
/// `file://` prefixes are stripped. With a `track_root`, relative locators
/// and site-rooted ones like `/audio/tracks/a.mp3` resolve under it unless
/// the locator already names an existing file.
pub fn resolve_locator(locator: &str, track_root: Option<&Path>) -> PathBuf {
    let trimmed = locator.trim();
    let raw = trimmed.strip_prefix("file://").unwrap_or(trimmed);
    let path = PathBuf::from(raw);

    match track_root {
        Some(root) if !path.exists() => root.join(raw.trim_start_matches('/')),
        _ => path,
    }
}

fn open_track(locator: &str, path: &Path) -> Result<Decoder<BufReader<File>>, EngineError> {
    let file = File::open(path).map_err(|source| EngineError::TrackOpen {
        locator: locator.to_string(),
        source,
    })?;
    Decoder::new(BufReader::new(file)).map_err(|source| EngineError::TrackDecode {
        locator: locator.to_string(),
        source,
    })
}
