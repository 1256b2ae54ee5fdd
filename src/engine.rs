//! The ambience engine: one output context shared by a crossfade player and
//! a generative scheduler.
//!
//! Everything that would otherwise be process-wide (the output context and
//! the active track slot) lives in an engine instance, so several engines can
//! run side by side and tests can use offline engines in isolation.

use crate::audio::{AudioContext, ContextState, GraphHandle};
use crate::config::EngineConfig;
use crate::handle::StopHandle;
use crate::music::{GenerativeScheduler, MoodParams, SchedulerSettings};
use crate::player::{CrossfadePlayer, FadeOptions};

/// Owns the audio context and both playback components.
pub struct AmbienceEngine {
    context: AudioContext,
    player: CrossfadePlayer,
    scheduler: GenerativeScheduler,
    config: EngineConfig,
}

impl AmbienceEngine {
    /// Creates an engine that plays through the default output device.
    ///
    /// The device is opened on the first `play_track` or `play` call.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_context(AudioContext::new(config.sample_rate), config)
    }

    /// Creates an engine without an output device; its audio clock advances
    /// only through [`AudioContext::render_offline`].
    pub fn offline(config: EngineConfig) -> Self {
        Self::with_context(AudioContext::offline(config.sample_rate), config)
    }

    fn with_context(context: AudioContext, config: EngineConfig) -> Self {
        let graph = context.graph();
        let player = CrossfadePlayer::new(
            graph.clone(),
            config.disposal_grace_secs(),
            config.track_root.clone(),
        );
        let scheduler = GenerativeScheduler::new(graph, SchedulerSettings::from(&config));
        Self {
            context,
            player,
            scheduler,
            config,
        }
    }

    /// Plays a track, crossfading from whatever track is playing.
    pub fn play_track(&mut self, locator: &str, options: FadeOptions) -> StopHandle {
        self.context.ensure();
        self.player.play_track(locator, options)
    }

    /// Plays a track with the configured default fades.
    pub fn play_track_default(&mut self, locator: &str) -> StopHandle {
        let options = self.config.fade;
        self.play_track(locator, options)
    }

    /// Starts generative music for `params`.
    pub fn play(&mut self, params: &MoodParams) -> StopHandle {
        self.context.ensure();
        self.scheduler.play(params)
    }

    /// The crossfade player.
    pub fn player(&self) -> &CrossfadePlayer {
        &self.player
    }

    /// The output context.
    pub fn context(&self) -> &AudioContext {
        &self.context
    }

    /// Mutable access to the output context (suspend/resume).
    pub fn context_mut(&mut self) -> &mut AudioContext {
        &mut self.context
    }

    /// Current context state.
    pub fn state(&self) -> ContextState {
        self.context.state()
    }

    /// Handle to the shared graph.
    pub fn graph(&self) -> GraphHandle {
        self.context.graph()
    }

    /// The configuration the engine was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl Default for AmbienceEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
