//! Offline export.
//!
//! Renders a generative session to a WAV file by driving the same
//! [`MusicSession`] the live scheduler uses on a private graph, with one
//! control tick per render block. A block never spans more than one tick
//! interval, which keeps every chord inside the lookahead window.

use super::graph::AudioGraph;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::music::{MoodParams, MusicSession, SchedulerSettings};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::Path;

/// Upper bound on frames rendered between control ticks.
const RENDER_BUFFER_SIZE: usize = 1024;

/// Exports `seconds` of generative music for `params` to a WAV file.
///
/// After the requested length the session is stopped and its fade-out tail
/// is rendered too, so the file ends in silence.
///
/// # Arguments
///
/// * `params` - Mood parameters for the session
/// * `config` - Engine configuration (sample rate, timing, waveform)
/// * `output_path` - Path for the output WAV file
/// * `seconds` - Length before the fade-out starts
/// * `progress_callback` - Optional callback for progress updates (0.0 to 1.0)
///
/// # Errors
///
/// Returns error if:
/// - The output file cannot be created or written
/// - The session's node graph cannot be built
pub fn render_mood_to_wav<P, F>(
    params: &MoodParams,
    config: &EngineConfig,
    output_path: P,
    seconds: f64,
    mut progress_callback: Option<F>,
) -> Result<(), EngineError>
where
    P: AsRef<Path>,
    F: FnMut(f32),
{
    let settings = SchedulerSettings::from(config);
    let mut graph = AudioGraph::new(config.sample_rate);
    let mut session = MusicSession::build(&mut graph, params, &settings)?;

    let rate = f64::from(graph.sample_rate());
    let body_frames = (seconds.max(0.0) * rate) as usize;
    let tail_frames = ((settings.stop_fade + settings.teardown_grace) * rate).round() as usize;
    let block = ((settings.tick_interval.as_secs_f64() * rate) as usize).clamp(1, RENDER_BUFFER_SIZE);
    let total_frames = body_frames + tail_frames;

    let spec = WavSpec {
        channels: 2,
        sample_rate: graph.sample_rate(),
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(output_path.as_ref(), spec)?;

    let mut left_buf = vec![0.0f32; block];
    let mut right_buf = vec![0.0f32; block];
    let mut current_frame = 0usize;
    let mut stopping = false;

    while current_frame < total_frames {
        if current_frame >= body_frames && !stopping {
            session.begin_stop(&mut graph, settings.stop_fade, settings.teardown_grace);
            stopping = true;
        }
        if !stopping {
            session.tick(&mut graph);
        }

        // Never render past the point where the stop should begin
        let limit = if stopping { total_frames } else { body_frames };
        let frames = (limit - current_frame).min(block);
        graph.render(&mut left_buf[..frames], &mut right_buf[..frames]);

        for i in 0..frames {
            // Convert f32 (-1.0 to 1.0) to i16
            let left_sample = (left_buf[i] * 32767.0).clamp(-32768.0, 32767.0) as i16;
            let right_sample = (right_buf[i] * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer.write_sample(left_sample)?;
            writer.write_sample(right_sample)?;
        }

        current_frame += frames;

        if let Some(ref mut callback) = progress_callback {
            callback(current_frame as f32 / total_frames as f32);
        }
    }

    writer.finalize()?;
    tracing::info!(
        path = %output_path.as_ref().display(),
        frames = total_frames,
        "Exported generative session"
    );

    Ok(())
}
