//! ambience - command-line front end for the installation audio engine.
//!
//! Plays tracks with crossfades, runs generative music for a mood, or
//! renders a mood to a WAV file.
//!
//! # Usage
//!
//! ```bash
//! ambience track /tracks/forest.mp3 /tracks/rain.mp3 --hold 20
//! ambience mood '{"tempo": 72, "scale": "major", "key": "F"}' --seconds 60
//! ambience render mood.json out.wav --seconds 30
//! ```
//!
//! Set `RUST_LOG=ambience=debug` for engine logs.

use ambience::audio::render_mood_to_wav;
use ambience::{AmbienceEngine, EngineConfig, MoodParams};

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

const DEFAULT_HOLD_SECS: f64 = 10.0;
const DEFAULT_MOOD_SECS: f64 = 30.0;

/// What to do once options are parsed.
enum Command {
    /// Play each track in turn, crossfading between them.
    Track { locators: Vec<String>, hold: f64 },
    /// Play generative music for a while.
    Mood { mood: String, seconds: f64 },
    /// Render generative music to a WAV file.
    Render {
        mood: String,
        output: PathBuf,
        seconds: f64,
    },
}

/// Command-line options for the application.
struct CliOptions {
    /// Path to a JSON engine config.
    config: Option<PathBuf>,
    command: Command,
}

impl CliOptions {
    /// Parses command-line arguments.
    ///
    /// Supports:
    /// - `--config <path>` or `-c <path>`: Load engine settings from JSON
    /// - `--hold <secs>`: Time each track plays before the next (track)
    /// - `--seconds <secs>`: Length of the session (mood, render)
    /// - `--help` or `-h`: Print help and exit
    fn parse() -> Result<Self> {
        let args: Vec<String> = std::env::args().collect();
        let mut config: Option<PathBuf> = None;
        let mut hold: Option<f64> = None;
        let mut seconds: Option<f64> = None;
        let mut positional: Vec<String> = Vec::new();
        let mut i = 1;

        while i < args.len() {
            match args[i].as_str() {
                "--config" | "-c" => {
                    i += 1;
                    let value = args.get(i).context("--config requires a path argument")?;
                    config = Some(PathBuf::from(value));
                }
                "--hold" => {
                    i += 1;
                    hold = Some(parse_seconds("--hold", args.get(i))?);
                }
                "--seconds" | "-s" => {
                    i += 1;
                    seconds = Some(parse_seconds("--seconds", args.get(i))?);
                }
                "--help" | "-h" => {
                    print_help(args.first().map(String::as_str).unwrap_or("ambience"));
                    std::process::exit(0);
                }
                other if other.starts_with("--") => {
                    eprintln!("Unknown option: {}", other);
                    eprintln!("Use --help for usage information");
                    std::process::exit(1);
                }
                other => positional.push(other.to_string()),
            }
            i += 1;
        }

        let mut positional = positional.into_iter();
        let command = match positional.next().as_deref() {
            Some("track") => {
                let locators: Vec<String> = positional.collect();
                if locators.is_empty() {
                    bail!("track requires at least one LOCATOR");
                }
                Command::Track {
                    locators,
                    hold: hold.unwrap_or(DEFAULT_HOLD_SECS),
                }
            }
            Some("mood") => Command::Mood {
                mood: positional.next().context("mood requires MOOD_JSON")?,
                seconds: seconds.unwrap_or(DEFAULT_MOOD_SECS),
            },
            Some("render") => Command::Render {
                mood: positional.next().context("render requires MOOD_JSON")?,
                output: positional
                    .next()
                    .map(PathBuf::from)
                    .context("render requires OUT.wav")?,
                seconds: seconds.unwrap_or(DEFAULT_MOOD_SECS),
            },
            Some(other) => bail!("Unknown command: {} (use --help)", other),
            None => bail!("No command given (use --help)"),
        };

        Ok(Self { config, command })
    }
}

fn parse_seconds(flag: &str, value: Option<&String>) -> Result<f64> {
    let value = value.with_context(|| format!("{} requires a number of seconds", flag))?;
    let secs: f64 = value
        .parse()
        .with_context(|| format!("{} expects seconds, got {:?}", flag, value))?;
    if !secs.is_finite() || secs < 0.0 {
        bail!("{} must be a non-negative number", flag);
    }
    Ok(secs)
}

fn print_help(program: &str) {
    eprintln!("ambience - installation audio engine");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {} [OPTIONS] track LOCATOR... [--hold SECS]", program);
    eprintln!("  {} [OPTIONS] mood MOOD_JSON [--seconds N]", program);
    eprintln!("  {} [OPTIONS] render MOOD_JSON OUT.wav [--seconds N]", program);
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --config PATH   Load engine settings from a JSON file");
    eprintln!("  --hold SECS         Play time per track (default {})", DEFAULT_HOLD_SECS);
    eprintln!("  -s, --seconds N     Session length (default {})", DEFAULT_MOOD_SECS);
    eprintln!("  -h, --help          Print this help message");
    eprintln!();
    eprintln!("MOOD_JSON is a path to a JSON file or an inline JSON object.");
}

/// Reads mood parameters from a file path or inline JSON.
fn load_mood(arg: &str) -> Result<MoodParams> {
    let json = if arg.trim_start().starts_with('{') {
        arg.to_string()
    } else {
        std::fs::read_to_string(arg).with_context(|| format!("Failed to read mood file {}", arg))?
    };
    MoodParams::from_json(&json).context("Failed to parse mood parameters")
}

fn sleep_secs(secs: f64) {
    thread::sleep(Duration::from_secs_f64(secs.max(0.0)));
}

/// Main entry point.
fn main() -> Result<()> {
    let cli = CliOptions::parse()?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = match cli.config {
        Some(ref path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Command::Track { locators, hold } => play_tracks(config, &locators, hold),
        Command::Mood { mood, seconds } => play_mood(config, &load_mood(&mood)?, seconds),
        Command::Render {
            mood,
            output,
            seconds,
        } => render(&config, &load_mood(&mood)?, &output, seconds),
    }
}

fn play_tracks(config: EngineConfig, locators: &[String], hold: f64) -> Result<()> {
    let mut engine = AmbienceEngine::new(config);
    let mut last = None;
    for locator in locators {
        eprintln!("Playing {}", locator);
        last = Some(engine.play_track_default(locator));
        sleep_secs(hold);
    }
    if let Some(handle) = last {
        handle.stop();
    }
    let config = engine.config();
    sleep_secs(config.fade.fade_out + config.disposal_grace_secs());
    Ok(())
}

fn play_mood(config: EngineConfig, params: &MoodParams, seconds: f64) -> Result<()> {
    let mut engine = AmbienceEngine::new(config);
    eprintln!("Playing {:?} for {}s", params.sanitized(), seconds);
    let handle = engine.play(params);
    sleep_secs(seconds);
    handle.stop();
    let config = engine.config();
    sleep_secs(config.stop_fade_secs + config.teardown_grace_ms as f64 / 1000.0);
    Ok(())
}

fn render(config: &EngineConfig, params: &MoodParams, output: &Path, seconds: f64) -> Result<()> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let mut last_percent = 0;
    let result = render_mood_to_wav(
        params,
        config,
        output,
        seconds,
        Some(|progress: f32| {
            let percent = (progress * 100.0) as u32;
            if percent >= last_percent + 10 {
                last_percent = percent;
                eprintln!("Rendering... {}%", percent);
            }
        }),
    );

    match result {
        Ok(()) => {
            eprintln!("Exported to {}", output.display());
            Ok(())
        }
        Err(e) => {
            tracing::error!("Export failed: {:?}", e);
            Err(e).context("Export failed")
        }
    }
}
