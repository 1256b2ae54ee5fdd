mod common;

use ambience::audio::NodeId;
use ambience::{AmbienceEngine, EngineConfig, FadeOptions, SessionPhase};
use common::WavFixture;

const RATE: u32 = 1000;

fn engine() -> AmbienceEngine {
    AmbienceEngine::offline(EngineConfig {
        sample_rate: RATE,
        ..EngineConfig::default()
    })
}

fn gain_at(engine: &AmbienceEngine, id: NodeId, at: f64) -> f32 {
    engine
        .graph()
        .with(|g| g.gain_at(id, at))
        .and_then(Result::ok)
        .unwrap_or(f32::NAN)
}

fn node_count(engine: &AmbienceEngine) -> usize {
    engine.graph().with(|g| g.node_count()).unwrap_or(0)
}

#[test]
fn test_track_fixture_plays() {
    let fixture = WavFixture::sine(RATE, 110.0, 3.0);
    assert!(fixture.path().exists());

    let mut engine = engine();
    let _ = engine.play_track_default(&fixture.locator());
    let session = engine.player().active_session().unwrap();
    assert!(session.source().is_some());

    engine.context().advance(0.1);
    assert_eq!(session.phase(), SessionPhase::Playing);
}

#[test]
fn test_crossfade_is_monotonic() {
    let a = WavFixture::sine(RATE, 110.0, 3.0);
    let b = WavFixture::sine(RATE, 165.0, 3.0);
    let mut engine = engine();

    let _ = engine.play_track_default(&a.locator());
    let first = engine.player().active_session().unwrap();
    engine.context().advance(1.0);

    let _ = engine.play_track_default(&b.locator());
    let second = engine.player().active_session().unwrap();
    assert_eq!(first.phase(), SessionPhase::Fading);

    let start = engine.graph().current_time();
    let mut previous = (f32::INFINITY, f32::NEG_INFINITY);
    for step in 0..=80 {
        let t = start + step as f64 * 0.01;
        let outgoing = gain_at(&engine, first.gain(), t);
        let incoming = gain_at(&engine, second.gain(), t);

        assert!(outgoing <= previous.0 + 1e-6, "outgoing rose at {}", t);
        assert!(incoming >= previous.1 - 1e-6, "incoming fell at {}", t);
        assert!(!(outgoing >= 1.0 && incoming >= 1.0), "both at full gain at {}", t);
        previous = (outgoing, incoming);
    }
    assert!(previous.0.abs() < 1e-4);
    assert!((previous.1 - 1.0).abs() < 1e-4);
}

#[test]
fn test_superseded_track_is_disposed_after_grace() {
    let a = WavFixture::sine(RATE, 110.0, 3.0);
    let b = WavFixture::sine(RATE, 165.0, 3.0);
    let mut engine = engine();

    let _ = engine.play_track(&a.locator(), FadeOptions::default());
    let first = engine.player().active_session().unwrap();
    engine.context().advance(1.0);
    let _ = engine.play_track(&b.locator(), FadeOptions::default());
    assert_eq!(node_count(&engine), 4);

    // 0.8 s fade + 0.12 s grace
    engine.context().advance(0.85);
    assert_eq!(node_count(&engine), 4);
    assert_ne!(first.phase(), SessionPhase::Disposed);

    engine.context().advance(0.1);
    assert_eq!(first.phase(), SessionPhase::Disposed);
    assert_eq!(node_count(&engine), 2);
    assert!(engine.graph().with(|g| g.contains(first.gain())) == Some(false));
}

#[test]
fn test_stop_twice_equals_stop_once() {
    let a = WavFixture::sine(RATE, 110.0, 3.0);
    let mut engine = engine();

    let handle = engine.play_track_default(&a.locator());
    engine.context().advance(0.5);
    handle.stop();
    let pending = engine.graph().with(|g| g.pending_callbacks());
    handle.stop();
    assert_eq!(engine.graph().with(|g| g.pending_callbacks()), pending);
    assert_eq!(engine.player().phase(), SessionPhase::Idle);

    engine.context().advance(1.0);
    assert_eq!(node_count(&engine), 0);
}

#[test]
fn test_undecodable_track_is_silent() {
    let path = std::env::temp_dir().join(format!("ambience-garbage-{}.mp3", uuid::Uuid::new_v4()));
    std::fs::write(&path, b"not audio at all").unwrap();

    let mut engine = engine();
    let handle = engine.play_track_default(&path.display().to_string());
    let session = engine.player().active_session().unwrap();
    assert!(session.source().is_none());
    handle.stop();

    std::fs::remove_file(&path).ok();
}
