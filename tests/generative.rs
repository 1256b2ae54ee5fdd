use ambience::audio::AudioGraph;
use ambience::music::{MusicSession, SchedulerSettings};
use ambience::{AmbienceEngine, EngineConfig, MoodParams};

fn node_count(engine: &AmbienceEngine) -> usize {
    engine.graph().with(|g| g.node_count()).unwrap_or(usize::MAX)
}

#[test]
fn test_engine_stop_and_restart_leaves_no_residue() {
    let mut engine = AmbienceEngine::offline(EngineConfig {
        sample_rate: 1000,
        ..EngineConfig::default()
    });
    let params = MoodParams::default();

    let first = engine.play(&params);
    assert_eq!(node_count(&engine), 10);
    engine.context().advance(1.0);

    first.stop();
    first.stop();
    // 0.2 s fade + 0.1 s grace
    engine.context().advance(0.5);
    assert_eq!(node_count(&engine), 0);

    let second = engine.play(&params);
    assert_eq!(node_count(&engine), 10);
    second.stop();
    engine.context().advance(0.5);
    assert_eq!(node_count(&engine), 0);
}

#[test]
fn test_restart_uses_fresh_nodes() {
    let mut graph = AudioGraph::new(1000);
    let settings = SchedulerSettings::default();
    let params = MoodParams::default();

    let mut first = MusicSession::build(&mut graph, &params, &settings).unwrap();
    first.tick(&mut graph);
    let old_master = first.master();
    let old_voices: Vec<_> = first.voices().iter().map(|v| v.oscillator()).collect();
    first.begin_stop(&mut graph, settings.stop_fade, settings.teardown_grace);

    let mut left = vec![0.0; 400];
    let mut right = vec![0.0; 400];
    graph.render(&mut left, &mut right);
    assert_eq!(graph.node_count(), 0);

    let second = MusicSession::build(&mut graph, &params, &settings).unwrap();
    assert_ne!(second.master(), old_master);
    assert!(!graph.contains(old_master));
    for (voice, old) in second.voices().iter().zip(old_voices) {
        assert_ne!(voice.oscillator(), old);
        assert!(!graph.contains(old));
    }
    assert_eq!(graph.node_count(), 10);
}

#[test]
fn test_model_response_drives_session() {
    let params = MoodParams::from_json(
        r#"{ "mood": "calm", "music": { "tempo": "120", "scale": "major", "key": "G", "density": 1, "reverb": 0.9 } }"#,
    )
    .unwrap();

    let mut graph = AudioGraph::new(1000);
    let session = MusicSession::build(&mut graph, &params, &SchedulerSettings::default()).unwrap();
    let sequencer = session.sequencer();
    assert_eq!(sequencer.step(), 2);
    assert!((sequencer.beat() - 0.5).abs() < 1e-9);
    assert_eq!(sequencer.scale().root(), 7);

    let names: Vec<String> = sequencer.scale().notes().iter().map(|n| n.to_string()).collect();
    // Pitch classes wrap within the reference octave
    assert_eq!(names, ["G4", "A4", "B4", "C4", "D4", "E4", "F#4"]);
}

#[test]
fn test_generative_session_is_audible() {
    let mut graph = AudioGraph::new(8000);
    let mut session =
        MusicSession::build(&mut graph, &MoodParams::default(), &SchedulerSettings::default())
            .unwrap();

    let mut left = vec![0.0; 200];
    let mut right = vec![0.0; 200];
    let mut peak = 0.0f32;
    for _ in 0..40 {
        session.tick(&mut graph);
        graph.render(&mut left, &mut right);
        assert!(left.iter().chain(right.iter()).all(|s| s.is_finite()));
        peak = left.iter().chain(right.iter()).fold(peak, |p, s| p.max(s.abs()));
    }
    assert!(peak > 0.05);
}
