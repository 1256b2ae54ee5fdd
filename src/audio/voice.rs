//! The voice primitive: one oscillator feeding one envelope gain.

use super::graph::{AudioGraph, GraphError, NodeId, Output, Waveform};

/// Attack time in seconds.
pub const ATTACK_SECS: f64 = 0.02;

/// Envelope peak amplitude.
pub const PEAK_LEVEL: f32 = 0.65;

/// The frequency change lands this long before the note so the oscillator
/// is already retuned when the attack starts.
const FREQUENCY_LEAD_SECS: f64 = 0.0005;

/// Shortest held segment before the release starts.
const MIN_HOLD_SECS: f64 = 0.2;

/// Amplitude envelope for one note.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub attack: f64,
    pub peak: f32,
    pub release: f64,
}

impl Envelope {
    /// Envelope whose release grows with the reverb amount: 1 s plus 2 s per
    /// unit of reverb, clamped to 0.3–2.5 s.
    pub fn for_reverb(reverb_amount: f64) -> Self {
        Self {
            attack: ATTACK_SECS,
            peak: PEAK_LEVEL,
            release: (1.0 + reverb_amount * 2.0).clamp(0.3, 2.5),
        }
    }

    /// Time at which a note starting at `at` with `sustain` seconds of
    /// nominal length has fully decayed.
    pub fn end_time(&self, at: f64, sustain: f64) -> f64 {
        at + (sustain * 0.8).max(MIN_HOLD_SECS) + self.release
    }
}

/// One reusable synthesis unit (oscillator + envelope gain).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Voice {
    oscillator: NodeId,
    gain: NodeId,
}

impl Voice {
    /// Creates the voice's nodes, routes the envelope gain into each of
    /// `outputs` and starts the oscillator at `start_time`.
    ///
    /// The gain starts at zero, so the running oscillator is inaudible until
    /// the first [`Voice::trigger`].
    pub fn create(
        graph: &mut AudioGraph,
        waveform: Waveform,
        outputs: &[Output],
        start_time: f64,
    ) -> Result<Self, GraphError> {
        let oscillator = graph.create_oscillator(waveform, 440.0);
        let gain = graph.create_gain(0.0);
        graph.connect(oscillator, gain)?;
        for &output in outputs {
            graph.connect(gain, output)?;
        }
        graph.start(oscillator, start_time)?;
        Ok(Self { oscillator, gain })
    }

    /// The oscillator node.
    pub fn oscillator(&self) -> NodeId {
        self.oscillator
    }

    /// The envelope gain node.
    pub fn gain(&self) -> NodeId {
        self.gain
    }

    /// Schedules a note at audio-clock time `at`.
    ///
    /// Any tail of the previous note is held at its current level and the
    /// attack rises from there, so retriggering never jumps.
    pub fn trigger(
        &self,
        graph: &mut AudioGraph,
        frequency: f32,
        at: f64,
        sustain: f64,
        envelope: &Envelope,
    ) -> Result<(), GraphError> {
        graph
            .frequency_mut(self.oscillator)?
            .set_value_at_time(frequency, at - FREQUENCY_LEAD_SECS);

        let gain = graph.gain_mut(self.gain)?;
        gain.cancel_and_hold_at_time(at);
        gain.linear_ramp_to_value_at_time(envelope.peak, at + envelope.attack);
        gain.linear_ramp_to_value_at_time(0.0, envelope.end_time(at, sustain));
        Ok(())
    }

    /// Stops the oscillator and removes both nodes.
    ///
    /// Safe to call on a voice whose nodes are already gone.
    pub fn dispose(&self, graph: &mut AudioGraph) {
        let now = graph.current_time();
        let _ = graph.stop(self.oscillator, now);
        let _ = graph.disconnect(self.oscillator);
        let _ = graph.disconnect(self.gain);
        let _ = graph.remove(self.oscillator);
        let _ = graph.remove(self.gain);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_release_scales_with_reverb() {
        assert!((Envelope::for_reverb(0.0).release - 1.0).abs() < 1e-9);
        assert!((Envelope::for_reverb(0.3).release - 1.6).abs() < 1e-9);
        assert!((Envelope::for_reverb(1.0).release - 2.5).abs() < 1e-9);
        assert!(Envelope::for_reverb(-1.0).release >= 0.3);
    }

    #[test]
    fn test_trigger_schedules_envelope() {
        let mut graph = AudioGraph::new(1000);
        let voice = Voice::create(&mut graph, Waveform::Sine, &[Output::Destination], 0.0).unwrap();
        let envelope = Envelope::for_reverb(0.0);

        voice.trigger(&mut graph, 261.63, 1.0, 1.0, &envelope).unwrap();

        assert!(approx(graph.gain_at(voice.gain(), 0.99).unwrap(), 0.0));
        assert!(approx(graph.gain_at(voice.gain(), 1.01).unwrap(), 0.325));
        assert!(approx(graph.gain_at(voice.gain(), 1.02).unwrap(), 0.65));
        // Release ends at 1.0 + max(0.8, 0.2) + 1.0
        assert!(approx(graph.gain_at(voice.gain(), 2.8).unwrap(), 0.0));
        assert!(approx(graph.frequency_at(voice.oscillator(), 1.0).unwrap(), 261.63));
    }

    #[test]
    fn test_retrigger_holds_tail() {
        let mut graph = AudioGraph::new(1000);
        let voice = Voice::create(&mut graph, Waveform::Sine, &[Output::Destination], 0.0).unwrap();
        let envelope = Envelope::for_reverb(0.0);

        voice.trigger(&mut graph, 440.0, 0.0, 1.0, &envelope).unwrap();
        let tail = graph.gain_at(voice.gain(), 1.5).unwrap();
        voice.trigger(&mut graph, 220.0, 1.5, 1.0, &envelope).unwrap();

        assert!(tail > 0.0);
        assert!(approx(graph.gain_at(voice.gain(), 1.5).unwrap(), tail));
        assert!(approx(graph.gain_at(voice.gain(), 1.52).unwrap(), 0.65));
    }

    #[test]
    fn test_dispose_twice_is_safe() {
        let mut graph = AudioGraph::new(1000);
        let voice = Voice::create(&mut graph, Waveform::Triangle, &[Output::Destination], 0.0).unwrap();
        assert_eq!(graph.node_count(), 2);

        voice.dispose(&mut graph);
        voice.dispose(&mut graph);
        assert_eq!(graph.node_count(), 0);
        assert!(voice.trigger(&mut graph, 440.0, 0.0, 1.0, &Envelope::for_reverb(0.0)).is_err());
    }
}
