//! Lookahead sequencing.
//!
//! The sequencer decides *what* plays and *when* on the audio clock; it never
//! touches audio itself. A control loop calls [`Sequencer::drain`] with the
//! current audio-clock time and a lookahead window, and receives every chord
//! whose start falls inside the window, each stamped with its exact start
//! time. How late or early the control loop runs only changes how far in
//! advance a chord is handed over, never when it sounds.

use super::scale::{ScaleDefinition, SCALE_LENGTH};
use super::Note;

/// Chord shape: root, third and fifth above the cursor.
const CHORD_DEGREES: [usize; 3] = [0, 2, 4];

/// A chord's nominal length in beats (a half note).
const CHORD_BEATS: f64 = 2.0;

/// Stride through the scale for a density in 0..1: `max(1, round(8 - 6·density))`.
///
/// Denser moods take smaller steps, which makes the melody busier.
pub fn step_size(density: f64) -> usize {
    (8.0 - density * 6.0).round().max(1.0) as usize
}

/// Seconds per beat at `tempo` BPM.
pub fn beat_duration(tempo: f64) -> f64 {
    60.0 / tempo
}

/// One chord to play.
#[derive(Debug, Clone, PartialEq)]
pub struct ChordEvent {
    /// Audio-clock start time in seconds.
    pub time: f64,
    /// Scale degrees of the three chord tones.
    pub degrees: [usize; 3],
    /// The chord tones, one per voice.
    pub notes: [Note; 3],
    /// Nominal length in seconds.
    pub sustain: f64,
}

/// Scheduling state of one generative session.
#[derive(Debug, Clone)]
pub struct Sequencer {
    scale: ScaleDefinition,
    beat: f64,
    step: usize,
    next_event_time: f64,
    note_index: usize,
}

impl Sequencer {
    /// Creates a sequencer whose first chord starts at `start_time`.
    ///
    /// `tempo` must be positive; callers pass sanitized parameters.
    pub fn new(scale: ScaleDefinition, tempo: f64, density: f64, start_time: f64) -> Self {
        Self {
            scale,
            beat: beat_duration(tempo),
            step: step_size(density),
            next_event_time: start_time,
            note_index: 0,
        }
    }

    /// The scale being played.
    pub fn scale(&self) -> &ScaleDefinition {
        &self.scale
    }

    /// Seconds per beat.
    pub fn beat(&self) -> f64 {
        self.beat
    }

    /// Degrees advanced per chord.
    pub fn step(&self) -> usize {
        self.step
    }

    /// Audio-clock time of the next chord.
    pub fn next_event_time(&self) -> f64 {
        self.next_event_time
    }

    /// Scale cursor of the next chord (always below the scale length).
    pub fn note_index(&self) -> usize {
        self.note_index
    }

    /// Returns every chord starting before `now + lookahead`, in order.
    ///
    /// Chords that would start before `now` (the control loop stalled) are
    /// skipped rather than played late in a burst; the cursor still moves
    /// past them so the melody continues where it would have been.
    pub fn drain(&mut self, now: f64, lookahead: f64) -> Vec<ChordEvent> {
        let skipped = self.skip_stale(now);
        if skipped > 0 {
            tracing::debug!(skipped, "Control loop fell behind; skipping stale chords");
        }

        let horizon = now + lookahead;
        let mut events = Vec::new();
        while self.next_event_time < horizon {
            events.push(self.current_chord());
            self.advance();
        }
        events
    }

    fn skip_stale(&mut self, now: f64) -> usize {
        let mut skipped = 0;
        while self.next_event_time < now {
            self.advance();
            skipped += 1;
        }
        skipped
    }

    fn current_chord(&self) -> ChordEvent {
        let degrees = CHORD_DEGREES.map(|offset| (self.note_index + offset) % SCALE_LENGTH);
        ChordEvent {
            time: self.next_event_time,
            degrees,
            notes: degrees.map(|degree| self.scale.degree(degree)),
            sustain: self.beat * CHORD_BEATS,
        }
    }

    fn advance(&mut self) {
        self.note_index = (self.note_index + self.step) % SCALE_LENGTH;
        self.next_event_time += self.beat;
    }
}
