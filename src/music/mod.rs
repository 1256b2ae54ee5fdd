//! Musical building blocks for the generative scheduler.
//!
//! This module provides pitch classes and note names, diatonic scales, mood
//! parameters, the pure lookahead sequencer and the scheduler that turns all
//! of it into notes on the audio graph.

mod mood;
mod scale;
mod scheduler;
mod sequencer;

pub use mood::MoodParams;
pub use scale::{Mode, ScaleDefinition, REFERENCE_OCTAVE, SCALE_LENGTH};
pub use scheduler::{
    reverb_feedback, GenerativeScheduler, MusicSession, SchedulerSettings, MAX_REVERB_FEEDBACK,
    VOICE_COUNT,
};
pub use sequencer::{beat_duration, step_size, ChordEvent, Sequencer};

use std::fmt;

/// Standard note names, indexed by pitch class (C = 0).
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Reference pitch: A4 = 440 Hz.
pub const A4_FREQUENCY: f64 = 440.0;

/// Pitch class of A.
const A_PITCH_CLASS: i32 = 9;

/// Looks up the pitch class (0-11) of a note name like "C", "F#" or "Bb".
///
/// Matching is case-insensitive; flats are mapped to their enharmonic sharps.
///
/// # Examples
///
/// ```
/// use ambience::music::pitch_class_from_name;
///
/// assert_eq!(pitch_class_from_name("c"), Some(0));
/// assert_eq!(pitch_class_from_name("Bb"), Some(10));
/// assert_eq!(pitch_class_from_name("H"), None);
/// ```
pub fn pitch_class_from_name(name: &str) -> Option<u8> {
    let name = name.trim();
    let mut chars = name.chars();
    let letter = chars.next()?.to_ascii_uppercase();
    let natural = NOTE_NAMES.iter().position(|n| n.len() == 1 && n.starts_with(letter))? as i32;

    let accidental = match chars.as_str() {
        "" => 0,
        "#" => 1,
        "b" | "B" => -1,
        _ => return None,
    };
    Some((natural + accidental).rem_euclid(12) as u8)
}

/// A pitch class in a specific octave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Note {
    /// Pitch class, 0 (C) to 11 (B).
    pub pitch_class: u8,
    /// Octave number; C4 is middle C.
    pub octave: i8,
}

impl Note {
    /// Creates a note, wrapping the pitch class into 0-11.
    pub fn new(pitch_class: u8, octave: i8) -> Self {
        Self {
            pitch_class: pitch_class % 12,
            octave,
        }
    }

    /// Semitones above (or below, if negative) A4.
    pub fn semitones_from_a4(&self) -> i32 {
        (i32::from(self.octave) - 4) * 12 + i32::from(self.pitch_class) - A_PITCH_CLASS
    }

    /// Equal-tempered frequency in Hz.
    pub fn frequency(&self) -> f64 {
        A4_FREQUENCY * 2f64.powf(f64::from(self.semitones_from_a4()) / 12.0)
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", NOTE_NAMES[self.pitch_class as usize], self.octave)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pitch_class_names() {
        assert_eq!(pitch_class_from_name("C"), Some(0));
        assert_eq!(pitch_class_from_name("d#"), Some(3));
        assert_eq!(pitch_class_from_name("Db"), Some(1));
        assert_eq!(pitch_class_from_name("Cb"), Some(11));
        assert_eq!(pitch_class_from_name(""), None);
        assert_eq!(pitch_class_from_name("C##"), None);
    }

    #[test]
    fn test_note_display() {
        assert_eq!(Note::new(3, 4).to_string(), "D#4");
        assert_eq!(Note::new(15, 5).to_string(), "D#5");
        assert_eq!(Note::new(9, -1).to_string(), "A-1");
    }

    #[test]
    fn test_equal_tempered_frequencies() {
        assert!((Note::new(9, 4).frequency() - 440.0).abs() < 1e-9);
        assert!((Note::new(9, 5).frequency() - 880.0).abs() < 1e-9);
        assert!((Note::new(0, 4).frequency() - 261.6256).abs() < 1e-3);
        assert!((Note::new(7, 4).frequency() - 391.9954).abs() < 1e-3);
    }
}
