//! Diatonic scales.

use super::{Note, NOTE_NAMES};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Notes per diatonic scale.
pub const SCALE_LENGTH: usize = 7;

/// Octave every scale is built in.
pub const REFERENCE_OCTAVE: i8 = 4;

const MAJOR_INTERVALS: [u8; SCALE_LENGTH] = [0, 2, 4, 5, 7, 9, 11];
const MINOR_INTERVALS: [u8; SCALE_LENGTH] = [0, 2, 3, 5, 7, 8, 10];

/// Scale mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Major,
    #[default]
    Minor,
}

impl Mode {
    /// Interprets a free-form label: anything mentioning "maj" is major,
    /// everything else (including garbage) is minor.
    pub fn from_label(label: &str) -> Self {
        if label.to_ascii_lowercase().contains("maj") {
            Mode::Major
        } else {
            Mode::Minor
        }
    }

    /// Semitone offsets of the seven degrees from the root.
    pub fn intervals(self) -> [u8; SCALE_LENGTH] {
        match self {
            Mode::Major => MAJOR_INTERVALS,
            Mode::Minor => MINOR_INTERVALS,
        }
    }
}

impl<'de> Deserialize<'de> for Mode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(Mode::from_label(&label))
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Major => write!(f, "major"),
            Mode::Minor => write!(f, "minor"),
        }
    }
}

/// Seven notes of a diatonic scale at the reference octave.
///
/// Degrees past B wrap back within the same octave, so every note shares
/// [`REFERENCE_OCTAVE`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaleDefinition {
    root: u8,
    mode: Mode,
    notes: [Note; SCALE_LENGTH],
}

impl ScaleDefinition {
    /// Builds the scale rooted at pitch class `root` (wrapped into 0-11).
    pub fn new(root: u8, mode: Mode) -> Self {
        let root = root % 12;
        let notes = mode
            .intervals()
            .map(|interval| Note::new((root + interval) % 12, REFERENCE_OCTAVE));
        Self { root, mode, notes }
    }

    /// Root pitch class.
    pub fn root(&self) -> u8 {
        self.root
    }

    /// Scale mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// All seven notes, root first.
    pub fn notes(&self) -> &[Note; SCALE_LENGTH] {
        &self.notes
    }

    /// The note at `degree`, wrapping around the scale.
    pub fn degree(&self, degree: usize) -> Note {
        self.notes[degree % SCALE_LENGTH]
    }
}

impl fmt::Display for ScaleDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", NOTE_NAMES[self.root as usize], self.mode)
    }
}
