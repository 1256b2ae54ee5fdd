//! Mood parameters handed to the scheduler.
//!
//! The parameters usually come from a language model, so parsing is
//! deliberately forgiving: numbers may arrive as strings, keys in any case
//! or with a "major"/"minor" suffix, and anything unusable falls back to a
//! default instead of failing.

use super::{pitch_class_from_name, Mode};
use crate::error::EngineError;
use serde::Serialize;
use serde_json::Value;

/// Tempo range in beats per minute.
pub const TEMPO_RANGE: (f64, f64) = (60.0, 180.0);

const DEFAULT_TEMPO: f64 = 90.0;
const DEFAULT_DENSITY: f64 = 0.5;
const DEFAULT_REVERB: f64 = 0.3;

/// Musical parameters derived from a visitor's mood.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoodParams {
    /// Beats per minute, 60-180.
    pub tempo: f64,
    /// Scale mode.
    pub scale: Mode,
    /// Root pitch class, 0 (C) to 11 (B).
    pub key: u8,
    /// Note density, 0 (sparse) to 1 (busy).
    pub density: f64,
    /// Amount of simulated room, 0 (dry) to 1.
    pub reverb_amount: f64,
}

impl Default for MoodParams {
    fn default() -> Self {
        Self {
            tempo: DEFAULT_TEMPO,
            scale: Mode::Minor,
            key: 0,
            density: DEFAULT_DENSITY,
            reverb_amount: DEFAULT_REVERB,
        }
    }
}

impl MoodParams {
    /// Parses parameters from JSON.
    ///
    /// Accepts either the bare music object or a full model response with the
    /// music object under `"music"`. Field names: `tempo`, `scale`, `key`,
    /// `density`, and `reverb` or `reverbAmount`.
    ///
    /// # Errors
    ///
    /// Returns error only if the text is not a JSON object. Missing or
    /// malformed fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let value: Value = serde_json::from_str(json).map_err(EngineError::MoodParse)?;
        let root = value
            .as_object()
            .ok_or_else(|| EngineError::MoodShape(value.to_string()))?;
        let music = root
            .get("music")
            .and_then(Value::as_object)
            .unwrap_or(root);

        let defaults = Self::default();
        let params = Self {
            tempo: number_or(music.get("tempo"), defaults.tempo).round(),
            scale: music
                .get("scale")
                .and_then(Value::as_str)
                .map(Mode::from_label)
                .unwrap_or(defaults.scale),
            key: music
                .get("key")
                .and_then(Value::as_str)
                .map(normalize_key)
                .unwrap_or(defaults.key),
            density: number_or(music.get("density"), defaults.density),
            reverb_amount: number_or(
                music.get("reverbAmount").or_else(|| music.get("reverb")),
                defaults.reverb_amount,
            ),
        };
        Ok(params.sanitized())
    }

    /// Clamps every field into its documented range; non-finite values take
    /// their defaults.
    pub fn sanitized(&self) -> Self {
        let defaults = Self::default();
        Self {
            tempo: finite_or(self.tempo, defaults.tempo).clamp(TEMPO_RANGE.0, TEMPO_RANGE.1),
            scale: self.scale,
            key: self.key % 12,
            density: finite_or(self.density, defaults.density).clamp(0.0, 1.0),
            reverb_amount: finite_or(self.reverb_amount, defaults.reverb_amount).clamp(0.0, 1.0),
        }
    }
}

/// Normalizes a key label like "a#", "Bb" or "C minor" to a pitch class.
/// Unknown keys map to C.
pub fn normalize_key(label: &str) -> u8 {
    let upper = label.trim().to_ascii_uppercase();
    let stripped = upper
        .replace("MAJOR", "")
        .replace("MINOR", "")
        .replace("MAJ", "")
        .replace("MIN", "");
    let stripped = stripped.trim();
    let stripped = stripped.strip_suffix('M').unwrap_or(stripped).trim();

    // Upper-casing turned a flat "b" into "B"; undo that for the accidental
    let name = match stripped.len() {
        2 if stripped.ends_with('B') => format!("{}b", &stripped[..1]),
        _ => stripped.to_string(),
    };
    pitch_class_from_name(&name).unwrap_or(0)
}

fn finite_or(value: f64, default: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        default
    }
}

fn number_or(value: Option<&Value>, default: f64) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|n| n.is_finite()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_model_response() {
        let json = r#"{
            "art_prompt": "fluid shapes",
            "mood": { "valence": 0.2, "arousal": 0.4 },
            "music": { "tempo": 90, "scale": "minor", "key": "C", "density": 0.5, "reverb": 0.3 }
        }"#;
        let params = MoodParams::from_json(json).unwrap();
        assert_eq!(params, MoodParams::default());
    }

    #[test]
    fn test_parse_bare_music_object() {
        let json = r#"{ "tempo": "120.4", "scale": "Major", "key": "f#", "density": 0.9, "reverbAmount": 0.7 }"#;
        let params = MoodParams::from_json(json).unwrap();
        assert_eq!(params.tempo, 120.0);
        assert_eq!(params.scale, Mode::Major);
        assert_eq!(params.key, 6);
        assert_eq!(params.density, 0.9);
        assert_eq!(params.reverb_amount, 0.7);
    }

    #[test]
    fn test_out_of_range_values_clamp() {
        let json = r#"{ "tempo": 400, "density": -2, "reverb": 9 }"#;
        let params = MoodParams::from_json(json).unwrap();
        assert_eq!(params.tempo, 180.0);
        assert_eq!(params.density, 0.0);
        assert_eq!(params.reverb_amount, 1.0);
    }

    #[test]
    fn test_garbage_falls_back_to_defaults() {
        let json = r#"{ "tempo": "fast", "scale": 3, "key": "H", "density": null }"#;
        let params = MoodParams::from_json(json).unwrap();
        assert_eq!(params, MoodParams::default());
    }

    #[test]
    fn test_non_object_is_rejected() {
        assert!(MoodParams::from_json("[1, 2]").is_err());
        assert!(MoodParams::from_json("not json").is_err());
    }

    #[test]
    fn test_sanitized_replaces_non_finite() {
        let params = MoodParams {
            tempo: f64::NAN,
            scale: Mode::Major,
            key: 14,
            density: f64::INFINITY,
            reverb_amount: 0.5,
        }
        .sanitized();
        assert_eq!(params.tempo, 90.0);
        assert_eq!(params.key, 2);
        assert_eq!(params.density, 0.5);
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("C"), 0);
        assert_eq!(normalize_key("a#"), 10);
        assert_eq!(normalize_key("Bb"), 10);
        assert_eq!(normalize_key("B"), 11);
        assert_eq!(normalize_key("D minor"), 2);
        assert_eq!(normalize_key("Em"), 4);
        assert_eq!(normalize_key("G Major"), 7);
        assert_eq!(normalize_key("??"), 0);
    }
}
