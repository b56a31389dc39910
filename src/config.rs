//! Session configuration.
//!
//! A session is configured with a tempo, a tonal base, a range mode and the
//! natural pitch of each voice. Configuration can be loaded from JSON and
//! every field has a default, so a partial file is fine.

use crate::error::{NinkError, Result};
use crate::notation::{NoteName, RangeMode, SpacePolicy, Voice, VoiceRange};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default tempo in beats per minute.
pub const DEFAULT_TEMPO: f64 = 120.0;

/// Default tonal base.
pub const DEFAULT_BASE_NOTE: &str = "C4";

/// Largest transposition accepted, in semitones either way.
pub const MAX_TRANSPOSE: i32 = 8;

/// General MIDI program used for the primary voice (Tubular Bells).
pub const DEFAULT_PRIMARY_PROGRAM: u8 = 14;

/// General MIDI program used for the secondary voice (Whistle).
pub const DEFAULT_SECONDARY_PROGRAM: u8 = 78;

/// Options recognized for a playback session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Tempo in beats per minute. Must be finite and positive.
    pub tempo: f64,

    /// Tonal base that `D` (Do) maps to, e.g. `"C4"`.
    pub base_note: String,

    /// How far octave markers may move a voice.
    pub range_mode: RangeMode,

    /// Whether spaces in the notation are separators or rests.
    pub spaces: SpacePolicy,

    /// Natural pitch of the primary voice. Falls back to `base_note`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_natural: Option<String>,

    /// Natural pitch of the secondary voice. Falls back to `base_note`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_natural: Option<String>,

    /// Extra semitone shift applied to every note, clamped to ±8.
    /// The voice ranges do not move with it.
    pub transpose: i32,

    /// SoundFont program for the primary voice.
    pub primary_program: u8,

    /// SoundFont program for the secondary voice.
    pub secondary_program: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tempo: DEFAULT_TEMPO,
            base_note: DEFAULT_BASE_NOTE.to_string(),
            range_mode: RangeMode::Normal,
            spaces: SpacePolicy::Separator,
            primary_natural: None,
            secondary_natural: None,
            transpose: 0,
            primary_program: DEFAULT_PRIMARY_PROGRAM,
            secondary_program: DEFAULT_SECONDARY_PROGRAM,
        }
    }
}

impl SessionConfig {
    /// Loads a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns error if the JSON is invalid or has fields of the wrong type
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Loads a configuration from a JSON file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Length of one unmodified token.
    ///
    /// # Errors
    ///
    /// Returns [`NinkError::InvalidTempo`] if the tempo is not a finite positive
    /// number, or if one beat does not fit a `Duration` or rounds to zero
    pub fn beat_duration(&self) -> Result<Duration> {
        if !self.tempo.is_finite() || self.tempo <= 0.0 {
            return Err(NinkError::InvalidTempo(self.tempo));
        }
        match Duration::try_from_secs_f64(60.0 / self.tempo) {
            Ok(beat) if !beat.is_zero() => Ok(beat),
            _ => Err(NinkError::InvalidTempo(self.tempo)),
        }
    }

    /// Transposition after clamping to ±[`MAX_TRANSPOSE`].
    pub fn clamped_transpose(&self) -> i32 {
        let clamped = self.transpose.clamp(-MAX_TRANSPOSE, MAX_TRANSPOSE);
        if clamped != self.transpose {
            tracing::warn!(
                requested = self.transpose,
                used = clamped,
                "transpose clamped"
            );
        }
        clamped
    }

    /// Parses every note name and builds both voice ranges.
    ///
    /// # Errors
    ///
    /// Returns [`NinkError::MalformedBaseNote`] for the first note name that
    /// does not parse
    pub fn voicing(&self) -> Result<Voicing> {
        let base: NoteName = self.base_note.parse()?;
        let natural = |name: &Option<String>| -> Result<NoteName> {
            match name {
                Some(name) => name.parse(),
                None => Ok(base),
            }
        };
        let primary = natural(&self.primary_natural)?;
        let secondary = natural(&self.secondary_natural)?;

        Ok(Voicing {
            primary: VoiceSetup::new(primary, self.range_mode),
            secondary: VoiceSetup::new(secondary, self.range_mode),
            transpose: self.clamped_transpose(),
        })
    }

    /// SoundFont program for a voice.
    pub fn program(&self, voice: Voice) -> u8 {
        match voice {
            Voice::Primary => self.primary_program,
            Voice::Secondary => self.secondary_program,
        }
    }
}

/// Tonal base and allowed window of one voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceSetup {
    /// Pitch of `D` at octave offset 0, also the centre of the range.
    pub natural: NoteName,
    pub range: VoiceRange,
}

impl VoiceSetup {
    pub fn new(natural: NoteName, mode: RangeMode) -> Self {
        Self {
            natural,
            range: VoiceRange::new(natural.midi(), mode),
        }
    }
}

/// Parsed, validated pitch settings for both voices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Voicing {
    pub primary: VoiceSetup,
    pub secondary: VoiceSetup,
    pub transpose: i32,
}

impl Voicing {
    pub fn voice(&self, voice: Voice) -> &VoiceSetup {
        match voice {
            Voice::Primary => &self.primary,
            Voice::Secondary => &self.secondary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.tempo, 120.0);
        assert_eq!(config.base_note, "C4");
        assert_eq!(config.range_mode, RangeMode::Normal);
        assert_eq!(config.beat_duration().unwrap(), Duration::from_millis(500));
    }

    #[test]
    fn test_partial_json() {
        let config =
            SessionConfig::from_json(r#"{ "tempo": 60, "range_mode": "higher", "spaces": "rest" }"#)
                .unwrap();
        assert_eq!(config.tempo, 60.0);
        assert_eq!(config.range_mode, RangeMode::Higher);
        assert_eq!(config.spaces, SpacePolicy::Rest);
        assert_eq!(config.base_note, "C4");
        assert_eq!(config.beat_duration().unwrap(), Duration::from_secs(1));
    }

    #[test]
    fn test_unknown_range_mode_is_rejected() {
        assert!(matches!(
            SessionConfig::from_json(r#"{ "range_mode": "wide" }"#),
            Err(NinkError::Config(_))
        ));
    }

    #[test]
    fn test_invalid_tempo() {
        for tempo in [0.0, -10.0, f64::NAN, f64::INFINITY, 1e-300, 1e300] {
            let config = SessionConfig {
                tempo,
                ..Default::default()
            };
            assert!(matches!(config.beat_duration(), Err(NinkError::InvalidTempo(_))));
        }
    }

    #[test]
    fn test_voicing_defaults_to_base_note() {
        let config = SessionConfig {
            base_note: "G3".to_string(),
            ..Default::default()
        };
        let voicing = config.voicing().unwrap();
        assert_eq!(voicing.primary.natural.midi(), 55);
        assert_eq!(voicing.secondary.natural.midi(), 55);
        assert_eq!(voicing.primary.range, VoiceRange::new(55, RangeMode::Normal));
    }

    #[test]
    fn test_voicing_with_naturals() {
        let config = SessionConfig {
            primary_natural: Some("C5".to_string()),
            secondary_natural: Some("A3".to_string()),
            range_mode: RangeMode::Full,
            ..Default::default()
        };
        let voicing = config.voicing().unwrap();
        assert_eq!(voicing.voice(Voice::Primary).natural.midi(), 72);
        assert_eq!(voicing.voice(Voice::Secondary).range, VoiceRange::new(57, RangeMode::Full));
    }

    #[test]
    fn test_malformed_note_names() {
        let config = SessionConfig {
            base_note: "middle C".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.voicing(), Err(NinkError::MalformedBaseNote(_))));

        let config = SessionConfig {
            secondary_natural: Some("X9".to_string()),
            ..Default::default()
        };
        match config.voicing() {
            Err(NinkError::MalformedBaseNote(name)) => assert_eq!(name, "X9"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_transpose_is_clamped() {
        let config = SessionConfig {
            transpose: 12,
            ..Default::default()
        };
        assert_eq!(config.voicing().unwrap().transpose, 8);

        let config = SessionConfig {
            transpose: -20,
            ..Default::default()
        };
        assert_eq!(config.clamped_transpose(), -8);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "base_note": "D4", "secondary_natural": "A4", "transpose": -2 }}"#)
            .unwrap();

        let config = SessionConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.base_note, "D4");
        assert_eq!(config.secondary_natural.as_deref(), Some("A4"));
        assert_eq!(config.transpose, -2);
        assert_eq!(config.program(Voice::Secondary), DEFAULT_SECONDARY_PROGRAM);
    }

    #[test]
    fn test_json_round_trip_keeps_defaults() {
        let config = SessionConfig::default();
        let parsed = SessionConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }
}
