//! Voice range validation.
//!
//! Each voice may only sound within a window around its natural pitch. The
//! window is chosen by a named [`RangeMode`]; the instrument's physical bounds
//! (A0 to C8) apply on top of it.

use super::tokenizer::ControlMarker;
use crate::error::NinkError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lowest playable semitone index (A0, 27.5 Hz).
pub const ABSOLUTE_MIN: i32 = 21;

/// Highest playable semitone index (C8, ~4186 Hz).
pub const ABSOLUTE_MAX: i32 = 108;

/// Named policy bounding how far octave markers may move a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeMode {
    /// One octave down, two octaves (minus one semitone) up.
    #[default]
    Normal,
    /// Adds a second octave below.
    Lower,
    /// Adds a third octave above.
    Higher,
    /// Both extensions.
    Full,
}

impl RangeMode {
    /// Semitone offsets `(low, high)` relative to the natural pitch.
    ///
    /// The upper bound is the allowed octave extension plus 11, the top note
    /// of the octave reached.
    pub fn offsets(&self) -> (i32, i32) {
        match self {
            RangeMode::Normal => (-12, 12 + 11),
            RangeMode::Lower => (-24, 12 + 11),
            RangeMode::Higher => (-12, 24 + 11),
            RangeMode::Full => (-24, 24 + 11),
        }
    }

    /// Whether a control marker is allowed under this mode.
    ///
    /// Only the doubled octave markers are restricted, each to the modes
    /// whose range reaches two octaves in its direction.
    pub fn permits(&self, marker: ControlMarker) -> bool {
        if !marker.is_doubled() {
            return true;
        }
        let (low, high) = self.offsets();
        match marker {
            ControlMarker::UpTwoOctaves => high >= 24,
            _ => low <= -24,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RangeMode::Normal => "normal",
            RangeMode::Lower => "lower",
            RangeMode::Higher => "higher",
            RangeMode::Full => "full",
        }
    }
}

impl FromStr for RangeMode {
    type Err = NinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "normal" => Ok(RangeMode::Normal),
            "lower" => Ok(RangeMode::Lower),
            "higher" => Ok(RangeMode::Higher),
            "full" => Ok(RangeMode::Full),
            other => Err(NinkError::InvalidRangeMode(other.to_string())),
        }
    }
}

impl fmt::Display for RangeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive semitone bounds for one voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceRange {
    pub min: i32,
    pub max: i32,
}

impl VoiceRange {
    /// Builds the window for a voice whose unmarked pitch is `natural`.
    pub fn new(natural: i32, mode: RangeMode) -> Self {
        let (low, high) = mode.offsets();
        Self {
            min: natural + low,
            max: natural + high,
        }
    }

    pub fn contains(&self, midi: i32) -> bool {
        (self.min..=self.max).contains(&midi)
    }
}

/// Outcome of range validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    Playable,
    OutOfRange,
}

/// Classifies a resolved pitch against a voice window and the instrument bounds.
pub fn validate(midi: i32, range: &VoiceRange) -> Validation {
    if !(ABSOLUTE_MIN..=ABSOLUTE_MAX).contains(&midi) || !range.contains(midi) {
        Validation::OutOfRange
    } else {
        Validation::Playable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_windows() {
        assert_eq!(VoiceRange::new(60, RangeMode::Normal), VoiceRange { min: 48, max: 83 });
        assert_eq!(VoiceRange::new(60, RangeMode::Lower), VoiceRange { min: 36, max: 83 });
        assert_eq!(VoiceRange::new(60, RangeMode::Higher), VoiceRange { min: 48, max: 95 });
        assert_eq!(VoiceRange::new(60, RangeMode::Full), VoiceRange { min: 36, max: 95 });
    }

    #[test]
    fn test_natural_is_inside_every_window() {
        for mode in [RangeMode::Normal, RangeMode::Lower, RangeMode::Higher, RangeMode::Full] {
            let range = VoiceRange::new(67, mode);
            assert!(range.min <= 67 && 67 <= range.max);
        }
    }

    #[test]
    fn test_boundaries() {
        let range = VoiceRange::new(60, RangeMode::Normal);
        assert_eq!(validate(range.max, &range), Validation::Playable);
        assert_eq!(validate(range.max + 1, &range), Validation::OutOfRange);
        assert_eq!(validate(range.min, &range), Validation::Playable);
        assert_eq!(validate(range.min - 1, &range), Validation::OutOfRange);
    }

    #[test]
    fn test_absolute_bounds() {
        // Window reaches past C8, instrument does not
        let high = VoiceRange::new(96, RangeMode::Full);
        assert_eq!(validate(108, &high), Validation::Playable);
        assert_eq!(validate(109, &high), Validation::OutOfRange);

        let low = VoiceRange::new(30, RangeMode::Full);
        assert_eq!(validate(21, &low), Validation::Playable);
        assert_eq!(validate(20, &low), Validation::OutOfRange);
    }

    #[test]
    fn test_permits_doubled_markers() {
        use ControlMarker::*;
        assert!(!RangeMode::Normal.permits(UpTwoOctaves));
        assert!(!RangeMode::Normal.permits(DownTwoOctaves));
        assert!(RangeMode::Higher.permits(UpTwoOctaves));
        assert!(!RangeMode::Higher.permits(DownTwoOctaves));
        assert!(RangeMode::Lower.permits(DownTwoOctaves));
        assert!(!RangeMode::Lower.permits(UpTwoOctaves));
        assert!(RangeMode::Full.permits(UpTwoOctaves));
        assert!(RangeMode::Full.permits(DownTwoOctaves));
        assert!(RangeMode::Normal.permits(UpOctave));
    }

    #[test]
    fn test_parse_range_mode() {
        assert_eq!("higher".parse::<RangeMode>().unwrap(), RangeMode::Higher);
        assert!(matches!(
            "wide".parse::<RangeMode>(),
            Err(NinkError::InvalidRangeMode(_))
        ));
        assert_eq!(RangeMode::default(), RangeMode::Normal);
    }
}
