//! Pitch resolution.
//!
//! Maps a solfège symbol and an octave offset onto an absolute pitch relative
//! to a tonal base note. Pitches are tracked both as a MIDI-style semitone
//! index (A4 = 69) and as a frequency in Hz (A4 = 440).

use crate::error::{NinkError, Result};
use std::fmt;
use std::str::FromStr;

/// Reference pitch: A at octave 4.
pub const REFERENCE_FREQUENCY: f64 = 440.0;

/// Semitone index of the reference pitch.
pub const REFERENCE_MIDI: i32 = 69;

/// Note names within an octave, used for display.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// One of the twelve solfège scale degrees.
///
/// Upper/lowercase pairs are adjacent semitones (`D` = Do, `d` = Do sharp),
/// not octave variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Solfege {
    Do,
    Di,
    Re,
    Ri,
    Mi,
    Fa,
    Fi,
    Sol,
    Si,
    La,
    Li,
    Ti,
}

impl Solfege {
    /// Looks up the symbol for a notation character. Case-sensitive.
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'D' => Some(Solfege::Do),
            'd' => Some(Solfege::Di),
            'R' => Some(Solfege::Re),
            'r' => Some(Solfege::Ri),
            'M' => Some(Solfege::Mi),
            'F' => Some(Solfege::Fa),
            'f' => Some(Solfege::Fi),
            'S' => Some(Solfege::Sol),
            's' => Some(Solfege::Si),
            'L' => Some(Solfege::La),
            'l' => Some(Solfege::Li),
            'T' => Some(Solfege::Ti),
            _ => None,
        }
    }

    /// The notation character for this symbol.
    pub fn symbol(&self) -> char {
        match self {
            Solfege::Do => 'D',
            Solfege::Di => 'd',
            Solfege::Re => 'R',
            Solfege::Ri => 'r',
            Solfege::Mi => 'M',
            Solfege::Fa => 'F',
            Solfege::Fi => 'f',
            Solfege::Sol => 'S',
            Solfege::Si => 's',
            Solfege::La => 'L',
            Solfege::Li => 'l',
            Solfege::Ti => 'T',
        }
    }

    /// Semitones above the tonal base (0-11).
    pub fn semitone(&self) -> i32 {
        match self {
            Solfege::Do => 0,
            Solfege::Di => 1,
            Solfege::Re => 2,
            Solfege::Ri => 3,
            Solfege::Mi => 4,
            Solfege::Fa => 5,
            Solfege::Fi => 6,
            Solfege::Sol => 7,
            Solfege::Si => 8,
            Solfege::La => 9,
            Solfege::Li => 10,
            Solfege::Ti => 11,
        }
    }
}

impl fmt::Display for Solfege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// A note name such as `C4`, `F#3` or `Bb5`.
///
/// Grammar: `Letter[A-G] Accidental?[#|b] Digit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NoteName {
    letter: char,
    /// -1 for flat, +1 for sharp.
    accidental: i8,
    octave: u8,
}

impl NoteName {
    /// Signed semitone distance from A4.
    pub fn semitones_from_reference(&self) -> i32 {
        let natural = match self.letter {
            'C' => -9,
            'D' => -7,
            'E' => -5,
            'F' => -4,
            'G' => -2,
            'A' => 0,
            _ => 2, // B
        };
        natural + self.accidental as i32 + (self.octave as i32 - 4) * 12
    }

    /// MIDI-style semitone index (C4 = 60, A4 = 69).
    pub fn midi(&self) -> i32 {
        REFERENCE_MIDI + self.semitones_from_reference()
    }

    /// Frequency in Hz, equal-tempered against A4 = 440 Hz.
    pub fn frequency(&self) -> f64 {
        REFERENCE_FREQUENCY * 2f64.powf(self.semitones_from_reference() as f64 / 12.0)
    }
}

impl FromStr for NoteName {
    type Err = NinkError;

    fn from_str(s: &str) -> Result<Self> {
        let malformed = || NinkError::MalformedBaseNote(s.to_string());
        let mut chars = s.trim().chars().peekable();

        let letter = chars.next().filter(|c| ('A'..='G').contains(c)).ok_or_else(malformed)?;

        let accidental = match chars.peek() {
            Some('#') => {
                chars.next();
                1
            }
            Some('b') => {
                chars.next();
                -1
            }
            _ => 0,
        };

        let octave = chars
            .next()
            .and_then(|c| c.to_digit(10))
            .ok_or_else(malformed)? as u8;

        if chars.next().is_some() {
            return Err(malformed());
        }

        Ok(Self {
            letter,
            accidental,
            octave,
        })
    }
}

impl fmt::Display for NoteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let accidental = match self.accidental {
            1 => "#",
            -1 => "b",
            _ => "",
        };
        write!(f, "{}{}{}", self.letter, accidental, self.octave)
    }
}

/// A fully resolved pitch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedPitch {
    /// Semitone index (A4 = 69).
    pub midi: i32,
    /// Frequency in Hz.
    pub frequency: f64,
}

impl ResolvedPitch {
    /// Shifts the pitch by a number of semitones.
    pub fn transposed(&self, semitones: i32) -> Self {
        Self {
            midi: self.midi + semitones,
            frequency: self.frequency * 2f64.powf(semitones as f64 / 12.0),
        }
    }
}

/// Resolves a solfège symbol against a tonal base.
///
/// # Arguments
///
/// * `base` - The note that `D` (Do) maps to at octave offset 0
/// * `symbol` - The scale degree
/// * `octave_offset` - Semitone shift from octave markers (-24, -12, 0, 12, 24)
///
/// # Returns
///
/// The absolute pitch, `base × 2^((symbol + octave_offset) / 12)`
pub fn resolve(base: &NoteName, symbol: Solfege, octave_offset: i32) -> ResolvedPitch {
    let shift = symbol.semitone() + octave_offset;
    ResolvedPitch {
        midi: base.midi() + shift,
        frequency: base.frequency() * 2f64.powf(shift as f64 / 12.0),
    }
}

/// Frequency in Hz of a semitone index.
pub fn midi_to_frequency(midi: i32) -> f64 {
    REFERENCE_FREQUENCY * 2f64.powf((midi - REFERENCE_MIDI) as f64 / 12.0)
}

/// Converts a semitone index to a human-readable note name with octave.
///
/// # Examples
///
/// ```
/// use ninkplay::notation::note_to_name;
///
/// assert_eq!(note_to_name(60), "C4");
/// assert_eq!(note_to_name(70), "A#4");
/// ```
pub fn note_to_name(midi: i32) -> String {
    let octave = midi.div_euclid(12) - 1;
    let index = midi.rem_euclid(12) as usize;
    format!("{}{}", NOTE_NAMES[index], octave)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_note_names() {
        let c4: NoteName = "C4".parse().unwrap();
        assert_eq!(c4.midi(), 60);

        let a4: NoteName = "A4".parse().unwrap();
        assert_eq!(a4.midi(), 69);
        assert!((a4.frequency() - 440.0).abs() < 1e-9);

        let fs3: NoteName = "F#3".parse().unwrap();
        assert_eq!(fs3.midi(), 54);

        let bb5: NoteName = " Bb5 ".parse().unwrap();
        assert_eq!(bb5.midi(), 82);
        assert_eq!(bb5.to_string(), "Bb5");
    }

    #[test]
    fn test_malformed_note_names() {
        for bad in ["", "H4", "c4", "C", "C#", "C44", "Cx4", "4C", "C#b4"] {
            match bad.parse::<NoteName>() {
                Err(NinkError::MalformedBaseNote(s)) => assert_eq!(s, bad),
                other => panic!("expected MalformedBaseNote for {:?}, got {:?}", bad, other),
            }
        }
    }

    #[test]
    fn test_solfege_table() {
        let symbols = "DdRrMFfSsLlT";
        for (i, c) in symbols.chars().enumerate() {
            let s = Solfege::from_char(c).unwrap();
            assert_eq!(s.semitone(), i as i32);
            assert_eq!(s.symbol(), c);
        }
        assert_eq!(Solfege::from_char('m'), None);
        assert_eq!(Solfege::from_char('t'), None);
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let d4: NoteName = "D4".parse().unwrap();
        let first = resolve(&d4, Solfege::Do, 0);
        let second = resolve(&d4, Solfege::Do, 0);
        assert_eq!(first, second);
        assert!((first.frequency - d4.frequency()).abs() < 1e-9);
    }

    #[test]
    fn test_resolve_offsets() {
        let c4: NoteName = "C4".parse().unwrap();
        let la = resolve(&c4, Solfege::La, 0);
        assert_eq!(la.midi, 69);
        assert!((la.frequency - 440.0).abs() < 1e-6);

        let high_do = resolve(&c4, Solfege::Do, 24);
        assert_eq!(high_do.midi, 84);
        assert!((high_do.frequency - c4.frequency() * 4.0).abs() < 1e-6);

        let low_ti = resolve(&c4, Solfege::Ti, -12);
        assert_eq!(low_ti.midi, 59);
    }

    #[test]
    fn test_transposed() {
        let c4: NoteName = "C4".parse().unwrap();
        let pitch = resolve(&c4, Solfege::Do, 0).transposed(-3);
        assert_eq!(pitch.midi, 57);
        assert!((pitch.frequency - midi_to_frequency(57)).abs() < 1e-6);
    }

    #[test]
    fn test_note_to_name() {
        assert_eq!(note_to_name(60), "C4");
        assert_eq!(note_to_name(69), "A4");
        assert_eq!(note_to_name(21), "A0");
        assert_eq!(note_to_name(108), "C8");
    }
}
