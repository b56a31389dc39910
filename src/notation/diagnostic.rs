//! Recoverable notation problems.

use super::pitch::{note_to_name, Solfege};
use super::range::{RangeMode, VoiceRange};
use super::tokenizer::{ControlMarker, Voice};
use std::fmt;

/// A problem found while compiling notation that does not stop playback.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// A payload character that is neither a solfège symbol nor a rest.
    /// The character is skipped without emitting an event.
    UnrecognizedToken { ch: char, position: usize },

    /// A doubled octave marker the active range mode does not allow.
    /// The next note sounds as an error indicator instead.
    DisallowedOctaveExtension {
        marker: ControlMarker,
        position: usize,
        mode: RangeMode,
    },

    /// A note resolved outside its voice window or the instrument bounds.
    OutOfRange {
        symbol: Solfege,
        voice: Voice,
        midi: i32,
        range: VoiceRange,
        position: usize,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UnrecognizedToken { ch, position } => {
                write!(f, "unrecognized character {:?} at {}", ch, position)
            }
            Diagnostic::DisallowedOctaveExtension {
                marker,
                position,
                mode,
            } => write!(
                f,
                "{:?} at {} is not allowed in {} range mode",
                marker, position, mode
            ),
            Diagnostic::OutOfRange {
                symbol,
                voice,
                midi,
                range,
                position,
            } => write!(
                f,
                "{} at {} resolves to {} ({}), outside the {} voice range {}..={}",
                symbol,
                position,
                note_to_name(*midi),
                midi,
                voice,
                note_to_name(range.min),
                note_to_name(range.max)
            ),
        }
    }
}
