//! Nink notation: symbols, tokenizing, pitch resolution and range checks.
//!
//! This module is pure. It knows nothing about time or audio; the
//! [`playback`](crate::playback) module turns its output into scheduled events.

mod diagnostic;
mod pitch;
mod range;
mod tokenizer;

pub use diagnostic::Diagnostic;
pub use pitch::{
    midi_to_frequency, note_to_name, resolve, NoteName, ResolvedPitch, Solfege, NOTE_NAMES,
    REFERENCE_FREQUENCY, REFERENCE_MIDI,
};
pub use range::{validate, RangeMode, Validation, VoiceRange, ABSOLUTE_MAX, ABSOLUTE_MIN};
pub use tokenizer::{
    tokenize, tokenize_with, AmbientState, ControlMarker, DurationPrefix, Payload, SpacePolicy,
    Token, Tokenization, Tokenizer, Voice, REST_CHARS,
};
