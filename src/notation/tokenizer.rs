//! Notation tokenizer.
//!
//! Scans a Nink notation string left to right. Each scan passes through three
//! states:
//!
//! 1. **Prefix**: an optional duration marker (`::`, `__`, `:`, `_`)
//! 2. **Control**: any number of voice/octave markers, which update the
//!    [`AmbientState`] but emit nothing
//! 3. **Payload**: one character, either a solfège symbol or a rest
//!
//! Voice and octave persist from one token to the next until a marker changes
//! them. A `.` is always a rest; what a space means is set by [`SpacePolicy`].

use super::diagnostic::Diagnostic;
use super::pitch::Solfege;
use super::range::RangeMode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Characters that can denote a rest.
pub const REST_CHARS: [char; 2] = [' ', '.'];

/// How a space in the payload position is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpacePolicy {
    /// Spaces separate tokens for readability and take no time.
    #[default]
    Separator,
    /// Spaces are rests, like `.`.
    Rest,
}

/// Timbral identity of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Voice {
    /// Selected with `` ` `` (the bell).
    #[default]
    Primary,
    /// Selected with `*` (the whistle).
    Secondary,
}

impl Voice {
    pub fn name(&self) -> &'static str {
        match self {
            Voice::Primary => "primary",
            Voice::Secondary => "secondary",
        }
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Duration prefix of a token, relative to one beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DurationPrefix {
    /// `::`
    QuarterBeat,
    /// `:`
    HalfBeat,
    /// No prefix.
    #[default]
    Beat,
    /// `_`
    TwoBeats,
    /// `__`
    FourBeats,
}

impl DurationPrefix {
    pub fn multiplier(&self) -> f64 {
        match self {
            DurationPrefix::QuarterBeat => 0.25,
            DurationPrefix::HalfBeat => 0.5,
            DurationPrefix::Beat => 1.0,
            DurationPrefix::TwoBeats => 2.0,
            DurationPrefix::FourBeats => 4.0,
        }
    }
}

/// A logical control marker. Doubled markers occupy two input characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlMarker {
    /// `` ` ``
    PrimaryVoice,
    /// `*`
    SecondaryVoice,
    /// `/` or `!`
    UpOctave,
    /// `\` or `¡`
    DownOctave,
    /// `//` or `!!`
    UpTwoOctaves,
    /// `\\` or `¡¡`
    DownTwoOctaves,
    /// `~`
    ResetOctave,
}

impl ControlMarker {
    /// Single-character marker, if `c` is one.
    fn single(c: char) -> Option<Self> {
        match c {
            '`' => Some(ControlMarker::PrimaryVoice),
            '*' => Some(ControlMarker::SecondaryVoice),
            '/' | '!' => Some(ControlMarker::UpOctave),
            '\\' | '¡' => Some(ControlMarker::DownOctave),
            '~' => Some(ControlMarker::ResetOctave),
            _ => None,
        }
    }

    /// Doubled marker for a repeated character, if `c` has one.
    fn doubled(c: char) -> Option<Self> {
        match c {
            '/' | '!' => Some(ControlMarker::UpTwoOctaves),
            '\\' | '¡' => Some(ControlMarker::DownTwoOctaves),
            _ => None,
        }
    }

    pub fn is_doubled(&self) -> bool {
        matches!(self, ControlMarker::UpTwoOctaves | ControlMarker::DownTwoOctaves)
    }
}

/// What a token sounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    Note(Solfege),
    Rest,
}

/// One note or rest, carrying the ambient state at the moment it was emitted.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub payload: Payload,
    pub duration: DurationPrefix,
    pub voice: Voice,
    /// Semitone shift from octave markers: -24, -12, 0, 12 or 24.
    pub octave_offset: i32,
    /// Set on the first note after a doubled octave marker that the range
    /// mode did not allow. Such a note sounds as an error indicator.
    pub rejected_marker: Option<ControlMarker>,
    /// Character index of the payload in the input.
    pub position: usize,
}

impl Token {
    pub fn is_rest(&self) -> bool {
        self.payload == Payload::Rest
    }
}

/// Voice and octave state threaded between scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AmbientState {
    pub voice: Voice,
    pub octave_offset: i32,
    /// A rejected doubled marker waiting for the next note.
    pub pending_rejection: Option<ControlMarker>,
}

/// Output of a full tokenizer run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Tokenization {
    pub tokens: Vec<Token>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Streaming tokenizer over a notation string.
///
/// Iterating yields tokens; recoverable problems collect in
/// [`Tokenizer::diagnostics`].
#[derive(Debug, Clone)]
pub struct Tokenizer {
    chars: Vec<char>,
    pos: usize,
    mode: RangeMode,
    spaces: SpacePolicy,
    ambient: AmbientState,
    diagnostics: Vec<Diagnostic>,
}

impl Tokenizer {
    /// Creates a tokenizer that checks doubled octave markers against `mode`.
    pub fn new(input: &str, mode: RangeMode) -> Self {
        Self::with_ambient(input, mode, AmbientState::default())
    }

    /// Creates a tokenizer that starts from an existing ambient state.
    pub fn with_ambient(input: &str, mode: RangeMode, ambient: AmbientState) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
            mode,
            spaces: SpacePolicy::default(),
            ambient,
            diagnostics: Vec::new(),
        }
    }

    /// Sets how spaces are read.
    pub fn spaces(mut self, policy: SpacePolicy) -> Self {
        self.spaces = policy;
        self
    }

    pub fn ambient(&self) -> &AmbientState {
        &self.ambient
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Consumes the tokenizer, returning every remaining token and all diagnostics.
    pub fn finish(mut self) -> Tokenization {
        let tokens = self.by_ref().collect();
        Tokenization {
            tokens,
            diagnostics: self.diagnostics,
        }
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    /// Prefix state. Doubled prefixes are checked first.
    fn scan_prefix(&mut self) -> DurationPrefix {
        let (prefix, width) = match (self.peek(0), self.peek(1)) {
            (Some(':'), Some(':')) => (DurationPrefix::QuarterBeat, 2),
            (Some('_'), Some('_')) => (DurationPrefix::FourBeats, 2),
            (Some(':'), _) => (DurationPrefix::HalfBeat, 1),
            (Some('_'), _) => (DurationPrefix::TwoBeats, 1),
            _ => (DurationPrefix::Beat, 0),
        };
        self.pos += width;
        prefix
    }

    /// Control state. Returns the next marker and its starting position.
    fn scan_control(&mut self) -> Option<(ControlMarker, usize)> {
        let c = self.peek(0)?;
        let single = ControlMarker::single(c)?;
        let start = self.pos;

        if self.peek(1) == Some(c) {
            if let Some(doubled) = ControlMarker::doubled(c) {
                self.pos += 2;
                return Some((doubled, start));
            }
        }

        self.pos += 1;
        Some((single, start))
    }

    fn apply(&mut self, marker: ControlMarker, position: usize) {
        if !self.mode.permits(marker) {
            tracing::warn!(?marker, position, mode = %self.mode, "octave extension not allowed");
            self.diagnostics.push(Diagnostic::DisallowedOctaveExtension {
                marker,
                position,
                mode: self.mode,
            });
            self.ambient.pending_rejection = Some(marker);
            return;
        }

        match marker {
            ControlMarker::PrimaryVoice => self.ambient.voice = Voice::Primary,
            ControlMarker::SecondaryVoice => self.ambient.voice = Voice::Secondary,
            ControlMarker::UpOctave => self.ambient.octave_offset = 12,
            ControlMarker::DownOctave => self.ambient.octave_offset = -12,
            ControlMarker::UpTwoOctaves => self.ambient.octave_offset = 24,
            ControlMarker::DownTwoOctaves => self.ambient.octave_offset = -24,
            ControlMarker::ResetOctave => self.ambient.octave_offset = 0,
        }
    }

    fn emit(&mut self, payload: Payload, duration: DurationPrefix, position: usize) -> Token {
        let rejected_marker = match payload {
            Payload::Note(_) => self.ambient.pending_rejection.take(),
            Payload::Rest => None,
        };
        Token {
            payload,
            duration,
            voice: self.ambient.voice,
            octave_offset: self.ambient.octave_offset,
            rejected_marker,
            position,
        }
    }
}

impl Iterator for Tokenizer {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        while self.pos < self.chars.len() {
            let duration = self.scan_prefix();

            while let Some((marker, position)) = self.scan_control() {
                self.apply(marker, position);
            }

            // Payload state. Trailing markers with nothing after them emit nothing.
            let position = self.pos;
            let c = self.peek(0)?;
            self.pos += 1;

            // A prefixed space is a held rest under either policy
            if c == ' '
                && self.spaces == SpacePolicy::Separator
                && duration == DurationPrefix::Beat
            {
                continue;
            }
            if REST_CHARS.contains(&c) {
                return Some(self.emit(Payload::Rest, duration, position));
            }
            if let Some(symbol) = Solfege::from_char(c) {
                return Some(self.emit(Payload::Note(symbol), duration, position));
            }

            tracing::warn!(character = %c, position, "skipping unrecognized character");
            self.diagnostics
                .push(Diagnostic::UnrecognizedToken { ch: c, position });
        }
        None
    }
}

/// Tokenizes with every octave extension allowed and spaces as separators.
pub fn tokenize(input: &str) -> Tokenization {
    tokenize_with(input, RangeMode::Full, SpacePolicy::Separator)
}

/// Tokenizes, rejecting doubled octave markers that `mode` does not allow.
pub fn tokenize_with(input: &str, mode: RangeMode, spaces: SpacePolicy) -> Tokenization {
    Tokenizer::new(input, mode).spaces(spaces).finish()
}
