//! Error types shared across the crate.
//!
//! Only configuration problems are fatal. Everything that can go wrong while
//! reading the notation itself is reported as a [`Diagnostic`](crate::notation::Diagnostic)
//! and playback carries on.

use thiserror::Error;

/// Result type for ninkplay operations.
pub type Result<T> = std::result::Result<T, NinkError>;

/// Errors that abort a playback request.
#[derive(Debug, Error)]
pub enum NinkError {
    /// A configured note name does not match `Letter Accidental? Octave`.
    #[error("malformed note name '{0}': expected a letter A-G, an optional # or b, and an octave digit")]
    MalformedBaseNote(String),

    /// Tempo must be a finite, positive number of beats per minute.
    #[error("invalid tempo: {0} BPM")]
    InvalidTempo(f64),

    /// Unknown range mode name.
    #[error("unknown range mode '{0}': expected normal, lower, higher or full")]
    InvalidRangeMode(String),

    /// The audio backend refused a request.
    #[error("audio backend error: {0}")]
    Backend(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}
