//! ninkplay - A player for Nink solfège notation.
//!
//! This library compiles notation strings into timed, range-checked plans and
//! plays them through a pluggable audio backend.

pub mod audio;
pub mod config;
pub mod error;
pub mod notation;
pub mod playback;

// Re-export commonly used types
pub use audio::{export_to_wav, AudioEngine};
pub use config::SessionConfig;
pub use error::{NinkError, Result};
pub use notation::{tokenize, Diagnostic, NoteName, RangeMode, Solfege, Token, Voice};
pub use playback::{compile, Backend, Plan, Scheduler, SessionHandle};
