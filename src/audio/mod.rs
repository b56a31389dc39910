//! Audio backends for playing compiled notation.
//!
//! This module provides sound output through rodio and optional SoundFont
//! synthesis through rustysynth. It supports:
//! - Live playback on the default output device
//! - Built-in bell and whistle voices when no SoundFont is loaded
//! - A noise burst for notes that could not be played
//! - WAV export through an offline render

pub mod engine;
pub mod export;
pub mod tone;

pub use engine::{AudioEngine, AudioOutput, SAMPLE_RATE};
pub use export::{export_to_wav, render};
pub use tone::{NoiseBurst, ToneSource};
