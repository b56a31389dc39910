//! The audio backend contract.
//!
//! The scheduler only ever asks a backend to sound a tone or an error
//! indicator. How that becomes sound is the backend's business.

use super::plan::Tone;
use crate::error::Result;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Something that can make the sounds a schedule asks for.
///
/// Calls arrive when an entry fires. `at` is the entry's offset from session
/// start, which offline backends use to place the sound and live backends
/// may ignore.
pub trait Backend: Send + Sync {
    /// Sounds `tone` for `duration`.
    fn play_tone(&self, tone: Tone, duration: Duration, at: Duration) -> Result<()>;

    /// Sounds the audible error indicator for `duration`.
    fn play_error_indicator(&self, duration: Duration, at: Duration) -> Result<()>;
}

/// A call received by a [`RecordingBackend`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackendCall {
    Tone {
        tone: Tone,
        duration: Duration,
        at: Duration,
    },
    ErrorIndicator {
        duration: Duration,
        at: Duration,
    },
}

impl BackendCall {
    pub fn at(&self) -> Duration {
        match self {
            BackendCall::Tone { at, .. } | BackendCall::ErrorIndicator { at, .. } => *at,
        }
    }
}

/// A silent backend that remembers every call, in firing order.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    calls: Mutex<Vec<BackendCall>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the calls received so far.
    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn record(&self, call: BackendCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }
}

impl Backend for RecordingBackend {
    fn play_tone(&self, tone: Tone, duration: Duration, at: Duration) -> Result<()> {
        self.record(BackendCall::Tone { tone, duration, at });
        Ok(())
    }

    fn play_error_indicator(&self, duration: Duration, at: Duration) -> Result<()> {
        self.record(BackendCall::ErrorIndicator { duration, at });
        Ok(())
    }
}
