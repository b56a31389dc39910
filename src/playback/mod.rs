//! Turning compiled notation into sound over time.
//!
//! - [`plan`]: compile notation into a timed, validated schedule
//! - [`clock`]: deferred-callback clocks (virtual and wall-clock)
//! - [`scheduler`]: session-based dispatch of a plan to a backend
//! - [`backend`]: the contract an audio backend implements

pub mod backend;
pub mod clock;
pub mod plan;
pub mod scheduler;

pub use backend::{Backend, BackendCall, RecordingBackend};
pub use clock::{Action, Clock, RealtimeClock, VirtualClock};
pub use plan::{compile, schedule_tokens, ErrorCause, EventKind, Plan, ScheduleEntry, Tone};
pub use scheduler::{PlaybackSession, Scheduler, SessionHandle, SessionId};
