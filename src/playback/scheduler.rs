//! Playback scheduling.
//!
//! The [`Scheduler`] owns one clock, one backend and at most one
//! [`PlaybackSession`]. Starting playback always cancels the previous session
//! first, so two sessions never sound at once.
//!
//! Every scheduled callback captures its session's liveness flag and checks
//! it immediately before calling the backend. A callback that was already
//! on its way when the session was cancelled therefore stays silent.

use super::backend::Backend;
use super::clock::Clock;
use super::plan::{EventKind, Plan};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Global counter for generating unique session IDs.
static SESSION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// Generates a new unique session ID.
    pub fn new() -> Self {
        Self(SESSION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Caller's view of a session.
///
/// Cheap to clone. Stays valid after the session ends; it then reports the
/// session as no longer live.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    live: Arc<AtomicBool>,
    pending: Arc<AtomicUsize>,
}

impl SessionHandle {
    fn new() -> Self {
        Self {
            id: SessionId::new(),
            live: Arc::new(AtomicBool::new(true)),
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// False once the session has been cancelled or replaced.
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Callbacks scheduled but not fired yet.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// True when nothing more will sound for this session.
    pub fn is_finished(&self) -> bool {
        !self.is_live() || self.pending() == 0
    }

    fn invalidate(&self) {
        self.live.store(false, Ordering::Release);
    }
}

/// The session currently holding the backend.
#[derive(Debug)]
pub struct PlaybackSession {
    handle: SessionHandle,
    /// Clock time at which offset zero falls.
    started_at: Duration,
    /// Offset at which the plan ends.
    length: Duration,
}

impl PlaybackSession {
    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    pub fn started_at(&self) -> Duration {
        self.started_at
    }

    /// Clock time at which the last entry ends.
    pub fn ends_at(&self) -> Duration {
        self.started_at + self.length
    }
}

/// Dispatches compiled plans to a backend through a clock.
pub struct Scheduler<C: Clock> {
    clock: C,
    backend: Arc<dyn Backend>,
    session: Option<PlaybackSession>,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(clock: C, backend: Arc<dyn Backend>) -> Self {
        Self {
            clock,
            backend,
            session: None,
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// The session currently playing, if any.
    pub fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref()
    }

    /// Starts playing a plan.
    ///
    /// Any session still in progress is cancelled first. Offsets in the plan
    /// are measured from the clock's current time.
    ///
    /// # Arguments
    ///
    /// * `plan` - Compiled notation
    ///
    /// # Returns
    ///
    /// A handle for checking on or cancelling the new session
    pub fn play(&mut self, plan: &Plan) -> SessionHandle {
        self.stop();

        let handle = SessionHandle::new();
        let started_at = self.clock.now();

        for entry in plan.audible() {
            let kind = entry.kind;
            let duration = entry.duration;
            let offset = entry.offset;
            let live = Arc::clone(&handle.live);
            let pending = Arc::clone(&handle.pending);
            let backend = Arc::clone(&self.backend);

            pending.fetch_add(1, Ordering::AcqRel);
            tracing::debug!(
                session = handle.id.as_u64(),
                offset_secs = offset.as_secs_f64(),
                ?kind,
                "scheduled"
            );
            self.clock.schedule_at(
                started_at + offset,
                Box::new(move || {
                    fire(backend.as_ref(), kind, duration, offset, &live);
                    pending.fetch_sub(1, Ordering::AcqRel);
                }),
            );
        }

        tracing::info!(
            session = handle.id.as_u64(),
            events = handle.pending(),
            length_secs = plan.total.as_secs_f64(),
            "playback started"
        );
        self.session = Some(PlaybackSession {
            handle: handle.clone(),
            started_at,
            length: plan.total,
        });
        handle
    }

    /// Cancels a session.
    ///
    /// # Returns
    ///
    /// true if `handle` was the current session. A stale handle is still
    /// marked as no longer live.
    pub fn cancel(&mut self, handle: &SessionHandle) -> bool {
        let current = self
            .session
            .as_ref()
            .is_some_and(|session| session.handle.id == handle.id);

        if current {
            self.stop();
        } else {
            handle.invalidate();
        }
        current
    }

    /// Cancels the current session, if any. Nothing it scheduled will sound.
    pub fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            session.handle.invalidate();
            self.clock.cancel_all();
            tracing::info!(
                session = session.handle.id.as_u64(),
                unplayed = session.handle.pending(),
                "playback stopped"
            );
        }
    }
}

fn fire(backend: &dyn Backend, kind: EventKind, duration: Duration, at: Duration, live: &AtomicBool) {
    if !live.load(Ordering::Acquire) {
        return;
    }

    let result = match kind {
        EventKind::Tone(tone) => backend.play_tone(tone, duration, at),
        EventKind::ErrorIndicator(_) => backend.play_error_indicator(duration, at),
        EventKind::Rest => Ok(()),
    };

    if let Err(e) = result {
        tracing::warn!(offset_secs = at.as_secs_f64(), "backend failed: {}", e);
    }
}
