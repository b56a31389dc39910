//! Clocks that fire deferred actions.
//!
//! The scheduler never sleeps. It hands each entry to a [`Clock`] as an action
//! due at an absolute clock time and lets the clock decide when that is.
//! [`VirtualClock`] only moves when told to, which makes timing tests exact.
//! [`RealtimeClock`] fires from a background timer thread against wall time.

use crate::error::Result;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// A deferred callback.
pub type Action = Box<dyn FnOnce() + Send + 'static>;

/// Deferred-callback facility driving playback.
pub trait Clock {
    /// Current clock time.
    fn now(&self) -> Duration;

    /// Runs `action` once the clock reaches `at`. Actions due at the same
    /// time fire in the order they were scheduled.
    fn schedule_at(&self, at: Duration, action: Action);

    /// Drops every action that has not fired yet.
    fn cancel_all(&self);

    /// Number of actions waiting to fire.
    fn pending(&self) -> usize;
}

/// An action waiting in a queue, ordered so `BinaryHeap` pops the earliest.
struct Pending {
    at: Duration,
    seq: u64,
    action: Action,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct Queue {
    heap: BinaryHeap<Pending>,
    seq: u64,
}

impl Queue {
    fn push(&mut self, at: Duration, action: Action) {
        let seq = self.seq;
        self.seq += 1;
        self.heap.push(Pending { at, seq, action });
    }

    /// Removes the earliest action if it is due by `now`.
    fn pop_due(&mut self, now: Duration) -> Option<Pending> {
        match self.heap.peek() {
            Some(next) if next.at <= now => self.heap.pop(),
            _ => None,
        }
    }
}

/// A simulated clock for deterministic playback and offline rendering.
///
/// Time only moves through [`advance`](VirtualClock::advance),
/// [`advance_to`](VirtualClock::advance_to) or
/// [`run_until_idle`](VirtualClock::run_until_idle). Single-threaded.
#[derive(Default)]
pub struct VirtualClock {
    now: RefCell<Duration>,
    queue: RefCell<Queue>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves time forward by `by`, firing everything that falls due.
    ///
    /// # Returns
    ///
    /// Number of actions fired
    pub fn advance(&self, by: Duration) -> usize {
        let target = *self.now.borrow() + by;
        self.advance_to(target)
    }

    /// Moves time forward to `target`, firing everything due on the way in
    /// time order. Never moves time backwards.
    pub fn advance_to(&self, target: Duration) -> usize {
        let mut fired = 0;
        loop {
            // Borrow is released before the action runs.
            let next = self.queue.borrow_mut().pop_due(target);
            let Some(pending) = next else { break };

            {
                let mut now = self.now.borrow_mut();
                *now = (*now).max(pending.at);
            }
            (pending.action)();
            fired += 1;
        }

        let mut now = self.now.borrow_mut();
        *now = (*now).max(target);
        fired
    }

    /// Fires every pending action, advancing time to the last one.
    pub fn run_until_idle(&self) -> usize {
        let mut fired = 0;
        loop {
            let last = self.queue.borrow().heap.iter().map(|p| p.at).max();
            match last {
                Some(at) => fired += self.advance_to(at),
                None => return fired,
            }
        }
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Duration {
        *self.now.borrow()
    }

    fn schedule_at(&self, at: Duration, action: Action) {
        self.queue.borrow_mut().push(at, action);
    }

    fn cancel_all(&self) {
        self.queue.borrow_mut().heap.clear();
    }

    fn pending(&self) -> usize {
        self.queue.borrow().heap.len()
    }
}

/// State shared between a [`RealtimeClock`] and its timer thread.
struct Shared {
    state: Mutex<TimerState>,
    wake: Condvar,
}

#[derive(Default)]
struct TimerState {
    queue: Queue,
    shutdown: bool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A wall-clock timer backed by one background thread.
///
/// Clock time is measured from construction. Actions run on the timer
/// thread, one at a time, in due order.
pub struct RealtimeClock {
    shared: Arc<Shared>,
    epoch: Instant,
    worker: Option<JoinHandle<()>>,
}

impl RealtimeClock {
    /// Starts the timer thread.
    ///
    /// # Errors
    ///
    /// Returns error if the thread cannot be spawned
    pub fn new() -> Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(TimerState::default()),
            wake: Condvar::new(),
        });
        let epoch = Instant::now();

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("ninkplay-clock".to_string())
            .spawn(move || run_timer(worker_shared, epoch))?;

        Ok(Self {
            shared,
            epoch,
            worker: Some(worker),
        })
    }
}

fn run_timer(shared: Arc<Shared>, epoch: Instant) {
    let mut state = shared.lock();
    loop {
        if state.shutdown {
            return;
        }

        let now = epoch.elapsed();
        if let Some(pending) = state.queue.pop_due(now) {
            drop(state);
            (pending.action)();
            state = shared.lock();
            continue;
        }

        let next = state.queue.heap.peek().map(|p| p.at);
        state = match next {
            Some(at) => {
                shared
                    .wake
                    .wait_timeout(state, at.saturating_sub(now))
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
            None => shared
                .wake
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner),
        };
    }
}

impl Clock for RealtimeClock {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }

    fn schedule_at(&self, at: Duration, action: Action) {
        self.shared.lock().queue.push(at, action);
        self.shared.wake.notify_one();
    }

    fn cancel_all(&self) {
        self.shared.lock().queue.heap.clear();
        self.shared.wake.notify_one();
    }

    fn pending(&self) -> usize {
        self.shared.lock().queue.heap.len()
    }
}

impl Drop for RealtimeClock {
    fn drop(&mut self) {
        self.shared.lock().shutdown = true;
        self.shared.wake.notify_all();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("clock thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, impl Fn(u32) -> Action) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let make = {
            let log = Arc::clone(&log);
            move |n: u32| -> Action {
                let log = Arc::clone(&log);
                Box::new(move || log.lock().unwrap().push(n))
            }
        };
        (log, make)
    }

    #[test]
    fn test_virtual_clock_fires_in_time_order() {
        let clock = VirtualClock::new();
        let (log, action) = recorder();

        clock.schedule_at(Duration::from_millis(300), action(3));
        clock.schedule_at(Duration::from_millis(100), action(1));
        clock.schedule_at(Duration::from_millis(200), action(2));
        assert_eq!(clock.pending(), 3);

        assert_eq!(clock.advance(Duration::from_millis(150)), 1);
        assert_eq!(*log.lock().unwrap(), vec![1]);
        assert_eq!(clock.now(), Duration::from_millis(150));

        assert_eq!(clock.run_until_idle(), 2);
        assert_eq!(*log.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(clock.now(), Duration::from_millis(300));
        assert_eq!(clock.pending(), 0);
    }

    #[test]
    fn test_virtual_clock_ties_keep_insertion_order() {
        let clock = VirtualClock::new();
        let (log, action) = recorder();
        for n in 0..5 {
            clock.schedule_at(Duration::from_millis(10), action(n));
        }
        clock.run_until_idle();
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_virtual_clock_cancel_all() {
        let clock = VirtualClock::new();
        let (log, action) = recorder();
        clock.schedule_at(Duration::from_millis(10), action(1));
        clock.schedule_at(Duration::from_millis(20), action(2));

        clock.advance(Duration::from_millis(10));
        clock.cancel_all();
        assert_eq!(clock.pending(), 0);
        assert_eq!(clock.advance(Duration::from_secs(1)), 0);
        assert_eq!(*log.lock().unwrap(), vec![1]);
    }

    #[test]
    fn test_virtual_clock_never_moves_backwards() {
        let clock = VirtualClock::new();
        clock.advance_to(Duration::from_secs(2));
        clock.advance_to(Duration::from_secs(1));
        assert_eq!(clock.now(), Duration::from_secs(2));
    }

    #[test]
    fn test_realtime_clock_fires() {
        let clock = RealtimeClock::new().unwrap();
        let (tx, rx) = mpsc::channel();
        let start = clock.now();

        for n in [2u32, 1] {
            let tx = tx.clone();
            clock.schedule_at(
                start + Duration::from_millis(20 * n as u64),
                Box::new(move || {
                    let _ = tx.send(n);
                }),
            );
        }

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 1);
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 2);
        assert!(clock.now() >= start + Duration::from_millis(40));
    }

    #[test]
    fn test_realtime_clock_cancel_all() {
        let clock = RealtimeClock::new().unwrap();
        let (tx, rx) = mpsc::channel::<()>();
        clock.schedule_at(
            clock.now() + Duration::from_millis(200),
            Box::new(move || {
                let _ = tx.send(());
            }),
        );
        clock.cancel_all();
        assert_eq!(clock.pending(), 0);
        // The action was dropped, so the sender is gone.
        assert!(rx.recv_timeout(Duration::from_millis(400)).is_err());
    }
}
