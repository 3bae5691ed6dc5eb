use std::{
    sync::{
        Condvar, Mutex, PoisonError,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use serde::Serialize;

/// Progress counters shared between the wrapper and its workers.
///
/// Every update wakes threads blocked in [`Counters::wait_until`].
#[derive(Debug, Default)]
pub struct Counters {
    segments_collected: AtomicU64,
    segments_dropped: AtomicU64,
    pref_db_size: AtomicUsize,
    reward_training_steps: AtomicU64,
    using_reward_from_predictor: AtomicBool,
    shutdown: AtomicBool,
    lock: Mutex<()>,
    changed: Condvar,
}

/// Point-in-time copy of [`Counters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub segments_collected: u64,
    /// Completed segments the preference worker never received.
    pub segments_dropped: u64,
    pub pref_db_size: usize,
    pub reward_training_steps: u64,
    pub using_reward_from_predictor: bool,
}

impl Counters {
    #[must_use]
    pub fn segments_collected(&self) -> u64 {
        self.segments_collected.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn segments_dropped(&self) -> u64 {
        self.segments_dropped.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn pref_db_size(&self) -> usize {
        self.pref_db_size.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn reward_training_steps(&self) -> u64 {
        self.reward_training_steps.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn using_reward_from_predictor(&self) -> bool {
        self.using_reward_from_predictor.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            segments_collected: self.segments_collected(),
            segments_dropped: self.segments_dropped(),
            pref_db_size: self.pref_db_size(),
            reward_training_steps: self.reward_training_steps(),
            using_reward_from_predictor: self.using_reward_from_predictor(),
        }
    }

    /// Blocks until `pred` holds for the current counters or `timeout` elapses.
    ///
    /// Returns whether the predicate held.
    pub fn wait_until<F>(&self, mut pred: F, timeout: Duration) -> bool
    where
        F: FnMut(&CounterSnapshot) -> bool,
    {
        self.wait_for(|| pred(&self.snapshot()), Some(timeout))
    }

    pub(crate) fn add_segment(&self) {
        self.segments_collected.fetch_add(1, Ordering::AcqRel);
        self.notify();
    }

    pub(crate) fn drop_segment(&self) {
        self.segments_dropped.fetch_add(1, Ordering::AcqRel);
        self.notify();
    }

    pub(crate) fn set_pref_db_size(&self, size: usize) {
        self.pref_db_size.store(size, Ordering::Release);
        self.notify();
    }

    pub(crate) fn set_reward_training_steps(&self, steps: u64) {
        self.reward_training_steps.store(steps, Ordering::Release);
        self.notify();
    }

    /// Switches to the predicted reward; returns `true` only for the first call.
    pub(crate) fn start_using_predictor(&self) -> bool {
        let first = !self.using_reward_from_predictor.swap(true, Ordering::AcqRel);
        self.notify();
        first
    }

    pub(crate) fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.notify();
    }

    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Blocks until `pred` holds, waking on every counter update.
    ///
    /// `None` waits without a deadline.
    pub(crate) fn wait_for<F>(&self, mut pred: F, timeout: Option<Duration>) -> bool
    where
        F: FnMut() -> bool,
    {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if pred() {
                return true;
            }
            guard = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    self.changed
                        .wait_timeout(guard, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .changed
                    .wait(guard)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }

    fn notify(&self) {
        // taking the lock orders this update before any waiter's next predicate check
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.changed.notify_all();
    }
}
