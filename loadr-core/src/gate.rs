use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tokio::sync::futures::Notified;

/// Decides whether a VU may start another iteration.
///
/// The run deadline is fixed once by [`IterationGate::start_at`]. A duration too large to add to
/// the start instant leaves the run without a deadline. An optional cap bounds the total number of
/// iterations across all VUs.
#[derive(Debug)]
pub struct IterationGate {
    counter: AtomicU64,
    iterations: Option<u64>,
    duration: Duration,
    /// `Some(None)` once started with a duration past the clock's range.
    deadline: OnceLock<Option<Instant>>,
    cap_reached: Notify,
}

impl IterationGate {
    pub fn new(duration: Duration, iterations: Option<u64>) -> Self {
        Self {
            counter: AtomicU64::new(0),
            iterations,
            duration,
            deadline: OnceLock::new(),
            cap_reached: Notify::new(),
        }
    }

    pub fn start_at(&self, started: Instant) {
        let _ = self.deadline.set(started.checked_add(self.duration));
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline.get().copied().flatten()
    }

    /// Claims the next iteration. Returns `false` once the deadline has passed or the cap is used up.
    pub fn next(&self) -> bool {
        let now = Instant::now();

        // Lazily fix the deadline if nobody started the gate explicitly.
        if self.deadline.get().is_none() {
            self.start_at(now);
        }

        if self.deadline().is_some_and(|deadline| now >= deadline) {
            return false;
        }

        if let Some(total) = self.iterations {
            let idx = self.counter.fetch_add(1, Ordering::Relaxed);
            if idx >= total {
                return false;
            }
            if idx + 1 == total {
                self.cap_reached.notify_waiters();
            }
        }

        true
    }

    /// True once no further iteration can be claimed. Does not consume an iteration.
    pub fn is_closed(&self) -> bool {
        if self.deadline().is_some_and(|deadline| Instant::now() >= deadline) {
            return true;
        }
        self.iterations
            .is_some_and(|total| self.counter.load(Ordering::Relaxed) >= total)
    }

    /// Resolves once the last capped iteration has been claimed. Create it before checking
    /// [`IterationGate::is_closed`] so a claim in between is not missed.
    pub fn cap_reached(&self) -> Notified<'_> {
        self.cap_reached.notified()
    }

    /// Time left until the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.deadline()
            .map_or(self.duration, |d| d.saturating_duration_since(Instant::now()))
    }
}
