use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::{Barrier, Notify};

use super::aggregator::Aggregator;
use super::executor::{Executor, IterationResult};
use super::gate::IterationGate;
use super::scenario::Scenario;

#[derive(Debug)]
pub struct StartSignal {
    started: AtomicBool,
    notify: Notify,
}

impl StartSignal {
    pub fn new() -> Self {
        Self {
            started: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    pub fn start(&self) {
        self.started.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub async fn wait(&self) {
        while !self.started.load(Ordering::Acquire) {
            let notified = self.notify.notified();
            if self.started.load(Ordering::Acquire) {
                break;
            }
            notified.await;
        }
    }
}

/// Everything one virtual user needs to run its loop.
#[derive(Clone)]
pub struct VuContext {
    /// 1-based, unique within a run.
    pub vu_id: u64,
    pub scenario: Arc<dyn Scenario>,
    pub executor: Executor,
    pub aggregator: Arc<Aggregator>,
    pub gate: Arc<IterationGate>,
    pub think_time: Duration,
    pub ready_barrier: Arc<Barrier>,
    pub start_signal: Arc<StartSignal>,
}

/// Runs iterations until the gate closes. A pause between iterations ends early when the
/// iteration cap is used up by other VUs.
///
/// Each iteration executes in its own task so a panicking scenario only loses that iteration.
pub async fn run_vu(ctx: VuContext) {
    ctx.ready_barrier.wait().await;
    ctx.start_signal.wait().await;

    let vu_id = ctx.vu_id;
    tracing::trace!(vu = vu_id, "vu started");

    while ctx.gate.next() {
        let started = Instant::now();

        let executor = ctx.executor.clone();
        let scenario = ctx.scenario.clone();
        let task =
            tokio::spawn(async move { executor.run_iteration(vu_id, scenario.as_ref()).await });

        let result = match task.await {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(vu = vu_id, error = %err, "iteration panicked");
                IterationResult::aborted(vu_id, started.elapsed(), format!("panicked: {err}"))
            }
        };

        if let Some(err) = &result.error {
            tracing::warn!(vu = vu_id, error = %err, "iteration aborted");
        }

        if let Err(err) = ctx.aggregator.record(result) {
            tracing::warn!(vu = vu_id, error = %err, "dropping iteration result");
            break;
        }

        let cap_reached = ctx.gate.cap_reached();
        if ctx.gate.is_closed() {
            break;
        }
        if !ctx.think_time.is_zero() {
            tokio::select! {
                () = think(ctx.think_time, ctx.gate.deadline()) => {}
                () = cap_reached => {}
            }
        }
    }

    tracing::trace!(vu = vu_id, "vu finished");
}

/// Sleeps for `think_time`, but never past the run deadline.
async fn think(think_time: Duration, deadline: Option<Instant>) {
    let pause = deadline.map_or(think_time, |deadline| {
        think_time.min(deadline.saturating_duration_since(Instant::now()))
    });
    tokio::time::sleep(pause).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_signal_releases_waiters() {
        let signal = Arc::new(StartSignal::new());

        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.wait().await })
        };

        tokio::task::yield_now().await;
        signal.start();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap_or_else(|_| panic!("waiter was not released"))
            .unwrap_or_else(|e| panic!("waiter failed: {e}"));

        // Late waiters return immediately.
        signal.wait().await;
    }

    #[tokio::test]
    async fn think_time_is_clipped_to_deadline() {
        let deadline = Instant::now() + Duration::from_millis(20);

        let started = Instant::now();
        think(Duration::from_secs(5), Some(deadline)).await;

        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn oversized_think_time_is_clipped_without_overflow() {
        let deadline = Instant::now() + Duration::from_millis(20);

        let started = Instant::now();
        think(Duration::from_secs(u64::MAX), Some(deadline)).await;

        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
