use std::sync::Arc;
use std::time::Duration;

/// Live snapshot emitted once per second while a run is in progress.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub tick: u64,
    pub elapsed: Duration,
    pub duration: Duration,
    pub vus: u64,

    pub iterations_total: u64,
    pub requests_total: u64,
    /// Requests that ended in a network error so far.
    pub requests_failed: u64,
    pub checks_failed_total: u64,

    /// Requests/sec observed during the last progress interval.
    pub rps_now: f64,
}

impl ProgressUpdate {
    /// Fraction of the planned duration that has elapsed, in `0.0..=1.0`.
    pub fn fraction(&self) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        (self.elapsed.as_secs_f64() / self.duration.as_secs_f64()).clamp(0.0, 1.0)
    }
}

pub type ProgressFn = Arc<dyn Fn(ProgressUpdate) + Send + Sync + 'static>;
