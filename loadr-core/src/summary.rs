use std::collections::BTreeMap;
use std::time::Duration;

use super::executor::RequestStatus;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatencySummary {
    pub count: u64,
    pub min: Duration,
    pub mean: Duration,
    pub stdev: Duration,
    pub p50: Duration,
    pub p90: Duration,
    pub p95: Duration,
    pub p99: Duration,
    pub max: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckSummary {
    pub name: String,
    pub passed: u64,
    pub failed: u64,
}

impl CheckSummary {
    pub fn total(&self) -> u64 {
        self.passed.saturating_add(self.failed)
    }
}

/// Final, immutable statistics for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub scenario: String,
    pub vus: u64,
    pub run_duration: Duration,

    pub iterations_total: u64,
    /// Iterations with at least one network error, or that were aborted.
    pub iterations_failed: u64,
    /// Completed iterations by VU id. Contains every VU, including ones that finished none.
    pub iterations_per_vu: BTreeMap<u64, u64>,

    pub requests_total: u64,
    pub status_counts: BTreeMap<RequestStatus, u64>,

    pub checks_total: u64,
    pub checks_passed: u64,
    pub checks_failed: u64,
    pub checks_by_name: Vec<CheckSummary>,

    pub latency: LatencySummary,
    pub iteration_duration: LatencySummary,

    pub bytes_sent_total: u64,
    pub bytes_received_total: u64,

    /// `requests_total / run_duration`.
    pub rps: f64,
    /// Statistics over the per-second request rate samples taken while the run was live.
    pub req_per_sec_avg: f64,
    pub req_per_sec_stdev: f64,
    pub req_per_sec_max: f64,
}

impl RunSummary {
    /// Requests that never produced an HTTP response.
    pub fn network_errors(&self) -> u64 {
        self.status_counts
            .iter()
            .filter(|(status, _)| status.is_network_error())
            .map(|(_, n)| *n)
            .sum()
    }

    pub fn check_failure_rate(&self) -> f64 {
        if self.checks_total == 0 {
            return 0.0;
        }
        self.checks_failed as f64 / self.checks_total as f64
    }

    pub fn iterations_passed(&self) -> u64 {
        self.iterations_total.saturating_sub(self.iterations_failed)
    }
}
