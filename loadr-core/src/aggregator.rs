use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use hdrhistogram::Histogram;

use super::error::{Error, Result};
use super::executor::{IterationResult, RequestStatus};
use super::summary::{CheckSummary, LatencySummary, RunSummary};

#[derive(Debug, Default)]
struct CheckCounters {
    passed: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Default)]
struct RpsAgg {
    count: u64,
    mean: f64,
    m2: f64,
    max: f64,
}

impl RpsAgg {
    fn record(&mut self, sample: f64) {
        if !sample.is_finite() {
            return;
        }

        self.count = self.count.saturating_add(1);
        let delta = sample - self.mean;
        self.mean += delta / (self.count as f64);
        let delta2 = sample - self.mean;
        self.m2 += delta * delta2;
        self.max = self.max.max(sample);
    }

    /// (avg, stdev, max)
    fn summary(&self) -> (f64, f64, f64) {
        if self.count == 0 {
            return (0.0, 0.0, 0.0);
        }

        let stdev = if self.count >= 2 {
            (self.m2 / ((self.count - 1) as f64)).sqrt()
        } else {
            0.0
        };
        (self.mean, stdev, self.max)
    }
}

fn new_hist() -> Histogram<u64> {
    // Up to one hour in microseconds, 3 significant figures.
    Histogram::<u64>::new_with_bounds(1, 3_600_000_000, 3)
        .unwrap_or_else(|err| panic!("failed to init histogram: {err}"))
}

fn duration_us(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX).max(1)
}

fn latency_summary(h: &Histogram<u64>) -> LatencySummary {
    #[allow(clippy::len_zero)]
    if h.len() == 0 {
        return LatencySummary::default();
    }

    let us = Duration::from_micros;
    LatencySummary {
        count: h.len(),
        min: us(h.min()),
        mean: Duration::from_secs_f64(h.mean() / 1_000_000.0),
        stdev: Duration::from_secs_f64(h.stdev() / 1_000_000.0),
        p50: us(h.value_at_quantile(0.50)),
        p90: us(h.value_at_quantile(0.90)),
        p95: us(h.value_at_quantile(0.95)),
        p99: us(h.value_at_quantile(0.99)),
        max: us(h.max()),
    }
}

/// Collects [`IterationResult`]s from all VUs and produces the final [`RunSummary`].
///
/// `record` may be called concurrently from any number of tasks. `finalize` succeeds once;
/// callers must make sure every VU has stopped recording before calling it.
#[derive(Debug)]
pub struct Aggregator {
    scenario: String,
    vus: u64,

    iterations_total: AtomicU64,
    iterations_failed: AtomicU64,
    requests_total: AtomicU64,
    requests_failed: AtomicU64,
    checks_total: AtomicU64,
    checks_failed: AtomicU64,
    bytes_sent_total: AtomicU64,
    bytes_received_total: AtomicU64,

    status_counts: DashMap<RequestStatus, u64>,
    checks_by_name: DashMap<String, CheckCounters>,
    iterations_by_vu: DashMap<u64, u64>,

    latency_us: Mutex<Histogram<u64>>,
    iteration_us: Mutex<Histogram<u64>>,
    rps_samples: Mutex<RpsAgg>,

    started: OnceLock<Instant>,
    finalized: AtomicBool,
}

impl Aggregator {
    pub fn new(scenario: impl Into<String>, vus: u64) -> Self {
        Self {
            scenario: scenario.into(),
            vus,
            iterations_total: AtomicU64::new(0),
            iterations_failed: AtomicU64::new(0),
            requests_total: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            checks_total: AtomicU64::new(0),
            checks_failed: AtomicU64::new(0),
            bytes_sent_total: AtomicU64::new(0),
            bytes_received_total: AtomicU64::new(0),
            status_counts: DashMap::new(),
            checks_by_name: DashMap::new(),
            iterations_by_vu: DashMap::new(),
            latency_us: Mutex::new(new_hist()),
            iteration_us: Mutex::new(new_hist()),
            rps_samples: Mutex::new(RpsAgg::default()),
            started: OnceLock::new(),
            finalized: AtomicBool::new(false),
        }
    }

    /// Makes `vu_id` show up in the per-VU breakdown even if it never completes an iteration.
    pub fn register_vu(&self, vu_id: u64) {
        self.iterations_by_vu.entry(vu_id).or_insert(0);
    }

    /// Sets the run start used for the wall-clock duration. Only the first call has an effect.
    pub fn mark_started(&self, at: Instant) {
        let _ = self.started.set(at);
    }

    pub fn elapsed(&self) -> Duration {
        self.started
            .get()
            .map_or(Duration::ZERO, |started| started.elapsed())
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::Acquire)
    }

    pub fn record(&self, result: IterationResult) -> Result<()> {
        if self.is_finalized() {
            return Err(Error::RecordAfterFinalize);
        }

        self.iterations_total.fetch_add(1, Ordering::Relaxed);
        if result.is_failed() {
            self.iterations_failed.fetch_add(1, Ordering::Relaxed);
        }
        *self.iterations_by_vu.entry(result.vu_id).or_insert(0) += 1;

        {
            let mut h = self
                .iteration_us
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            h.saturating_record(duration_us(result.duration));
        }

        if !result.requests.is_empty() {
            let mut h = self
                .latency_us
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            for req in &result.requests {
                h.saturating_record(duration_us(req.latency));
            }
        }

        for req in &result.requests {
            self.requests_total.fetch_add(1, Ordering::Relaxed);
            if req.status.is_network_error() {
                self.requests_failed.fetch_add(1, Ordering::Relaxed);
            }
            self.bytes_sent_total
                .fetch_add(req.bytes_sent, Ordering::Relaxed);
            self.bytes_received_total
                .fetch_add(req.bytes_received, Ordering::Relaxed);
            *self.status_counts.entry(req.status).or_insert(0) += 1;
        }

        for check in result.checks {
            self.checks_total.fetch_add(1, Ordering::Relaxed);
            let counters = self.checks_by_name.entry(check.name).or_default();
            if check.passed {
                counters.passed.fetch_add(1, Ordering::Relaxed);
            } else {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                self.checks_failed.fetch_add(1, Ordering::Relaxed);
            }
        }

        Ok(())
    }

    pub fn record_rps_sample(&self, rps: f64) {
        let mut agg = self
            .rps_samples
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        agg.record(rps);
    }

    pub fn iterations_total(&self) -> u64 {
        self.iterations_total.load(Ordering::Relaxed)
    }

    pub fn iterations_failed(&self) -> u64 {
        self.iterations_failed.load(Ordering::Relaxed)
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    /// Requests that ended in a network error.
    pub fn requests_failed(&self) -> u64 {
        self.requests_failed.load(Ordering::Relaxed)
    }

    pub fn checks_total(&self) -> u64 {
        self.checks_total.load(Ordering::Relaxed)
    }

    pub fn checks_failed(&self) -> u64 {
        self.checks_failed.load(Ordering::Relaxed)
    }

    /// Produces the final summary. Fails with [`Error::AlreadyFinalized`] on any call but the first.
    pub fn finalize(&self) -> Result<RunSummary> {
        if self
            .finalized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::AlreadyFinalized);
        }

        let run_duration = self.elapsed();
        let secs = run_duration.as_secs_f64().max(1e-9);
        let requests_total = self.requests_total();

        let mut checks_by_name: Vec<CheckSummary> = self
            .checks_by_name
            .iter()
            .map(|entry| CheckSummary {
                name: entry.key().clone(),
                passed: entry.value().passed.load(Ordering::Relaxed),
                failed: entry.value().failed.load(Ordering::Relaxed),
            })
            .collect();
        checks_by_name.sort_by(|a, b| a.name.cmp(&b.name));

        let status_counts: BTreeMap<RequestStatus, u64> = self
            .status_counts
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();

        let iterations_per_vu: BTreeMap<u64, u64> = self
            .iterations_by_vu
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();

        let latency = {
            let h = self
                .latency_us
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            latency_summary(&h)
        };
        let iteration_duration = {
            let h = self
                .iteration_us
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            latency_summary(&h)
        };

        let (req_per_sec_avg, req_per_sec_stdev, req_per_sec_max) = {
            let agg = self
                .rps_samples
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            agg.summary()
        };

        let checks_total = self.checks_total();
        let checks_failed = self.checks_failed();

        Ok(RunSummary {
            scenario: self.scenario.clone(),
            vus: self.vus,
            run_duration,
            iterations_total: self.iterations_total(),
            iterations_failed: self.iterations_failed(),
            iterations_per_vu,
            requests_total,
            status_counts,
            checks_total,
            checks_passed: checks_total.saturating_sub(checks_failed),
            checks_failed,
            checks_by_name,
            latency,
            iteration_duration,
            bytes_sent_total: self.bytes_sent_total.load(Ordering::Relaxed),
            bytes_received_total: self.bytes_received_total.load(Ordering::Relaxed),
            rps: (requests_total as f64) / secs,
            req_per_sec_avg,
            req_per_sec_stdev,
            req_per_sec_max,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{CheckResult, RequestOutcome};
    use loadr_http::HttpTransportErrorKind;
    use std::sync::Arc;

    fn outcome(status: RequestStatus, latency_ms: u64) -> RequestOutcome {
        RequestOutcome {
            name: "GET /".to_string(),
            method: http::Method::GET,
            url: "http://localhost/".to_string(),
            status,
            latency: Duration::from_millis(latency_ms),
            bytes_sent: 10,
            bytes_received: 20,
        }
    }

    fn iteration(vu_id: u64, status: RequestStatus, passed: bool) -> IterationResult {
        IterationResult {
            vu_id,
            requests: vec![outcome(status, 5)],
            checks: vec![CheckResult {
                name: "status was 200".to_string(),
                passed,
            }],
            duration: Duration::from_millis(6),
            error: None,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_records_are_all_counted() {
        let agg = Arc::new(Aggregator::new("t", 8));
        agg.mark_started(Instant::now());

        let mut handles = Vec::new();
        for vu in 1..=8u64 {
            let agg = agg.clone();
            agg.register_vu(vu);
            handles.push(tokio::spawn(async move {
                for _ in 0..250 {
                    agg.record(iteration(vu, RequestStatus::Code(200), true))
                        .unwrap_or_else(|e| panic!("record failed: {e}"));
                }
            }));
        }
        for h in handles {
            h.await.unwrap_or_else(|e| panic!("join failed: {e}"));
        }

        let summary = agg.finalize().unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(summary.iterations_total, 2000);
        assert_eq!(summary.iterations_per_vu.len(), 8);
        assert_eq!(summary.iterations_per_vu.values().sum::<u64>(), 2000);
        assert_eq!(summary.requests_total, 2000);
        assert_eq!(summary.latency.count, 2000);
        assert_eq!(summary.bytes_sent_total, 20_000);
        assert_eq!(summary.checks_passed, 2000);
    }

    #[test]
    fn failed_checks_do_not_fail_iterations() {
        let agg = Aggregator::new("t", 1);
        agg.record(iteration(1, RequestStatus::Code(404), false))
            .unwrap_or_else(|e| panic!("{e}"));
        agg.record(iteration(
            1,
            RequestStatus::Error(HttpTransportErrorKind::Connect),
            false,
        ))
        .unwrap_or_else(|e| panic!("{e}"));

        let summary = agg.finalize().unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(summary.iterations_total, 2);
        assert_eq!(summary.iterations_failed, 1);
        assert_eq!(summary.checks_failed, 2);
        assert_eq!(summary.network_errors(), 1);
        assert_eq!(summary.status_counts.get(&RequestStatus::Code(404)), Some(&1));
        assert_eq!(
            summary.checks_by_name,
            vec![CheckSummary {
                name: "status was 200".to_string(),
                passed: 0,
                failed: 2,
            }]
        );
    }

    #[test]
    fn aborted_iteration_counts_as_failed() {
        let agg = Aggregator::new("t", 1);
        agg.record(IterationResult::aborted(
            1,
            Duration::from_millis(1),
            "invalid url",
        ))
        .unwrap_or_else(|e| panic!("{e}"));

        let summary = agg.finalize().unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(summary.iterations_failed, 1);
        assert_eq!(summary.requests_total, 0);
        assert_eq!(summary.latency, LatencySummary::default());
    }

    #[test]
    fn finalize_succeeds_once() {
        let agg = Aggregator::new("t", 1);
        assert!(agg.finalize().is_ok());
        assert!(matches!(agg.finalize(), Err(Error::AlreadyFinalized)));
    }

    #[test]
    fn record_after_finalize_is_rejected() {
        let agg = Aggregator::new("t", 1);
        let _ = agg.finalize();
        let err = agg.record(iteration(1, RequestStatus::Code(200), true));
        assert!(matches!(err, Err(Error::RecordAfterFinalize)));
    }

    #[test]
    fn registered_vus_appear_with_zero_iterations() {
        let agg = Aggregator::new("t", 3);
        for vu in 1..=3 {
            agg.register_vu(vu);
        }
        agg.record(iteration(2, RequestStatus::Code(200), true))
            .unwrap_or_else(|e| panic!("{e}"));

        let summary = agg.finalize().unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(
            summary.iterations_per_vu,
            BTreeMap::from([(1, 0), (2, 1), (3, 0)])
        );
    }

    #[test]
    fn rps_samples_summarize() {
        let agg = Aggregator::new("t", 1);
        for s in [10.0, 20.0, 30.0] {
            agg.record_rps_sample(s);
        }
        agg.record_rps_sample(f64::NAN);

        let summary = agg.finalize().unwrap_or_else(|e| panic!("{e}"));
        assert!((summary.req_per_sec_avg - 20.0).abs() < 1e-9);
        assert!((summary.req_per_sec_stdev - 10.0).abs() < 1e-9);
        assert!((summary.req_per_sec_max - 30.0).abs() < 1e-9);
    }
}
