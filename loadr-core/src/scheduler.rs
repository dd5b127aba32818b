use std::sync::Arc;
use std::time::{Duration, Instant};

use loadr_http::HttpClient;
use tokio::sync::Barrier;
use tokio::time::MissedTickBehavior;

use super::aggregator::Aggregator;
use super::config::ScenarioConfig;
use super::error::Result;
use super::executor::Executor;
use super::gate::IterationGate;
use super::progress::{ProgressFn, ProgressUpdate};
use super::scenario::Scenario;
use super::summary::RunSummary;
use super::vu::{StartSignal, VuContext, run_vu};

const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Runs `scenario` with a fixed pool of `config.vus` virtual users until `config.duration` has
/// elapsed (or the iteration cap is reached) and returns the finalized summary.
pub async fn run_scenario(
    config: ScenarioConfig,
    scenario: Arc<dyn Scenario>,
    progress: Option<ProgressFn>,
) -> Result<RunSummary> {
    run_scenario_with_client(config, HttpClient::default(), scenario, progress).await
}

/// Like [`run_scenario`], with a caller-provided HTTP client (connection pool shared by all VUs).
pub async fn run_scenario_with_client(
    config: ScenarioConfig,
    client: HttpClient,
    scenario: Arc<dyn Scenario>,
    progress: Option<ProgressFn>,
) -> Result<RunSummary> {
    config.validate()?;

    let executor = Executor::new(client, config.request_timeout);
    let aggregator = Arc::new(Aggregator::new(config.name.clone(), config.vus));
    let gate = Arc::new(IterationGate::new(config.duration, config.iterations));

    let vus = usize::try_from(config.vus).unwrap_or(usize::MAX);
    let ready_barrier = Arc::new(Barrier::new(vus.saturating_add(1)));
    let start_signal = Arc::new(StartSignal::new());

    tracing::info!(
        scenario = %config.name,
        vus = config.vus,
        duration = ?config.duration,
        think_time = ?config.think_time,
        "starting run"
    );

    let mut handles = Vec::with_capacity(vus);
    for vu_id in 1..=config.vus {
        aggregator.register_vu(vu_id);

        let ctx = VuContext {
            vu_id,
            scenario: scenario.clone(),
            executor: executor.clone(),
            aggregator: aggregator.clone(),
            gate: gate.clone(),
            think_time: config.think_time,
            ready_barrier: ready_barrier.clone(),
            start_signal: start_signal.clone(),
        };
        handles.push(tokio::spawn(run_vu(ctx)));
    }

    // Every VU task is spawned and parked before the clock starts.
    ready_barrier.wait().await;

    let started = Instant::now();
    gate.start_at(started);
    aggregator.mark_started(started);
    start_signal.start();

    let ticker = tokio::spawn(progress_loop(
        started,
        config.duration,
        config.vus,
        aggregator.clone(),
        progress,
    ));

    let mut lost = 0u64;
    for h in handles {
        if let Err(err) = h.await {
            lost = lost.saturating_add(1);
            tracing::warn!(error = %err, "virtual user task failed");
        }
    }

    ticker.abort();
    let _ = ticker.await;

    let summary = aggregator.finalize()?;
    tracing::info!(
        iterations = summary.iterations_total,
        requests = summary.requests_total,
        elapsed = ?summary.run_duration,
        lost_vus = lost,
        "run finished"
    );

    Ok(summary)
}

async fn progress_loop(
    started: Instant,
    duration: Duration,
    vus: u64,
    aggregator: Arc<Aggregator>,
    progress: Option<ProgressFn>,
) {
    // First tick one period after start so the first sample covers a full interval.
    let first = tokio::time::Instant::from_std(started) + PROGRESS_INTERVAL;
    let mut interval = tokio::time::interval_at(first, PROGRESS_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut tick: u64 = 0;
    let mut last_at = started;
    let mut last_requests_total = 0u64;

    loop {
        interval.tick().await;

        tick = tick.saturating_add(1);
        let now = Instant::now();
        let dt = now.duration_since(last_at);
        last_at = now;

        let requests_total = aggregator.requests_total();
        let delta = requests_total.saturating_sub(last_requests_total);
        last_requests_total = requests_total;
        let rps_now = (delta as f64) / dt.as_secs_f64().max(1e-9);

        aggregator.record_rps_sample(rps_now);

        if let Some(progress) = &progress {
            (progress)(ProgressUpdate {
                tick,
                elapsed: started.elapsed(),
                duration,
                vus,
                iterations_total: aggregator.iterations_total(),
                requests_total,
                requests_failed: aggregator.requests_failed(),
                checks_failed_total: aggregator.checks_failed(),
                rps_now,
            });
        }
    }
}
