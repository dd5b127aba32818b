use std::path::Path;
use std::sync::Arc;

use loadr_core::{ProgressFn, ProgressUpdate, RunSummary, ScenarioConfig};

mod format;
mod progress;
mod summary;

use format::{format_elapsed, format_rate};
use progress::HumanProgress;
use summary::render;

pub(crate) struct HumanReadableOutput {
    progress: Option<Arc<HumanProgress>>,
}

impl HumanReadableOutput {
    pub(crate) fn new(config: &ScenarioConfig, quiet: bool) -> Self {
        let progress =
            (!quiet).then(|| Arc::new(HumanProgress::new(&config.name, config.duration)));
        Self { progress }
    }

    pub(crate) fn print_header(&self, path: &Path, config: &ScenarioConfig, steps: usize) {
        println!("scenario: {} ({})", config.name, path.display());
        println!(
            "  vus={} duration={} think_time={:?} timeout={:?} requests/iteration={}{}",
            config.vus,
            format_elapsed(config.duration),
            config.think_time,
            config.request_timeout,
            steps,
            config
                .iterations
                .map(|n| format!(" iterations={n}"))
                .unwrap_or_default()
        );
        println!();
    }

    pub(crate) fn progress(&self) -> Option<ProgressFn> {
        let progress = self.progress.clone()?;

        Some(Arc::new(move |u: ProgressUpdate| {
            let message = format!(
                "elapsed={}/{} vus={} iters={} reqs={} rps={} net_errors={} checks_failed={}",
                format_elapsed(u.elapsed),
                format_elapsed(u.duration),
                u.vus,
                u.iterations_total,
                u.requests_total,
                format_rate(u.rps_now),
                u.requests_failed,
                u.checks_failed_total
            );
            progress.update(u.elapsed, message);
        }))
    }

    pub(crate) fn print_summary(&self, summary: &RunSummary) {
        if let Some(progress) = &self.progress {
            progress.finish();
        }
        print!("{}", render(summary));
    }
}
