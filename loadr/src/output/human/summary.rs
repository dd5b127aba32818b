use std::fmt::Write as _;

use loadr_core::{LatencySummary, RequestStatus, RunSummary};

use super::format::*;

pub(crate) fn render(summary: &RunSummary) -> String {
    let mut out = String::new();

    writeln!(
        &mut out,
        "summary: {} ({} vus, {})",
        summary.scenario,
        summary.vus,
        format_latency(summary.run_duration)
    )
    .ok();

    writeln!(
        &mut out,
        "  iterations: {} (failed {})",
        summary.iterations_total, summary.iterations_failed
    )
    .ok();
    let per_vu_min = summary.iterations_per_vu.values().min().copied().unwrap_or(0);
    let per_vu_max = summary.iterations_per_vu.values().max().copied().unwrap_or(0);
    writeln!(
        &mut out,
        "    per vu: min {per_vu_min} max {per_vu_max} ({} vus)",
        summary.iterations_per_vu.len()
    )
    .ok();

    writeln!(
        &mut out,
        "  requests: {} (network errors {})",
        summary.requests_total,
        summary.network_errors()
    )
    .ok();
    for (status, count) in &summary.status_counts {
        match status {
            RequestStatus::Code(code) => writeln!(&mut out, "    status {code}: {count}").ok(),
            RequestStatus::Error(kind) => writeln!(&mut out, "    error ({kind}): {count}").ok(),
        };
    }

    if summary.checks_total > 0 {
        writeln!(
            &mut out,
            "  checks: {} passed, {} failed ({} failed)",
            summary.checks_passed,
            summary.checks_failed,
            format_pct(summary.checks_failed, summary.checks_total)
        )
        .ok();
        for c in &summary.checks_by_name {
            let mark = if c.failed == 0 { "ok  " } else { "FAIL" };
            writeln!(
                &mut out,
                "    {mark} {}: {}/{} passed",
                c.name,
                c.passed,
                c.total()
            )
            .ok();
        }
    }

    render_latency("latency", &summary.latency, &mut out);
    render_latency("iteration", &summary.iteration_duration, &mut out);

    writeln!(
        &mut out,
        "  bytes: recv {} sent {}",
        format_bytes(summary.bytes_received_total),
        format_bytes(summary.bytes_sent_total)
    )
    .ok();
    writeln!(
        &mut out,
        "  rates: rps={} (per-second avg={} stdev={} max={})",
        format_rate(summary.rps),
        format_rate(summary.req_per_sec_avg),
        format_rate(summary.req_per_sec_stdev),
        format_rate(summary.req_per_sec_max)
    )
    .ok();

    out
}

fn render_latency(label: &str, h: &LatencySummary, out: &mut String) {
    if h.count == 0 {
        writeln!(out, "  {label}: n/a").ok();
        return;
    }

    writeln!(
        out,
        "  {label}: min={} mean={} stdev={} p50={} p90={} p95={} p99={} max={} (n={})",
        format_latency(h.min),
        format_latency(h.mean),
        format_latency(h.stdev),
        format_latency(h.p50),
        format_latency(h.p90),
        format_latency(h.p95),
        format_latency(h.p99),
        format_latency(h.max),
        h.count
    )
    .ok();
}
