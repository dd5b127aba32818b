use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context as _;

use crate::cli::{RunArgs, ValidateArgs};
use crate::exit_codes::ExitCode;
use crate::output::HumanReadableOutput;
use crate::run_error::RunError;
use crate::scenario_yaml::load_scenario_from_yaml;

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let env = merged_env(&args.env).map_err(RunError::InvalidInput)?;
    let loaded = load_scenario_from_yaml(&args.scenario, &env)
        .await
        .map_err(RunError::InvalidInput)?;

    let steps = loaded.scenario.len();
    let config = loadr_core::scenario_from_options(loaded.options, run_config(&args))
        .map_err(RunError::from_core)?;

    let out = HumanReadableOutput::new(&config, args.quiet);
    out.print_header(&args.scenario, &config, steps);

    let summary = loadr_core::run_scenario(config, Arc::new(loaded.scenario), out.progress())
        .await
        .map_err(RunError::from_core)?;

    out.print_summary(&summary);

    if summary.network_errors() > 0 {
        tracing::warn!(
            network_errors = summary.network_errors(),
            requests = summary.requests_total,
            "some requests never got a response"
        );
    }

    Ok(ExitCode::Success)
}

pub async fn validate(args: ValidateArgs) -> Result<ExitCode, RunError> {
    let env = merged_env(&args.env).map_err(RunError::InvalidInput)?;
    let loaded = load_scenario_from_yaml(&args.scenario, &env)
        .await
        .map_err(RunError::InvalidInput)?;

    let steps = loaded.scenario.len();
    let config =
        loadr_core::scenario_from_options(loaded.options, loadr_core::RunConfig::default())
            .map_err(RunError::from_core)?;

    println!(
        "ok: {} ({} vus, {:?}, {} request{} per iteration)",
        config.name,
        config.vus,
        config.duration,
        steps,
        if steps == 1 { "" } else { "s" }
    );

    Ok(ExitCode::Success)
}

fn run_config(args: &RunArgs) -> loadr_core::RunConfig {
    loadr_core::RunConfig {
        vus: args.vus,
        duration: args.duration,
        think_time: args.think_time,
        request_timeout: args.timeout,
        iterations: args.iterations,
    }
}

/// Process environment overlaid with `--env KEY=VALUE` pairs.
fn merged_env(overrides: &[String]) -> anyhow::Result<BTreeMap<String, String>> {
    // Non-UTF-8 variables cannot appear in a scenario file, so they are skipped.
    let mut map: BTreeMap<String, String> = std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect();

    for raw in overrides {
        let (k, v) = parse_env_override(raw)?;
        map.insert(k, v);
    }

    Ok(map)
}

fn parse_env_override(s: &str) -> anyhow::Result<(String, String)> {
    let (k, v) = s
        .split_once('=')
        .with_context(|| format!("invalid --env (expected KEY=VALUE): {s}"))?;
    if k.is_empty() {
        anyhow::bail!("invalid --env (empty KEY): {s}");
    }
    Ok((k.to_string(), v.to_string()))
}
