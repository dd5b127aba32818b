use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Same grammar as durations in scenario files: a `humantime` duration (`1m30s`, `250ms`), or a
/// bare number of seconds.
fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
        return s
            .parse()
            .map(Duration::from_secs)
            .map_err(|_| format!("duration '{s}' is too large"));
    }

    humantime::parse_duration(s).map_err(|err| {
        format!("invalid duration '{s}': {err} (expected e.g. 10s, 250ms, 1m30s)")
    })
}

#[derive(Debug, Parser)]
#[command(
    name = "loadr",
    author,
    version,
    about = "Minimal HTTP load generator",
    long_about = "loadr runs a scenario (an ordered list of HTTP requests with checks) with a fixed pool of virtual users for a bounded duration, then prints a summary.\n\nScenarios are YAML files. `${VAR}` placeholders in URLs, headers and bodies are filled from the process environment; use `--env KEY=VALUE` to add/override values.",
    after_help = "Examples:\n  loadr run demos/chat_query.yaml --env BASE_URL=http://localhost:8080\n  loadr run demos/quiz_categories.yaml --vus 50 --duration 30s\n  loadr validate demos/chat_query.yaml"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a scenario file
    #[command(long_about = "Run a scenario file.\n\nCLI flags override values from the file.")]
    Run(RunArgs),

    /// Load and validate a scenario file without sending any requests
    Validate(ValidateArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to the scenario (.yaml)
    pub scenario: PathBuf,

    /// Number of virtual users
    #[arg(long)]
    pub vus: Option<u64>,

    /// Test duration (e.g. 10s, 250ms, 1m30s)
    #[arg(long, value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Pause between iterations of one virtual user (e.g. 1s)
    #[arg(long, value_parser = parse_duration)]
    pub think_time: Option<Duration>,

    /// Per-request timeout (e.g. 60s)
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// Stop after this many iterations in total, even if the duration has not elapsed
    #[arg(long)]
    pub iterations: Option<u64>,

    /// Add/override env vars used for `${VAR}` substitution (repeatable, KEY=VALUE).
    /// CLI-provided vars override the current process env.
    #[arg(long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Disable the live progress bar
    #[arg(long, short)]
    pub quiet: bool,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Path to the scenario (.yaml)
    pub scenario: PathBuf,

    /// Add/override env vars used for `${VAR}` substitution (repeatable, KEY=VALUE).
    #[arg(long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,
}
