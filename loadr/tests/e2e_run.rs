use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::Context as _;
use loadr_testserver::TestServer;

fn status_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures/scenario_yaml")
        .join(name)
}

fn scenario_file(yaml: &str) -> anyhow::Result<tempfile::NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .context("create temp scenario")?;
    file.write_all(yaml.as_bytes())
        .context("write temp scenario")?;
    Ok(file)
}

async fn run_loadr(args: Vec<String>) -> anyhow::Result<Output> {
    let exe = env!("CARGO_BIN_EXE_loadr");

    tokio::task::spawn_blocking(move || Command::new(exe).args(&args).output())
        .await
        .context("spawn_blocking join")?
        .context("run loadr binary")
}

fn ensure_success(out: &Output) -> anyhow::Result<String> {
    let stdout = String::from_utf8_lossy(&out.stdout).to_string();
    anyhow::ensure!(
        status_code(out.status) == 0,
        "expected exit code 0, got {}\nstdout:\n{}\nstderr:\n{}",
        status_code(out.status),
        stdout,
        String::from_utf8_lossy(&out.stderr)
    );
    Ok(stdout)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn chat_query_scenario_runs_against_server() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;

    let out = run_loadr(vec![
        "run".to_string(),
        fixture("chat_query.yaml").display().to_string(),
        "--vus".to_string(),
        "2".to_string(),
        "--duration".to_string(),
        "1s".to_string(),
        "--think-time".to_string(),
        "100ms".to_string(),
        "--quiet".to_string(),
        "--env".to_string(),
        format!("BASE_URL={}", server.base_url()),
    ])
    .await?;

    let stdout = ensure_success(&out)?;
    anyhow::ensure!(stdout.contains("summary: chat-query (2 vus"), "stdout:\n{stdout}");
    anyhow::ensure!(stdout.contains("(failed 0)"), "stdout:\n{stdout}");
    anyhow::ensure!(stdout.contains("(network errors 0)"), "stdout:\n{stdout}");
    anyhow::ensure!(stdout.contains("status 200:"), "stdout:\n{stdout}");
    anyhow::ensure!(stdout.contains("ok   status was 200"), "stdout:\n{stdout}");
    anyhow::ensure!(server.stats().chat_queries() > 0);
    anyhow::ensure!(server.stats().saw_json_content_type() == server.stats().chat_queries());

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_checks_still_exit_0() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;
    let file = scenario_file(
        r#"
name: always-404
requests:
  - url: ${BASE_URL}/status/404
    checks:
      - name: status was 200
        status: 200
"#,
    )?;

    let out = run_loadr(vec![
        "run".to_string(),
        file.path().display().to_string(),
        "--duration".to_string(),
        "500ms".to_string(),
        "--quiet".to_string(),
        "--env".to_string(),
        format!("BASE_URL={}", server.base_url()),
    ])
    .await?;

    let stdout = ensure_success(&out)?;
    anyhow::ensure!(stdout.contains("FAIL status was 200: 0/"), "stdout:\n{stdout}");
    anyhow::ensure!(stdout.contains("(100.00% failed)"), "stdout:\n{stdout}");
    anyhow::ensure!(stdout.contains("(failed 0)"), "stdout:\n{stdout}");

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn unreachable_target_still_exits_0() -> anyhow::Result<()> {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        listener.local_addr()?.port()
    };
    let file = scenario_file(&format!(
        r#"
name: unreachable
vus: 2
duration: 500ms
thinkTime: 50ms
requests:
  - url: http://127.0.0.1:{port}/
    checks:
      - status: 200
"#
    ))?;

    let out = run_loadr(vec![
        "run".to_string(),
        file.path().display().to_string(),
        "--quiet".to_string(),
    ])
    .await?;

    let stdout = ensure_success(&out)?;
    anyhow::ensure!(stdout.contains("error (connect):"), "stdout:\n{stdout}");
    anyhow::ensure!(!stdout.contains("(network errors 0)"), "stdout:\n{stdout}");

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn quiz_demo_runs_with_cli_duration_and_iteration_cap() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;
    let demo = Path::new(env!("CARGO_MANIFEST_DIR")).join("../demos/quiz_categories.yaml");

    let out = run_loadr(vec![
        "run".to_string(),
        demo.display().to_string(),
        "--duration".to_string(),
        "1m30s".to_string(),
        "--iterations".to_string(),
        "3".to_string(),
        "--quiet".to_string(),
        "--env".to_string(),
        format!("BASE_URL={}", server.base_url()),
    ])
    .await?;

    let stdout = ensure_success(&out)?;
    anyhow::ensure!(stdout.contains("summary: quiz-categories (10 vus"), "stdout:\n{stdout}");
    anyhow::ensure!(stdout.contains("  iterations: 3 (failed 0)"), "stdout:\n{stdout}");
    anyhow::ensure!(stdout.contains("status 200: 3"), "stdout:\n{stdout}");
    anyhow::ensure!(
        stdout.contains("ok   status was 200 or 404: 3/3 passed"),
        "stdout:\n{stdout}"
    );
    anyhow::ensure!(server.stats().requests_total() == 3);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn oversized_duration_in_file_runs_to_iteration_cap() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;
    let file = scenario_file(
        r#"
name: unbounded
vus: 2
duration: 18446744073709551615
thinkTime: 18446744073709551615
iterations: 2
requests:
  - url: ${BASE_URL}/hello
"#,
    )?;

    let out = run_loadr(vec![
        "run".to_string(),
        file.path().display().to_string(),
        "--quiet".to_string(),
        "--env".to_string(),
        format!("BASE_URL={}", server.base_url()),
    ])
    .await?;

    let stdout = ensure_success(&out)?;
    anyhow::ensure!(stdout.contains("  iterations: 2 (failed 0)"), "stdout:\n{stdout}");

    server.shutdown().await;
    Ok(())
}
