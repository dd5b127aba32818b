use std::fmt;
use std::time::{Duration, Instant};

use loadr_http::{HttpClient, HttpTransportErrorKind};

use super::scenario::{Scenario, Step};

/// Outcome of a single request: either the HTTP status code or the transport failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RequestStatus {
    Code(u16),
    Error(HttpTransportErrorKind),
}

impl RequestStatus {
    /// True when the request never produced an HTTP response.
    pub fn is_network_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn code(&self) -> Option<u16> {
        match self {
            Self::Code(code) => Some(*code),
            Self::Error(_) => None,
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => write!(f, "{code}"),
            Self::Error(_) => f.write_str("error"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub name: String,
    pub method: http::Method,
    pub url: String,
    pub status: RequestStatus,
    pub latency: Duration,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
}

/// Everything one VU observed during one pass over the scenario.
#[derive(Debug, Clone)]
pub struct IterationResult {
    pub vu_id: u64,
    pub requests: Vec<RequestOutcome>,
    pub checks: Vec<CheckResult>,
    pub duration: Duration,
    /// Set when the iteration stopped before running all of its steps.
    pub error: Option<String>,
}

impl IterationResult {
    pub(crate) fn aborted(vu_id: u64, duration: Duration, error: impl Into<String>) -> Self {
        Self {
            vu_id,
            requests: Vec::new(),
            checks: Vec::new(),
            duration,
            error: Some(error.into()),
        }
    }

    /// An iteration fails on a network error or when it was aborted.
    /// Failed checks alone do not fail an iteration.
    pub fn is_failed(&self) -> bool {
        self.error.is_some() || self.requests.iter().any(|r| r.status.is_network_error())
    }

    pub fn checks_failed(&self) -> usize {
        self.checks.iter().filter(|c| !c.passed).count()
    }
}

/// Runs scenario iterations against a shared HTTP client.
#[derive(Debug, Clone)]
pub struct Executor {
    client: HttpClient,
    request_timeout: Duration,
}

impl Executor {
    pub fn new(client: HttpClient, request_timeout: Duration) -> Self {
        Self {
            client,
            request_timeout,
        }
    }

    /// Executes every step of `scenario` once, in order.
    ///
    /// Never fails: transport errors are recorded as [`RequestStatus::Error`] and the remaining
    /// steps still run. A request that cannot be built at all (bad URL, bad header) ends the
    /// iteration and is reported through [`IterationResult::error`].
    pub async fn run_iteration(&self, vu_id: u64, scenario: &dyn Scenario) -> IterationResult {
        let started = Instant::now();
        let steps = scenario.steps();

        let mut requests = Vec::with_capacity(steps.len());
        let mut checks = Vec::new();
        let mut error = None;

        for step in steps {
            match self.run_step(step, &mut checks).await {
                Ok(outcome) => requests.push(outcome),
                Err(err) => {
                    error = Some(err);
                    break;
                }
            }
        }

        IterationResult {
            vu_id,
            requests,
            checks,
            duration: started.elapsed(),
            error,
        }
    }

    async fn run_step(
        &self,
        step: Step,
        checks: &mut Vec<CheckResult>,
    ) -> std::result::Result<RequestOutcome, String> {
        let name = step.display_name();
        let Step {
            request,
            checks: step_checks,
            ..
        } = step;

        let method = request.method.clone();
        let url = request.url.clone();
        let request = match request.timeout {
            Some(_) => request,
            None => request.with_timeout(self.request_timeout),
        };

        let started = Instant::now();
        let res = self.client.send(request).await;
        let latency = started.elapsed();

        match res {
            Ok(res) => {
                for check in &step_checks {
                    checks.push(CheckResult {
                        name: check.name.clone(),
                        passed: check.predicate.evaluate(&res),
                    });
                }

                Ok(RequestOutcome {
                    name,
                    method,
                    url,
                    status: RequestStatus::Code(res.status),
                    latency,
                    bytes_sent: res.bytes_sent,
                    bytes_received: res.bytes_received,
                })
            }
            Err(failure) => {
                let Some(kind) = failure.error.transport_error_kind() else {
                    return Err(format!("{name}: {}", failure.error));
                };

                tracing::debug!(%url, error = %failure.error, kind = %kind, "request failed");
                // Without a response nothing can pass.
                for check in &step_checks {
                    checks.push(CheckResult {
                        name: check.name.clone(),
                        passed: false,
                    });
                }

                Ok(RequestOutcome {
                    name,
                    method,
                    url,
                    status: RequestStatus::Error(kind),
                    latency,
                    bytes_sent: failure.bytes_sent,
                    bytes_received: 0,
                })
            }
        }
    }
}
