#![forbid(unsafe_code)]

mod aggregator;
mod config;
mod error;
mod executor;
mod gate;
mod progress;
mod scenario;
mod scheduler;
mod summary;
mod vu;

pub use aggregator::Aggregator;
pub use config::{
    DEFAULT_REQUEST_TIMEOUT, RunConfig, ScenarioConfig, ScenarioOptions, scenario_from_options,
};
pub use error::{Error, Result};
pub use executor::{CheckResult, Executor, IterationResult, RequestOutcome, RequestStatus};
pub use gate::IterationGate;
pub use progress::{ProgressFn, ProgressUpdate};
pub use scenario::{Check, CheckPredicate, ResponsePredicate, Scenario, StaticScenario, Step};
pub use scheduler::{run_scenario, run_scenario_with_client};
pub use summary::{CheckSummary, LatencySummary, RunSummary};

pub use http::Method;
pub use loadr_http::{HttpClient, HttpRequest, HttpResponse, HttpTransportErrorKind};
