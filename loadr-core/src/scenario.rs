//! Scenario definitions: what one iteration of a virtual user does.
//!
//! A [`Scenario`] produces an ordered list of [`Step`]s per iteration. Each step is one HTTP
//! request plus the [`Check`]s evaluated against its response. Scenarios are called from every
//! VU concurrently, so they must not rely on external mutable state.

use std::fmt;
use std::sync::Arc;

use loadr_http::{HttpRequest, HttpResponse};

use super::error::{Error, Result};

pub type ResponsePredicate = Arc<dyn Fn(&HttpResponse) -> bool + Send + Sync + 'static>;

#[derive(Clone)]
pub enum CheckPredicate {
    /// Response status is one of the listed codes.
    StatusIn(Vec<u16>),
    /// Response body (as UTF-8) contains the given text.
    BodyContains(String),
    Custom(ResponsePredicate),
}

impl CheckPredicate {
    #[must_use]
    pub fn evaluate(&self, res: &HttpResponse) -> bool {
        match self {
            Self::StatusIn(codes) => codes.contains(&res.status),
            Self::BodyContains(needle) => res.body_utf8().is_some_and(|b| b.contains(needle)),
            Self::Custom(f) => f(res),
        }
    }
}

impl fmt::Debug for CheckPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StatusIn(codes) => f.debug_tuple("StatusIn").field(codes).finish(),
            Self::BodyContains(needle) => f.debug_tuple("BodyContains").field(needle).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Check {
    pub name: String,
    pub predicate: CheckPredicate,
}

impl Check {
    pub fn new(name: impl Into<String>, predicate: CheckPredicate) -> Self {
        Self {
            name: name.into(),
            predicate,
        }
    }

    pub fn status(name: impl Into<String>, code: u16) -> Self {
        Self::new(name, CheckPredicate::StatusIn(vec![code]))
    }

    pub fn status_in(name: impl Into<String>, codes: impl Into<Vec<u16>>) -> Self {
        Self::new(name, CheckPredicate::StatusIn(codes.into()))
    }

    pub fn body_contains(name: impl Into<String>, needle: impl Into<String>) -> Self {
        Self::new(name, CheckPredicate::BodyContains(needle.into()))
    }

    pub fn custom<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&HttpResponse) -> bool + Send + Sync + 'static,
    {
        Self::new(name, CheckPredicate::Custom(Arc::new(f)))
    }
}

#[derive(Debug, Clone)]
pub struct Step {
    /// Label used in the summary. Defaults to `METHOD url`.
    pub name: Option<String>,
    pub request: HttpRequest,
    pub checks: Vec<Check>,
}

impl Step {
    pub fn new(request: HttpRequest) -> Self {
        Self {
            name: None,
            request,
            checks: Vec::new(),
        }
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{} {}", self.request.method, self.request.url),
        }
    }
}

pub trait Scenario: Send + Sync + 'static {
    /// Builds the steps for one iteration. Called once per iteration by every VU.
    fn steps(&self) -> Vec<Step>;
}

impl<F> Scenario for F
where
    F: Fn() -> Vec<Step> + Send + Sync + 'static,
{
    fn steps(&self) -> Vec<Step> {
        self()
    }
}

/// A scenario that issues the same steps on every iteration.
#[derive(Debug, Clone)]
pub struct StaticScenario {
    steps: Arc<[Step]>,
}

impl StaticScenario {
    pub fn new(steps: Vec<Step>) -> Result<Self> {
        if steps.is_empty() {
            return Err(Error::NoRequests);
        }
        Ok(Self {
            steps: Arc::from(steps),
        })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl Scenario for StaticScenario {
    fn steps(&self) -> Vec<Step> {
        self.steps.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn response(status: u16, body: &'static str) -> HttpResponse {
        HttpResponse {
            status,
            body: Bytes::from_static(body.as_bytes()),
            headers: Vec::new(),
            bytes_sent: 0,
            bytes_received: 0,
        }
    }

    #[test]
    fn status_in_accepts_any_listed_code() {
        let check = Check::status_in("200 or 404", [200, 404]);
        assert!(check.predicate.evaluate(&response(200, "")));
        assert!(check.predicate.evaluate(&response(404, "")));
        assert!(!check.predicate.evaluate(&response(500, "")));
    }

    #[test]
    fn body_contains_and_custom_predicates() {
        let res = response(200, r#"{"answer":"contract law"}"#);
        assert!(Check::body_contains("answer", "contract").predicate.evaluate(&res));
        assert!(!Check::body_contains("answer", "tort").predicate.evaluate(&res));

        let short = Check::custom("short body", |r: &HttpResponse| r.body.len() < 64);
        assert!(short.predicate.evaluate(&res));
    }

    #[test]
    fn static_scenario_requires_a_step() {
        assert!(matches!(StaticScenario::new(Vec::new()), Err(Error::NoRequests)));

        let scenario = StaticScenario::new(vec![Step::new(HttpRequest::get("http://x/"))])
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(scenario.len(), 1);
        assert!(!scenario.is_empty());
        assert_eq!(scenario.steps().len(), 1);
    }

    #[test]
    fn closures_are_scenarios() {
        let scenario = || {
            vec![
                Step::new(HttpRequest::get("http://localhost/a")),
                Step::new(HttpRequest::get("http://localhost/b")).named("b"),
            ]
        };

        let steps = Scenario::steps(&scenario);
        assert_eq!(steps[0].display_name(), "GET http://localhost/a");
        assert_eq!(steps[1].display_name(), "b");
    }
}
