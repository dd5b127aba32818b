use std::time::Duration;

use super::error::{Error, Result};

/// Per-request timeout used when neither the scenario nor the CLI sets one.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Values supplied on the command line. Anything set here wins over the scenario definition.
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    pub vus: Option<u64>,
    pub duration: Option<Duration>,
    pub think_time: Option<Duration>,
    pub request_timeout: Option<Duration>,
    pub iterations: Option<u64>,
}

/// Run shape as written in a scenario definition (all fields optional).
#[derive(Debug, Clone, Default)]
pub struct ScenarioOptions {
    pub name: Option<String>,
    pub vus: Option<u64>,
    pub duration: Option<Duration>,
    pub think_time: Option<Duration>,
    pub request_timeout: Option<Duration>,

    /// Total iterations across all VUs. The run stops at whichever comes first: this cap or
    /// the deadline.
    pub iterations: Option<u64>,
}

/// Validated run shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioConfig {
    pub name: String,
    pub vus: u64,
    pub duration: Duration,
    pub think_time: Duration,
    pub request_timeout: Duration,
    pub iterations: Option<u64>,
}

impl ScenarioConfig {
    pub fn new(vus: u64, duration: Duration) -> Result<Self> {
        let cfg = Self {
            name: "default".to_string(),
            vus,
            duration,
            think_time: Duration::ZERO,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            iterations: None,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_think_time(mut self, think_time: Duration) -> Self {
        self.think_time = think_time;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_iterations(mut self, iterations: u64) -> Self {
        self.iterations = Some(iterations);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.vus == 0 {
            return Err(Error::InvalidVus);
        }
        if self.duration.is_zero() {
            return Err(Error::InvalidDuration);
        }
        if self.request_timeout.is_zero() {
            return Err(Error::InvalidTimeout);
        }
        if self.iterations == Some(0) {
            return Err(Error::InvalidIterations);
        }
        Ok(())
    }
}

/// Merges CLI overrides over scenario options and validates the result.
pub fn scenario_from_options(opts: ScenarioOptions, cfg: RunConfig) -> Result<ScenarioConfig> {
    let vus = cfg.vus.or(opts.vus).unwrap_or(1);
    let duration = cfg
        .duration
        .or(opts.duration)
        .ok_or(Error::InvalidDuration)?;

    let config = ScenarioConfig {
        name: opts.name.unwrap_or_else(|| "default".to_string()),
        vus,
        duration,
        think_time: cfg.think_time.or(opts.think_time).unwrap_or(Duration::ZERO),
        request_timeout: cfg
            .request_timeout
            .or(opts.request_timeout)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
        iterations: cfg.iterations.or(opts.iterations),
    };
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_vus_and_zero_duration() {
        assert!(matches!(
            ScenarioConfig::new(0, Duration::from_secs(1)),
            Err(Error::InvalidVus)
        ));
        assert!(matches!(
            ScenarioConfig::new(1, Duration::ZERO),
            Err(Error::InvalidDuration)
        ));
    }

    #[test]
    fn defaults_fill_missing_options() {
        let opts = ScenarioOptions {
            duration: Some(Duration::from_secs(10)),
            ..ScenarioOptions::default()
        };

        let cfg = scenario_from_options(opts, RunConfig::default())
            .unwrap_or_else(|e| panic!("expected valid config: {e}"));
        assert_eq!(cfg.name, "default");
        assert_eq!(cfg.vus, 1);
        assert_eq!(cfg.think_time, Duration::ZERO);
        assert_eq!(cfg.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(cfg.iterations, None);
    }

    #[test]
    fn missing_duration_is_a_config_error() {
        let err = scenario_from_options(ScenarioOptions::default(), RunConfig::default())
            .err()
            .unwrap_or_else(|| panic!("expected an error"));
        assert!(matches!(err, Error::InvalidDuration));
        assert!(err.is_config_error());
    }

    #[test]
    fn zero_iterations_and_timeout_are_rejected() {
        let base = ScenarioOptions {
            duration: Some(Duration::from_secs(1)),
            ..ScenarioOptions::default()
        };

        let err = scenario_from_options(
            ScenarioOptions {
                iterations: Some(0),
                ..base.clone()
            },
            RunConfig::default(),
        )
        .err();
        assert!(matches!(err, Some(Error::InvalidIterations)));

        let err = scenario_from_options(
            base,
            RunConfig {
                request_timeout: Some(Duration::ZERO),
                ..RunConfig::default()
            },
        )
        .err();
        assert!(matches!(err, Some(Error::InvalidTimeout)));
    }
}
