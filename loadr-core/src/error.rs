pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("`vus` must be a positive integer")]
    InvalidVus,

    #[error("`duration` must be a positive duration")]
    InvalidDuration,

    #[error("`timeout` must be a positive duration")]
    InvalidTimeout,

    #[error("`iterations` must be a positive integer")]
    InvalidIterations,

    #[error("scenario must issue at least one request")]
    NoRequests,

    #[error("run summary was already finalized")]
    AlreadyFinalized,

    #[error("cannot record an iteration after the run summary was finalized")]
    RecordAfterFinalize,
}

impl Error {
    /// Scenario configuration errors are fatal before any iteration runs.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidVus
                | Self::InvalidDuration
                | Self::InvalidTimeout
                | Self::InvalidIterations
                | Self::NoRequests
        )
    }
}
