use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure class recorded in place of a status code when a request never got a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum HttpTransportErrorKind {
    Connect,
    Request,
    Timeout,
    BodyRead,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("only http:// and https:// URLs are supported: {0}")]
    UnsupportedScheme(String),

    #[error("http request build failed: {0}")]
    RequestBuild(#[from] http::Error),

    #[error("invalid http header name: {0}")]
    HeaderName(#[from] http::header::InvalidHeaderName),

    #[error("invalid http header value: {0}")]
    HeaderValue(#[from] http::header::InvalidHeaderValue),

    #[error("http request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    #[error("http request timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to read response body: {0}")]
    BodyRead(#[from] hyper::Error),
}

impl Error {
    /// Returns the transport failure kind, or `None` when the request could not even be built.
    #[must_use]
    pub fn transport_error_kind(&self) -> Option<HttpTransportErrorKind> {
        match self {
            Self::InvalidUrl(_)
            | Self::UnsupportedScheme(_)
            | Self::RequestBuild(_)
            | Self::HeaderName(_)
            | Self::HeaderValue(_) => None,
            Self::Request(err) if err.is_connect() => Some(HttpTransportErrorKind::Connect),
            Self::Request(_) => Some(HttpTransportErrorKind::Request),
            Self::Timeout(_) => Some(HttpTransportErrorKind::Timeout),
            Self::BodyRead(_) => Some(HttpTransportErrorKind::BodyRead),
        }
    }

    #[must_use]
    pub fn is_transport(&self) -> bool {
        self.transport_error_kind().is_some()
    }
}

/// A failed [`HttpClient::send`](crate::HttpClient::send), with the request bytes that were
/// written before it failed.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct SendError {
    #[source]
    pub error: Error,
    /// Zero when the request could not be built or no connection was established.
    pub bytes_sent: u64,
}
