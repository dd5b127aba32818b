use bytes::Bytes;
use http_body_util::{BodyExt as _, Full};
use hyper::Request;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use std::collections::BTreeMap;
use std::time::Duration;

use super::estimate::{request_bytes, response_head_bytes};
use super::util::{has_header, host_header_value, is_supported_scheme};
use super::{Error, HttpRequest, HttpResponse, HttpTransportErrorKind, Result, SendError};

/// Pooled HTTP/1.1 client shared by all virtual users of a run.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
}

impl Default for HttpClient {
    fn default() -> Self {
        // The OS-level TCP connect timeout can be tens of seconds; an unreachable target
        // should surface as a connect error quickly instead.
        Self::new(Some(Duration::from_secs(3)))
    }
}

impl HttpClient {
    #[must_use]
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false);
        http_connector.set_connect_timeout(connect_timeout);

        let https_connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let inner = Client::builder(TokioExecutor::new()).build(https_connector);

        Self { inner }
    }

    /// Sends one request and reads the whole response body.
    pub async fn request(&self, req: HttpRequest) -> Result<HttpResponse> {
        self.send(req).await.map_err(|failure| failure.error)
    }

    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.request(HttpRequest::get(url)).await
    }

    /// Like [`HttpClient::request`], but a failure also reports the request bytes written.
    ///
    /// `req.timeout` bounds the full exchange: connect, response head, and body.
    pub async fn send(&self, req: HttpRequest) -> std::result::Result<HttpResponse, SendError> {
        let timeout = req.timeout;
        let (request, bytes_sent) = prepare(req).map_err(|error| SendError {
            error,
            bytes_sent: 0,
        })?;

        let exchange = self.exchange(request, bytes_sent);
        let res = match timeout {
            Some(timeout) => tokio::time::timeout(timeout, exchange)
                .await
                .unwrap_or_else(|_| Err(Error::Timeout(timeout))),
            None => exchange.await,
        };

        res.map_err(|error| {
            let bytes_sent = match error.transport_error_kind() {
                Some(HttpTransportErrorKind::Connect) => 0,
                _ => bytes_sent,
            };
            SendError { error, bytes_sent }
        })
    }

    async fn exchange(&self, req: Request<Full<Bytes>>, bytes_sent: u64) -> Result<HttpResponse> {
        tracing::trace!(method = %req.method(), uri = %req.uri(), "sending request");
        let res = self.inner.request(req).await?;

        let (parts, body) = res.into_parts();
        let status = parts.status.as_u16();
        let head_bytes = response_head_bytes(&parts);
        let headers = merge_headers(&parts.headers);

        let body = body.collect().await?.to_bytes();
        let bytes_received = head_bytes.saturating_add(body.len() as u64);

        Ok(HttpResponse {
            status,
            body,
            headers,
            bytes_sent,
            bytes_received,
        })
    }
}

/// Validates `req` and turns it into a hyper request plus its size on the wire.
fn prepare(req: HttpRequest) -> Result<(Request<Full<Bytes>>, u64)> {
    let parsed = url::Url::parse(&req.url).map_err(|_| Error::InvalidUrl(req.url.clone()))?;
    if !is_supported_scheme(&parsed) {
        return Err(Error::UnsupportedScheme(req.url));
    }
    let uri: hyper::Uri = req
        .url
        .parse()
        .map_err(|_| Error::InvalidUrl(req.url.clone()))?;

    let body = req.body.unwrap_or_default();
    let body_len = body.len() as u64;

    let mut builder = Request::builder().method(req.method).uri(uri);

    // Host and Content-Length are made explicit so byte accounting stays deterministic.
    if !has_header(&req.headers, "host")
        && let Some(host) = host_header_value(&parsed)
    {
        builder = builder.header(http::header::HOST, host);
    }
    if body_len != 0 && !has_header(&req.headers, "content-length") {
        builder = builder.header(http::header::CONTENT_LENGTH, body_len);
    }

    for (k, v) in req.headers {
        let name = http::header::HeaderName::from_bytes(k.as_bytes())?;
        let value = http::header::HeaderValue::from_str(&v)?;
        builder = builder.header(name, value);
    }

    let (parts, body) = builder.body(Full::new(body))?.into_parts();
    let bytes_sent = request_bytes(&parts, body_len);

    Ok((Request::from_parts(parts, body), bytes_sent))
}

/// Lowercased names; repeated headers are joined with ", ".
fn merge_headers(headers: &http::HeaderMap) -> Vec<(String, String)> {
    let mut merged: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let v = String::from_utf8_lossy(value.as_bytes()).to_string();
        merged
            .entry(name.as_str().to_ascii_lowercase())
            .and_modify(|cur| {
                if !cur.is_empty() {
                    cur.push_str(", ");
                }
                cur.push_str(&v);
            })
            .or_insert(v);
    }
    merged.into_iter().collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn unreachable_host_fails_fast_with_connect_timeout() {
        let client = HttpClient::new(Some(Duration::from_millis(200)));
        let req = HttpRequest::get("http://192.0.2.1:81/");

        let started = Instant::now();
        let err = client.request(req).await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(err.is_transport(), "unexpected error: {err}");
        assert!(
            elapsed < Duration::from_secs(2),
            "expected fast failure, elapsed={elapsed:?}"
        );
    }

    #[tokio::test]
    async fn refused_connection_is_a_connect_error() {
        // Bind then drop to get a local port with nothing listening on it.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let client = HttpClient::default();
        let err = client
            .get(&format!("http://127.0.0.1:{port}/"))
            .await
            .unwrap_err();

        assert_eq!(
            err.transport_error_kind(),
            Some(HttpTransportErrorKind::Connect)
        );
    }

    #[tokio::test]
    async fn refused_connection_reports_no_bytes_sent() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let req = HttpRequest::post(format!("http://127.0.0.1:{port}/echo"), "ping");
        let failure = HttpClient::default().send(req).await.unwrap_err();

        assert_eq!(
            failure.error.transport_error_kind(),
            Some(HttpTransportErrorKind::Connect)
        );
        assert_eq!(failure.bytes_sent, 0);
    }

    #[test]
    fn prepare_counts_implicit_headers() {
        let (req, bytes_sent) =
            prepare(HttpRequest::post("http://localhost:8080/echo", "ping")).unwrap();

        assert_eq!(req.headers()[http::header::HOST], "localhost:8080");
        assert_eq!(req.headers()[http::header::CONTENT_LENGTH], "4");
        let expected = "POST /echo HTTP/1.1\r\n".len()
            + "host: localhost:8080\r\n".len()
            + "content-length: 4\r\n".len()
            + 2
            + 4;
        assert_eq!(bytes_sent, expected as u64);
    }

    #[test]
    fn prepare_rejects_unsupported_scheme() {
        let err = prepare(HttpRequest::get("ftp://localhost/file")).unwrap_err();
        assert!(matches!(err, Error::UnsupportedScheme(_)));
    }

    #[tokio::test]
    async fn invalid_header_name_is_not_sent() {
        let client = HttpClient::default();
        let req = HttpRequest::get("http://127.0.0.1:9/").with_header("bad header", "x");

        let err = client.request(req).await.unwrap_err();
        assert!(matches!(err, Error::HeaderName(_)));
    }
}
