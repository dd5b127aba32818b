//! HTTP/1.1 wire-size accounting.
//!
//! Sizes are computed from the request and response heads as hyper sees them, so the `Host` and
//! `Content-Length` headers the client adds are counted like any other header.

use http::HeaderMap;

const CRLF: u64 = 2;

/// Request line, headers, blank line and body.
pub(super) fn request_bytes(parts: &http::request::Parts, body_len: u64) -> u64 {
    let target = parts
        .uri
        .path_and_query()
        .map_or("/", |p| p.as_str());

    // "METHOD SP target SP HTTP/1.1 CRLF"
    let line =
        len(parts.method.as_str()) + 1 + len(target) + 1 + len(version(parts.version)) + CRLF;

    line.saturating_add(headers_bytes(&parts.headers))
        .saturating_add(CRLF)
        .saturating_add(body_len)
}

/// Status line, headers and blank line. The body is counted by the caller once it is read.
pub(super) fn response_head_bytes(parts: &http::response::Parts) -> u64 {
    // "HTTP/1.1 SP 200 SP reason CRLF"
    let reason = parts
        .status
        .canonical_reason()
        .map_or(0, |r| 1 + len(r));
    let line = len(version(parts.version)) + 1 + len(parts.status.as_str()) + reason + CRLF;

    line.saturating_add(headers_bytes(&parts.headers))
        .saturating_add(CRLF)
}

fn headers_bytes(headers: &HeaderMap) -> u64 {
    headers
        .iter()
        // "name: value CRLF"
        .map(|(name, value)| len(name.as_str()) + 2 + value.len() as u64 + CRLF)
        .fold(0u64, u64::saturating_add)
}

fn version(v: http::Version) -> &'static str {
    match v {
        http::Version::HTTP_09 => "HTTP/0.9",
        http::Version::HTTP_10 => "HTTP/1.0",
        _ => "HTTP/1.1",
    }
}

fn len(s: &str) -> u64 {
    s.len() as u64
}
