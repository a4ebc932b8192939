//! HTTP transport seam.
//!
//! The engine talks to origins through [`HttpTransport`] so the retry and
//! tier logic can be driven by scripted transports in tests. The production
//! implementation is [`ReqwestTransport`].

mod reqwest_client;

pub use reqwest_client::ReqwestTransport;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::HeaderMap;
use http::header::CONTENT_TYPE;
use thiserror::Error;
use url::Url;

use crate::modules::retry::AttemptError;

/// A single GET issued by one attempt.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: Url,
    pub proxy: Option<String>,
    pub user_agent: String,
    pub headers: HeaderMap,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub url: Url,
}

impl HttpResponse {
    pub fn new(status: u16, headers: HeaderMap, body: impl Into<Bytes>, url: Url) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
            url,
        }
    }

    pub fn content_type(&self) -> Option<String> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_ascii_lowercase)
    }

    /// `application/json` or any `+json` media type.
    pub fn is_json(&self) -> bool {
        self.content_type().is_some_and(|ctype| {
            let media = ctype.split(';').next().unwrap_or("").trim();
            media == "application/json" || media.ends_with("+json")
        })
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request timed out")]
    Timeout,
    #[error("invalid proxy {proxy}: {reason}")]
    InvalidProxy { proxy: String, reason: String },
    #[error("failed to read response body: {0}")]
    Body(String),
    #[error("http client could not be built: {0}")]
    Client(String),
}

impl From<TransportError> for AttemptError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Client(reason) => AttemptError::NonRetryable(reason),
            err @ TransportError::InvalidProxy { .. } => AttemptError::NonRetryable(err.to_string()),
            other => AttemptError::Transient(other.to_string()),
        }
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;

    /// Stores `Set-Cookie` style strings for `url` in the shared cookie jar.
    fn add_cookies(&self, _url: &Url, _cookies: &[String]) {}

    /// Drops pooled connections.
    async fn shutdown(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn response(ctype: &'static str) -> HttpResponse {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(ctype));
        HttpResponse::new(
            200,
            headers,
            "{}",
            Url::parse("https://example.com").unwrap(),
        )
    }

    #[test]
    fn json_content_types() {
        assert!(response("application/json").is_json());
        assert!(response("Application/JSON; charset=utf-8").is_json());
        assert!(response("application/vnd.odds+json").is_json());
        assert!(!response("text/html").is_json());
    }

    #[test]
    fn client_build_failures_are_not_retried() {
        let err: AttemptError = TransportError::Client("tls".into()).into();
        assert!(!err.is_retryable());
        let err: AttemptError = TransportError::Timeout.into();
        assert!(err.is_retryable());
        let err: AttemptError = TransportError::InvalidProxy {
            proxy: "::bad::".into(),
            reason: "relative URL without a base".into(),
        }
        .into();
        assert!(!err.is_retryable());
    }
}
