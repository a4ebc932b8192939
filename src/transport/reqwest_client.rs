//! Reqwest-backed [`HttpTransport`].
//!
//! Keeps one `reqwest::Client` per egress proxy. All clients share a single
//! cookie jar so cookies picked up by the browser tier (or by any proxy) are
//! replayed on later requests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::HeaderValue;
use http::header::{ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::Client;
use reqwest::cookie::Jar;
use tokio::sync::Mutex;
use url::Url;

use super::{HttpRequest, HttpResponse, HttpTransport, TransportError};

const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

pub struct ReqwestTransport {
    http2: bool,
    timeout: Duration,
    cookies: Arc<Jar>,
    clients: Mutex<HashMap<Option<String>, Client>>,
}

impl ReqwestTransport {
    pub fn new(http2: bool, timeout: Duration) -> Self {
        Self {
            http2,
            timeout,
            cookies: Arc::new(Jar::default()),
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn cookie_jar(&self) -> Arc<Jar> {
        Arc::clone(&self.cookies)
    }

    async fn client(&self, proxy: Option<&str>) -> Result<Client, TransportError> {
        let mut guard = self.clients.lock().await;
        let key = proxy.map(str::to_string);
        if let Some(client) = guard.get(&key) {
            return Ok(client.clone());
        }

        let mut builder = Client::builder()
            .cookie_provider(Arc::clone(&self.cookies))
            .timeout(self.timeout)
            .gzip(true)
            .brotli(true);

        if !self.http2 {
            builder = builder.http1_only();
        }

        builder = match proxy {
            Some(endpoint) => builder.proxy(reqwest::Proxy::all(endpoint).map_err(|err| {
                TransportError::InvalidProxy {
                    proxy: endpoint.to_string(),
                    reason: err.to_string(),
                }
            })?),
            // Ignore HTTP(S)_PROXY from the environment in direct mode.
            None => builder.no_proxy(),
        };

        let client = builder
            .build()
            .map_err(|err| TransportError::Client(err.to_string()))?;
        guard.insert(key, client.clone());
        Ok(client)
    }
}

impl std::fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("http2", &self.http2)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let client = self.client(request.proxy.as_deref()).await?;

        let mut headers = request.headers;
        let user_agent = HeaderValue::from_str(&request.user_agent)
            .map_err(|err| TransportError::Client(format!("invalid user agent: {err}")))?;
        headers.insert(USER_AGENT, user_agent);
        headers
            .entry(ACCEPT_LANGUAGE)
            .or_insert(HeaderValue::from_static(DEFAULT_ACCEPT_LANGUAGE));

        let response = client
            .get(request.url.as_str())
            .headers(headers)
            .timeout(request.timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.bytes().await.map_err(map_reqwest_error)?;

        Ok(HttpResponse {
            status,
            headers,
            body,
            url,
        })
    }

    fn add_cookies(&self, url: &Url, cookies: &[String]) {
        for cookie in cookies {
            self.cookies.add_cookie_str(cookie, url);
        }
    }

    async fn shutdown(&self) {
        self.clients.lock().await.clear();
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_body() || err.is_decode() {
        TransportError::Body(err.to_string())
    } else {
        TransportError::Connect(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::cookie::CookieStore;

    #[tokio::test]
    async fn reuses_client_per_proxy() {
        let transport = ReqwestTransport::new(false, Duration::from_secs(5));
        transport.client(None).await.unwrap();
        transport.client(Some("http://127.0.0.1:8080")).await.unwrap();
        transport.client(Some("http://127.0.0.1:8080")).await.unwrap();
        assert_eq!(transport.clients.lock().await.len(), 2);

        transport.shutdown().await;
        assert!(transport.clients.lock().await.is_empty());
    }

    #[tokio::test]
    async fn rejects_malformed_proxy() {
        let transport = ReqwestTransport::new(true, Duration::from_secs(5));
        let err = transport.client(Some("not a proxy url")).await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidProxy { .. }));
    }

    #[test]
    fn browser_cookies_land_in_shared_jar() {
        let transport = ReqwestTransport::new(false, Duration::from_secs(5));
        let url = Url::parse("https://example.com/odds").unwrap();
        transport.add_cookies(&url, &["session=abc; Path=/".to_string()]);
        let header = transport.cookie_jar().cookies(&url).unwrap();
        assert_eq!(header.to_str().unwrap(), "session=abc");
    }
}
