//! # oddsfetch-rs
//!
//! A resilient fetch engine for bookmaker odds listings.
//!
//! Every fetch goes through a per-endpoint circuit breaker, a health-tracked
//! proxy pool, a rate limiter and a jittered retry loop, and walks a
//! three-tier chain (JSON API, static HTML, headless browser) until the
//! site-specific parser returns records.
//!
//! ## Features
//!
//! - Proxy pool with failure blacklisting and latency-ordered selection
//! - Per-endpoint circuit breakers with single-trial half-open recovery
//! - Per-instance or shared rate limiting
//! - Retry with exponential backoff, jitter and `Retry-After`
//! - Pooled browser contexts with fingerprint profiles (`chromium` feature)
//! - Event-driven logging and metrics
//!
//! ## Example
//!
//! ```no_run
//! use oddsfetch_rs::{FetchConfig, OddsFetcher, OddsParser, ParseError};
//! use serde_json::Value;
//!
//! struct Matches;
//!
//! impl OddsParser for Matches {
//!     type Record = Value;
//!
//!     fn parse_api(&self, payload: &Value) -> Result<Vec<Value>, ParseError> {
//!         Ok(payload["events"].as_array().cloned().unwrap_or_default())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let fetcher = OddsFetcher::builder()
//!         .with_config(FetchConfig::new("betika", "https://www.betika.com"))
//!         .with_parser(Matches)
//!         .build()?;
//!
//!     let odds = fetcher
//!         .session(|f| async move { f.get_odds(Some("/api/v1/matches"), "/en-ke/s/soccer").await })
//!         .await?;
//!     println!("{} matches", odds.len());
//!     Ok(())
//! }
//! ```

mod oddsfetch;

pub mod browser;
pub mod config;
pub mod external_deps;
pub mod hooks;
pub mod modules;
pub mod orchestrator;
pub mod transport;

pub use crate::oddsfetch::{FetchError, FetchResult, OddsFetcher, OddsFetcherBuilder};

pub use crate::browser::{
    BrowserContextCache,
    BrowserError,
    BrowserPage,
    BrowserRuntime,
    BrowserSession,
    ContextCacheConfig,
    SessionOptions,
};

pub use crate::config::{ConfigError, DEFAULT_ENV_PREFIX, FetchConfig};

pub use crate::external_deps::captcha::{
    CaptchaChallenge,
    CaptchaDetector,
    CaptchaError,
    CaptchaSolver,
    MarkerCaptchaDetector,
    NoopCaptchaSolver,
};

#[cfg(feature = "chromium")]
pub use crate::external_deps::chromium::{ChromiumConfig, ChromiumRuntime};

pub use crate::hooks::{NoPagination, OddsParser, PageSource, Paginator, ParseError, Tier};

pub use crate::modules::{
    AttemptContext,
    AttemptError,
    CachedPayload,
    CircuitBreakerConfig,
    CircuitBreakerRegistry,
    CircuitState,
    EventDispatcher,
    EventHandler,
    FetchEvent,
    FetchMetrics,
    FetchOutcome,
    FingerprintProfile,
    LatencyHistogram,
    LoggingHandler,
    MetricsHandler,
    MetricsSnapshot,
    ProxyConfig,
    ProxyPool,
    ProxyPoolStats,
    RateLimiter,
    ResponseCache,
    RetryConfig,
    RetryOrchestrator,
    SharedRateLimiter,
    UserAgentRotator,
};

pub use crate::orchestrator::{BookmakerSource, FetchOrchestrator, OddsSource, OrchestratorConfig};

pub use crate::transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
