//! Resilience building blocks
//!
//! Each module is usable on its own; [`crate::OddsFetcher`] composes them
//! through the retry orchestrator.

pub mod circuit_breaker;
pub mod events;
pub mod fingerprint;
pub mod metrics;
pub mod proxy;
pub mod rate_limit;
pub mod response_cache;
pub mod retry;
pub mod user_agents;

// Re-export commonly used types
pub use circuit_breaker::{
    Admission, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitSnapshot, CircuitState,
};
pub use events::{
    AttemptFailure, AttemptInfo, EventDispatcher, EventHandler, FetchEvent, LoggingHandler,
    MetricsHandler,
};
pub use fingerprint::{FINGERPRINT_CATALOG, FingerprintProfile, Viewport, choose_profile};
pub use metrics::{FetchMetrics, LatencyBucket, LatencyHistogram, MetricsSnapshot};
pub use proxy::{ProxyConfig, ProxyPool, ProxyPoolStats, ProxyStats};
pub use rate_limit::{RateLimiter, SharedRateLimiter};
pub use response_cache::{CachedPayload, ResponseCache};
pub use retry::{AttemptContext, AttemptError, FetchOutcome, RetryConfig, RetryOrchestrator};
pub use user_agents::{DEFAULT_USER_AGENTS, UserAgentRotator};
