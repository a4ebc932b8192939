//! Retry orchestration.
//!
//! [`RetryOrchestrator::execute`] wraps a single fetch primitive with the
//! resilience layers, in this order for every call:
//!
//! 1. circuit-breaker admission for the endpoint key (once per call)
//! 2. proxy selection (fastest healthy proxy, rotated after each failure)
//! 3. user-agent rotation
//! 4. rate-limiter wait
//! 5. the primitive itself, bounded by the per-call timeout
//! 6. outcome bookkeeping and, on retryable failures, backoff
//!
//! Upstream failures never surface as errors: a call that runs out of
//! attempts resolves to [`FetchOutcome::Exhausted`].

pub mod backoff;

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use http::HeaderMap;
use thiserror::Error;
use tokio::time::{Instant, sleep, timeout};

use super::circuit_breaker::{Admission, CircuitBreakerRegistry, Transition};
use super::events::{AttemptFailure, AttemptInfo, EventDispatcher, FetchEvent};
use super::proxy::ProxyPool;
use super::rate_limit::RateLimiter;
use super::user_agents::UserAgentRotator;

pub use backoff::{Jitter, exponential_delay, parse_retry_after, retry_delay};

/// Why a single attempt failed.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AttemptError {
    #[error("transport error: {0}")]
    Transient(String),
    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),
    #[error("server backpressure (HTTP {status})")]
    Backpressure {
        status: u16,
        retry_after: Option<Duration>,
    },
    #[error("empty result")]
    EmptyResult,
    #[error("captcha not solved")]
    Captcha,
    #[error("request rejected (HTTP {status})")]
    Rejected { status: u16 },
    #[error("non-retryable: {0}")]
    NonRetryable(String),
}

impl AttemptError {
    /// Maps an HTTP status to a failure, or `None` when the status is usable.
    pub fn from_status(status: u16, headers: &HeaderMap) -> Option<Self> {
        match status {
            429 | 500..=599 => Some(Self::Backpressure {
                status,
                retry_after: parse_retry_after(headers),
            }),
            403 | 408 | 425 => Some(Self::Transient(format!("HTTP {status}"))),
            400..=499 => Some(Self::Rejected { status }),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Rejected { .. } | Self::NonRetryable(_))
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Backpressure { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub backoff_base: Duration,
    /// Ceiling applied to a server-provided `Retry-After`.
    pub max_retry_after: Duration,
    pub jitter: Jitter,
    pub request_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
            max_retry_after: Duration::from_secs(120),
            jitter: Jitter::default(),
            request_timeout: Duration::from_secs(20),
        }
    }
}

/// Per-attempt inputs handed to the wrapped primitive.
#[derive(Debug, Clone)]
pub struct AttemptContext {
    pub endpoint: String,
    pub attempt: u32,
    pub proxy: Option<String>,
    pub user_agent: String,
}

#[derive(Debug)]
pub enum FetchOutcome<T> {
    Success(T),
    /// Every attempt failed, or the origin rejected the request outright.
    Exhausted {
        attempts: u32,
        last_error: Option<AttemptError>,
    },
    /// Short-circuited by an open breaker; nothing was sent.
    CircuitOpen { retry_in: Duration },
    /// A non-retryable error stopped the call.
    Aborted(AttemptError),
}

impl<T> FetchOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn success(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }
}

/// Composes proxy pool, breakers, rate limiter and UA rotation around a
/// fetch primitive.
#[derive(Debug, Clone)]
pub struct RetryOrchestrator {
    config: RetryConfig,
    proxies: Arc<Mutex<ProxyPool>>,
    breakers: Arc<CircuitBreakerRegistry>,
    limiter: Arc<RateLimiter>,
    user_agents: UserAgentRotator,
    current_user_agent: Arc<Mutex<String>>,
    events: Arc<EventDispatcher>,
}

impl RetryOrchestrator {
    pub fn new(
        config: RetryConfig,
        proxies: Arc<Mutex<ProxyPool>>,
        breakers: Arc<CircuitBreakerRegistry>,
        limiter: Arc<RateLimiter>,
        user_agents: UserAgentRotator,
        events: Arc<EventDispatcher>,
    ) -> Self {
        let current_user_agent = Arc::new(Mutex::new(user_agents.default_agent().to_string()));
        Self {
            config,
            proxies,
            breakers,
            limiter,
            user_agents,
            current_user_agent,
            events,
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    pub fn proxies(&self) -> &Arc<Mutex<ProxyPool>> {
        &self.proxies
    }

    /// User agent of the most recent attempt.
    pub fn current_user_agent(&self) -> String {
        lock(&self.current_user_agent).clone()
    }

    pub async fn execute<T, F, Fut>(&self, endpoint: &str, mut op: F) -> FetchOutcome<T>
    where
        F: FnMut(AttemptContext) -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let admission = self.breakers.admit(endpoint);
        if let Admission::Rejected { retry_in } = admission {
            self.events.dispatch(FetchEvent::CircuitBlocked {
                endpoint: endpoint.to_string(),
                retry_in,
            });
            return FetchOutcome::CircuitOpen { retry_in };
        }
        let mut trial = TrialGuard {
            breakers: &self.breakers,
            endpoint,
            armed: admission == Admission::Trial,
        };

        let max_attempts = self.config.max_retries.max(1);
        let mut proxy = lock(&self.proxies).get();
        let mut last_error = None;
        let mut attempts = 0;

        for attempt in 1..=max_attempts {
            attempts = attempt;
            let user_agent = self.user_agents.rotate();
            *lock(&self.current_user_agent) = user_agent.clone();

            self.limiter.acquire().await;

            let info = AttemptInfo {
                endpoint: endpoint.to_string(),
                attempt,
                max_attempts,
                proxy: proxy.clone(),
                user_agent: user_agent.clone(),
                timestamp: Utc::now(),
            };
            self.events.dispatch(FetchEvent::Attempt(info.clone()));

            let ctx = AttemptContext {
                endpoint: endpoint.to_string(),
                attempt,
                proxy: proxy.clone(),
                user_agent,
            };
            let started = Instant::now();
            let result = match timeout(self.config.request_timeout, op(ctx)).await {
                Ok(result) => result,
                Err(_) => Err(AttemptError::Timeout(self.config.request_timeout)),
            };
            let latency = started.elapsed();

            match result {
                Ok(value) => {
                    if let Some(proxy) = &proxy {
                        let mut pool = lock(&self.proxies);
                        pool.mark_latency(proxy, latency);
                        pool.mark_success(proxy);
                    }
                    trial.settle();
                    if let Some(Transition::Closed) = self.breakers.record_success(endpoint) {
                        self.events.dispatch(FetchEvent::CircuitClosed {
                            endpoint: endpoint.to_string(),
                        });
                    }
                    self.events.dispatch(FetchEvent::Success { info, latency });
                    return FetchOutcome::Success(value);
                }
                Err(err) if err.is_retryable() => {
                    if let Some(proxy) = &proxy {
                        lock(&self.proxies).mark_failed(proxy);
                    }
                    let retry_in = (attempt < max_attempts).then(|| {
                        retry_delay(
                            self.config.backoff_base,
                            attempt,
                            self.config.jitter,
                            err.retry_after()
                                .map(|server| server.min(self.config.max_retry_after)),
                        )
                    });
                    self.events.dispatch(FetchEvent::Failure(AttemptFailure {
                        info,
                        reason: err.to_string(),
                        latency: Some(latency),
                        retry_in,
                    }));
                    last_error = Some(err);

                    if let Some(delay) = retry_in {
                        proxy = lock(&self.proxies).next();
                        sleep(delay).await;
                    }
                }
                Err(err @ AttemptError::Rejected { .. }) => {
                    // The origin answered; a different proxy will not change that.
                    self.events.dispatch(FetchEvent::Failure(AttemptFailure {
                        info,
                        reason: err.to_string(),
                        latency: Some(latency),
                        retry_in: None,
                    }));
                    last_error = Some(err);
                    break;
                }
                Err(err) => {
                    self.events.dispatch(FetchEvent::Aborted {
                        info,
                        reason: err.to_string(),
                    });
                    return FetchOutcome::Aborted(err);
                }
            }
        }

        trial.settle();
        match self.breakers.record_failure(endpoint) {
            Some(Transition::Opened { failures }) => {
                self.events.dispatch(FetchEvent::CircuitOpened {
                    endpoint: endpoint.to_string(),
                    failures,
                });
            }
            Some(Transition::Reopened) => {
                self.events.dispatch(FetchEvent::CircuitOpened {
                    endpoint: endpoint.to_string(),
                    failures: self.breakers.failure_count(endpoint),
                });
            }
            _ => {}
        }
        self.events.dispatch(FetchEvent::Exhausted {
            endpoint: endpoint.to_string(),
            attempts,
        });
        FetchOutcome::Exhausted {
            attempts,
            last_error,
        }
    }
}

/// Hands a half-open trial back to the breaker unless the call recorded a
/// verdict. Covers aborted calls and futures dropped mid-flight.
struct TrialGuard<'a> {
    breakers: &'a CircuitBreakerRegistry,
    endpoint: &'a str,
    armed: bool,
}

impl TrialGuard<'_> {
    fn settle(&mut self) {
        self.armed = false;
    }
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            log::debug!("releasing unsettled circuit trial endpoint={}", self.endpoint);
            self.breakers.release_trial(self.endpoint);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
