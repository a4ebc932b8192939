//! Fetch lifecycle events.
//!
//! The engine never logs or counts directly: it emits [`FetchEvent`]s and the
//! registered handlers turn them into log records, metrics or whatever the
//! caller plugs in.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use super::metrics::FetchMetrics;

/// Who is making an attempt and through which egress.
#[derive(Debug, Clone)]
pub struct AttemptInfo {
    pub endpoint: String,
    pub attempt: u32,
    pub max_attempts: u32,
    pub proxy: Option<String>,
    pub user_agent: String,
    pub timestamp: DateTime<Utc>,
}

impl AttemptInfo {
    pub fn proxy_label(&self) -> &str {
        self.proxy.as_deref().unwrap_or("direct")
    }
}

#[derive(Debug, Clone)]
pub struct AttemptFailure {
    pub info: AttemptInfo,
    pub reason: String,
    /// Time spent executing the attempt; `None` when it never ran.
    pub latency: Option<Duration>,
    /// Sleep scheduled before the next attempt; `None` on the last one.
    pub retry_in: Option<Duration>,
}

#[derive(Debug, Clone)]
pub enum FetchEvent {
    Attempt(AttemptInfo),
    Success {
        info: AttemptInfo,
        latency: Duration,
    },
    Failure(AttemptFailure),
    /// A non-retryable error cut the call short.
    Aborted {
        info: AttemptInfo,
        reason: String,
    },
    /// No attempt succeeded; the caller receives the failure sentinel.
    Exhausted {
        endpoint: String,
        attempts: u32,
    },
    CircuitBlocked {
        endpoint: String,
        retry_in: Duration,
    },
    CircuitOpened {
        endpoint: String,
        failures: u32,
    },
    CircuitClosed {
        endpoint: String,
    },
    Captcha {
        endpoint: String,
        solved: bool,
    },
    Records {
        endpoint: String,
        count: usize,
    },
}

pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &FetchEvent);
}

/// Broadcasts events to every registered handler, in registration order.
#[derive(Default, Clone)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn register_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn dispatch(&self, event: FetchEvent) {
        for handler in &self.handlers {
            handler.handle(&event);
        }
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// Logs events through the `log` facade, tagged with the bookmaker.
#[derive(Debug, Clone)]
pub struct LoggingHandler {
    bookmaker: String,
}

impl LoggingHandler {
    pub fn new(bookmaker: impl Into<String>) -> Self {
        Self {
            bookmaker: bookmaker.into(),
        }
    }
}

impl EventHandler for LoggingHandler {
    fn handle(&self, event: &FetchEvent) {
        let bookmaker = &self.bookmaker;
        match event {
            FetchEvent::Attempt(info) => {
                log::debug!(
                    "[{bookmaker}] attempt endpoint={} attempt={}/{} proxy={} ua={}",
                    info.endpoint,
                    info.attempt,
                    info.max_attempts,
                    info.proxy_label(),
                    info.user_agent
                );
            }
            FetchEvent::Success { info, latency } => {
                log::info!(
                    "[{bookmaker}] success endpoint={} attempt={} proxy={} latency={:.2}s",
                    info.endpoint,
                    info.attempt,
                    info.proxy_label(),
                    latency.as_secs_f64()
                );
            }
            FetchEvent::Failure(failure) => {
                let info = &failure.info;
                match failure.retry_in {
                    Some(delay) => log::warn!(
                        "[{bookmaker}] failure endpoint={} attempt={} proxy={} ua={} reason={} retry_in={:.2}s",
                        info.endpoint,
                        info.attempt,
                        info.proxy_label(),
                        info.user_agent,
                        failure.reason,
                        delay.as_secs_f64()
                    ),
                    None => log::warn!(
                        "[{bookmaker}] failure endpoint={} attempt={} proxy={} ua={} reason={}",
                        info.endpoint,
                        info.attempt,
                        info.proxy_label(),
                        info.user_agent,
                        failure.reason
                    ),
                }
            }
            FetchEvent::Aborted { info, reason } => {
                log::error!(
                    "[{bookmaker}] aborted endpoint={} attempt={} proxy={} ua={} reason={}",
                    info.endpoint,
                    info.attempt,
                    info.proxy_label(),
                    info.user_agent,
                    reason
                );
            }
            FetchEvent::Exhausted { endpoint, attempts } => {
                log::error!("[{bookmaker}] exhausted endpoint={endpoint} attempts={attempts}");
            }
            FetchEvent::CircuitBlocked { endpoint, retry_in } => {
                log::warn!(
                    "[{bookmaker}] circuit open endpoint={endpoint} retry_in={:.1}s",
                    retry_in.as_secs_f64()
                );
            }
            FetchEvent::CircuitOpened { endpoint, failures } => {
                log::error!("[{bookmaker}] circuit opened endpoint={endpoint} failures={failures}");
            }
            FetchEvent::CircuitClosed { endpoint } => {
                log::info!("[{bookmaker}] circuit closed endpoint={endpoint}");
            }
            FetchEvent::Captcha { endpoint, solved } => {
                log::warn!("[{bookmaker}] captcha endpoint={endpoint} solved={solved}");
            }
            FetchEvent::Records { endpoint, count } => {
                log::info!("[{bookmaker}] {count} records from {endpoint}");
            }
        }
    }
}

/// Feeds [`FetchMetrics`] from the event stream.
#[derive(Clone, Debug)]
pub struct MetricsHandler {
    metrics: FetchMetrics,
}

impl MetricsHandler {
    pub fn new(metrics: FetchMetrics) -> Self {
        Self { metrics }
    }
}

impl EventHandler for MetricsHandler {
    fn handle(&self, event: &FetchEvent) {
        match event {
            FetchEvent::Attempt(_) => self.metrics.record_request(),
            FetchEvent::Success { info, latency } => {
                self.metrics.record_outcome(true, info.proxy.is_some());
                self.metrics.record_latency(*latency);
            }
            FetchEvent::Failure(failure) => {
                self.metrics
                    .record_outcome(false, failure.info.proxy.is_some());
                if let Some(latency) = failure.latency {
                    self.metrics.record_latency(latency);
                }
            }
            // Not the proxy's fault, so it never counts against proxy_fail.
            FetchEvent::Aborted { .. } => self.metrics.record_outcome(false, false),
            FetchEvent::Exhausted { endpoint, .. } => self.metrics.record_endpoint_error(endpoint),
            FetchEvent::Records { count, .. } => self.metrics.record_matches(*count),
            _ => {}
        }
    }
}
