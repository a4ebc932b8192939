//! Engine configuration.
//!
//! Provides a single serde-backed settings struct with:
//! - defaults for every knob
//! - JSON loading (string or file)
//! - environment overrides under a caller-chosen prefix
//! - validation before an engine is built

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::browser::ContextCacheConfig;
use crate::modules::circuit_breaker::CircuitBreakerConfig;
use crate::modules::proxy::ProxyConfig;
use crate::modules::retry::{Jitter, RetryConfig};

pub const DEFAULT_ENV_PREFIX: &str = "ODDSFETCH";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: String, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub bookmaker: String,
    pub base_url: String,
    pub proxies: Vec<String>,
    /// Agents to rotate through; the built-in list is used when empty.
    pub user_agents: Vec<String>,
    pub max_retries: u32,
    pub backoff_base_secs: f64,
    /// Upper bound on a server-provided `Retry-After`.
    pub max_retry_after_secs: f64,
    pub jitter_min: f64,
    pub jitter_max: f64,
    pub requests_per_minute: u32,
    pub failure_threshold: u32,
    pub recovery_timeout_secs: f64,
    pub request_timeout_secs: f64,
    pub proxy_max_failures: u32,
    pub proxy_cooldown_secs: f64,
    pub context_cache_max: usize,
    pub context_ttl_secs: f64,
    pub browser_settle_min_secs: f64,
    pub browser_settle_max_secs: f64,
    pub captcha_reread_delay_secs: f64,
    /// Whether the browser tier may run at all for this bookmaker.
    pub browser_fallback: bool,
    pub http2: bool,
    /// Caches successful payloads for this long; disabled when unset.
    pub response_cache_ttl_secs: Option<f64>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            bookmaker: "default".into(),
            base_url: String::new(),
            proxies: Vec::new(),
            user_agents: Vec::new(),
            max_retries: 3,
            backoff_base_secs: 1.0,
            max_retry_after_secs: 120.0,
            jitter_min: 0.5,
            jitter_max: 1.5,
            requests_per_minute: 60,
            failure_threshold: 5,
            recovery_timeout_secs: 60.0,
            request_timeout_secs: 20.0,
            proxy_max_failures: 3,
            proxy_cooldown_secs: 300.0,
            context_cache_max: 6,
            context_ttl_secs: 180.0,
            browser_settle_min_secs: 1.0,
            browser_settle_max_secs: 2.5,
            captcha_reread_delay_secs: 0.8,
            browser_fallback: true,
            http2: false,
            response_cache_ttl_secs: None,
        }
    }
}

impl FetchConfig {
    pub fn new(bookmaker: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            bookmaker: bookmaker.into(),
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    /// Applies `<PREFIX>_<FIELD>` environment variables on top of the current
    /// values, e.g. `ODDSFETCH_PROXIES=http://a:1,http://b:1`.
    pub fn apply_env_overrides(&mut self, prefix: &str) -> Result<(), ConfigError> {
        self.apply_overrides_with(prefix, |var| std::env::var(var).ok())
    }

    fn apply_overrides_with<F>(&mut self, prefix: &str, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |field: &str| {
            let var = format!("{prefix}_{field}");
            lookup(&var).map(|value| (var, value))
        };

        if let Some((_, value)) = read("BOOKMAKER") {
            self.bookmaker = value;
        }
        if let Some((_, value)) = read("BASE_URL") {
            self.base_url = value;
        }
        if let Some((_, value)) = read("PROXIES") {
            self.proxies = split_list(&value);
        }
        if let Some((_, value)) = read("USER_AGENTS") {
            self.user_agents = value
                .split('|')
                .map(str::trim)
                .filter(|agent| !agent.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some((var, value)) = read("MAX_RETRIES") {
            self.max_retries = parse_env(&var, &value)?;
        }
        if let Some((var, value)) = read("MAX_RETRY_AFTER_SECS") {
            self.max_retry_after_secs = parse_env(&var, &value)?;
        }
        if let Some((var, value)) = read("REQUESTS_PER_MINUTE") {
            self.requests_per_minute = parse_env(&var, &value)?;
        }
        if let Some((var, value)) = read("FAILURE_THRESHOLD") {
            self.failure_threshold = parse_env(&var, &value)?;
        }
        if let Some((var, value)) = read("RECOVERY_TIMEOUT_SECS") {
            self.recovery_timeout_secs = parse_env(&var, &value)?;
        }
        if let Some((var, value)) = read("REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_env(&var, &value)?;
        }
        if let Some((var, value)) = read("CONTEXT_CACHE_MAX") {
            self.context_cache_max = parse_env(&var, &value)?;
        }
        if let Some((var, value)) = read("CONTEXT_TTL_SECS") {
            self.context_ttl_secs = parse_env(&var, &value)?;
        }
        if let Some((var, value)) = read("BROWSER_FALLBACK") {
            self.browser_fallback = parse_bool(&var, &value)?;
        }
        if let Some((var, value)) = read("HTTP2") {
            self.http2 = parse_bool(&var, &value)?;
        }
        if let Some((var, value)) = read("RESPONSE_CACHE_TTL_SECS") {
            self.response_cache_ttl_secs = if value.trim().is_empty() {
                None
            } else {
                Some(parse_env(&var, &value)?)
            };
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| Err(ConfigError::Invalid(message.to_string()));

        if self.bookmaker.trim().is_empty() {
            return invalid("bookmaker must not be empty");
        }
        if self.base_url.trim().is_empty() {
            return invalid("base_url must not be empty");
        }
        if url::Url::parse(&self.base_url).is_err() {
            return Err(ConfigError::Invalid(format!(
                "base_url {:?} is not an absolute URL",
                self.base_url
            )));
        }
        if self.max_retries == 0 {
            return invalid("max_retries must be at least 1");
        }
        if self.requests_per_minute == 0 {
            return invalid("requests_per_minute must be at least 1");
        }
        if self.failure_threshold == 0 {
            return invalid("failure_threshold must be at least 1");
        }
        if self.proxy_max_failures == 0 {
            return invalid("proxy_max_failures must be at least 1");
        }
        if self.context_cache_max == 0 {
            return invalid("context_cache_max must be at least 1");
        }
        if self.jitter_min > self.jitter_max {
            return invalid("jitter_min must not exceed jitter_max");
        }
        if self.browser_settle_min_secs > self.browser_settle_max_secs {
            return invalid("browser_settle_min_secs must not exceed browser_settle_max_secs");
        }
        if self.request_timeout_secs <= 0.0 {
            return invalid("request_timeout_secs must be positive");
        }
        if let Some(proxy) = self
            .proxies
            .iter()
            .find(|proxy| reqwest::Proxy::all(proxy.as_str()).is_err())
        {
            return Err(ConfigError::Invalid(format!("proxy {proxy:?} is not a valid proxy URL")));
        }

        let non_negative = [
            ("backoff_base_secs", self.backoff_base_secs),
            ("max_retry_after_secs", self.max_retry_after_secs),
            ("jitter_min", self.jitter_min),
            ("jitter_max", self.jitter_max),
            ("recovery_timeout_secs", self.recovery_timeout_secs),
            ("request_timeout_secs", self.request_timeout_secs),
            ("proxy_cooldown_secs", self.proxy_cooldown_secs),
            ("context_ttl_secs", self.context_ttl_secs),
            ("browser_settle_min_secs", self.browser_settle_min_secs),
            ("captcha_reread_delay_secs", self.captcha_reread_delay_secs),
            (
                "response_cache_ttl_secs",
                self.response_cache_ttl_secs.unwrap_or(0.0),
            ),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a non-negative number"
                )));
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        secs(self.request_timeout_secs)
    }

    pub fn response_cache_ttl(&self) -> Option<Duration> {
        self.response_cache_ttl_secs.map(secs)
    }

    pub fn browser_settle_range(&self) -> (Duration, Duration) {
        (
            secs(self.browser_settle_min_secs),
            secs(self.browser_settle_max_secs),
        )
    }

    pub fn captcha_reread_delay(&self) -> Duration {
        secs(self.captcha_reread_delay_secs)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            backoff_base: secs(self.backoff_base_secs),
            max_retry_after: secs(self.max_retry_after_secs),
            jitter: Jitter::new(self.jitter_min, self.jitter_max),
            request_timeout: self.request_timeout(),
        }
    }

    pub fn proxy_config(&self) -> ProxyConfig {
        ProxyConfig {
            max_failures: self.proxy_max_failures,
            cooldown: secs(self.proxy_cooldown_secs),
        }
    }

    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            recovery_timeout: secs(self.recovery_timeout_secs),
        }
    }

    pub fn context_cache_config(&self) -> ContextCacheConfig {
        ContextCacheConfig {
            capacity: self.context_cache_max,
            ttl: secs(self.context_ttl_secs),
        }
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::ZERO)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_env<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        var: var.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            var: var.to_string(),
            value: value.to_string(),
        }),
    }
}
