//! Per-endpoint circuit breakers.
//!
//! # States
//! - Closed: calls pass through
//! - Open: endpoint assumed down, admission fails fast
//! - Half-Open: a single trial call decides the next state
//!
//! # Transitions
//! ```text
//! Closed    -> Open:      failure_threshold consecutive recorded failures
//! Open      -> Half-Open: first admission check after recovery_timeout
//! Half-Open -> Closed:    trial succeeds
//! Half-Open -> Open:      trial fails (opened_at resets)
//! ```
//!
//! A trial that reports nothing within `recovery_timeout` loses its lease and
//! the next admission check takes over as the trial.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Result of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Breaker closed.
    Allowed,
    /// Breaker half-open; the caller owns the single trial call and must
    /// report its outcome (or release it).
    Trial,
    /// Breaker open. `retry_in` is the time left before a trial is admitted.
    Rejected { retry_in: Duration },
}

impl Admission {
    pub fn is_admitted(self) -> bool {
        !matches!(self, Admission::Rejected { .. })
    }
}

/// State change caused by recording an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Opened { failures: u32 },
    Reopened,
    Closed,
}

#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    pub key: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub open_for_secs: Option<f64>,
}

#[derive(Debug)]
struct CircuitRecord {
    failure_count: u32,
    state: CircuitState,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
    trial_started: Option<Instant>,
}

impl CircuitRecord {
    fn start_trial(&mut self) {
        self.trial_in_flight = true;
        self.trial_started = Some(Instant::now());
    }
}

impl Default for CircuitRecord {
    fn default() -> Self {
        Self {
            failure_count: 0,
            state: CircuitState::Closed,
            opened_at: None,
            trial_in_flight: false,
            trial_started: None,
        }
    }
}

/// Breaker records keyed by endpoint, created lazily on first use.
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    records: Mutex<HashMap<String, CircuitRecord>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn admit(&self, key: &str) -> Admission {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let record = records.entry(key.to_string()).or_default();

        match record.state {
            CircuitState::Closed => Admission::Allowed,
            CircuitState::Open => {
                let elapsed = record
                    .opened_at
                    .map(|opened| opened.elapsed())
                    .unwrap_or(self.config.recovery_timeout);
                if elapsed >= self.config.recovery_timeout {
                    record.state = CircuitState::HalfOpen;
                    record.start_trial();
                    log::info!("circuit half-open endpoint={key}");
                    Admission::Trial
                } else {
                    Admission::Rejected {
                        retry_in: self.config.recovery_timeout - elapsed,
                    }
                }
            }
            CircuitState::HalfOpen => {
                let lease_left = record
                    .trial_started
                    .filter(|_| record.trial_in_flight)
                    .map(|started| self.config.recovery_timeout.saturating_sub(started.elapsed()))
                    .unwrap_or(Duration::ZERO);
                if record.trial_in_flight && !lease_left.is_zero() {
                    Admission::Rejected {
                        retry_in: lease_left,
                    }
                } else {
                    if record.trial_in_flight {
                        log::warn!("circuit trial lease expired endpoint={key}");
                    }
                    record.start_trial();
                    Admission::Trial
                }
            }
        }
    }

    pub fn record_success(&self, key: &str) -> Option<Transition> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let record = records.entry(key.to_string()).or_default();
        let was_closed = record.state == CircuitState::Closed;
        *record = CircuitRecord::default();
        (!was_closed).then_some(Transition::Closed)
    }

    pub fn record_failure(&self, key: &str) -> Option<Transition> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let record = records.entry(key.to_string()).or_default();
        record.failure_count = record.failure_count.saturating_add(1);

        match record.state {
            CircuitState::HalfOpen => {
                record.state = CircuitState::Open;
                record.opened_at = Some(Instant::now());
                record.trial_in_flight = false;
                record.trial_started = None;
                Some(Transition::Reopened)
            }
            CircuitState::Closed if record.failure_count >= self.config.failure_threshold => {
                record.state = CircuitState::Open;
                record.opened_at = Some(Instant::now());
                Some(Transition::Opened {
                    failures: record.failure_count,
                })
            }
            _ => None,
        }
    }

    /// Gives back a trial admission whose call ended without an upstream
    /// verdict, so the next caller can take the trial instead.
    pub fn release_trial(&self, key: &str) {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(record) = records.get_mut(key)
            && record.state == CircuitState::HalfOpen
        {
            record.trial_in_flight = false;
            record.trial_started = None;
        }
    }

    pub fn state(&self, key: &str) -> CircuitState {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records
            .get(key)
            .map(|record| record.state)
            .unwrap_or(CircuitState::Closed)
    }

    pub fn failure_count(&self, key: &str) -> u32 {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.get(key).map(|record| record.failure_count).unwrap_or(0)
    }

    pub fn snapshot(&self) -> Vec<CircuitSnapshot> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let mut snapshot: Vec<_> = records
            .iter()
            .map(|(key, record)| CircuitSnapshot {
                key: key.clone(),
                state: record.state,
                failure_count: record.failure_count,
                open_for_secs: record
                    .opened_at
                    .filter(|_| record.state != CircuitState::Closed)
                    .map(|opened| opened.elapsed().as_secs_f64()),
            })
            .collect();
        snapshot.sort_by(|a, b| a.key.cmp(&b.key));
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "api:/odds";

    fn registry(threshold: u32) -> CircuitBreakerRegistry {
        CircuitBreakerRegistry::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            recovery_timeout: Duration::from_secs(60),
        })
    }

    #[test]
    fn opens_after_exactly_threshold_failures() {
        let breakers = registry(3);
        assert_eq!(breakers.record_failure(KEY), None);
        assert_eq!(breakers.record_failure(KEY), None);
        assert_eq!(breakers.state(KEY), CircuitState::Closed);
        assert!(breakers.admit(KEY).is_admitted());

        assert_eq!(
            breakers.record_failure(KEY),
            Some(Transition::Opened { failures: 3 })
        );
        assert_eq!(breakers.state(KEY), CircuitState::Open);
        assert!(!breakers.admit(KEY).is_admitted());
    }

    #[test]
    fn success_resets_consecutive_failures() {
        let breakers = registry(3);
        breakers.record_failure(KEY);
        breakers.record_failure(KEY);
        assert_eq!(breakers.record_success(KEY), None);
        breakers.record_failure(KEY);
        breakers.record_failure(KEY);
        assert_eq!(breakers.state(KEY), CircuitState::Closed);
    }

    #[test]
    fn keys_are_independent() {
        let breakers = registry(1);
        breakers.record_failure("api:/odds");
        assert_eq!(breakers.admit("http:/odds"), Admission::Allowed);
        assert!(!breakers.admit("api:/odds").is_admitted());
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_admits_a_single_trial() {
        let breakers = registry(1);
        breakers.record_failure(KEY);

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(matches!(breakers.admit(KEY), Admission::Rejected { .. }));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(breakers.admit(KEY), Admission::Trial);
        assert_eq!(breakers.state(KEY), CircuitState::HalfOpen);
        assert!(!breakers.admit(KEY).is_admitted());

        assert_eq!(breakers.record_success(KEY), Some(Transition::Closed));
        assert_eq!(breakers.admit(KEY), Admission::Allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_trial_reopens_with_fresh_timer() {
        let breakers = registry(1);
        breakers.record_failure(KEY);
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(breakers.admit(KEY), Admission::Trial);

        assert_eq!(breakers.record_failure(KEY), Some(Transition::Reopened));
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(
            breakers.admit(KEY),
            Admission::Rejected {
                retry_in: Duration::from_secs(30)
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn released_trial_can_be_taken_again() {
        let breakers = registry(1);
        breakers.record_failure(KEY);
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(breakers.admit(KEY), Admission::Trial);
        breakers.release_trial(KEY);
        assert_eq!(breakers.admit(KEY), Admission::Trial);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_trial_loses_its_lease() {
        let breakers = registry(1);
        breakers.record_failure(KEY);
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(breakers.admit(KEY), Admission::Trial);

        tokio::time::advance(Duration::from_secs(45)).await;
        assert_eq!(
            breakers.admit(KEY),
            Admission::Rejected {
                retry_in: Duration::from_secs(15)
            }
        );

        tokio::time::advance(Duration::from_secs(15)).await;
        assert_eq!(breakers.admit(KEY), Admission::Trial);
        assert!(!breakers.admit(KEY).is_admitted());
    }
}
