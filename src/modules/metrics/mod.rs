//! Fetch metrics.
//!
//! Counters only ever grow for the lifetime of an engine. Snapshots are plain
//! serialisable values so callers can ship them wherever they like.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::proxy::ProxyPoolStats;

/// Fixed latency buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum LatencyBucket {
    #[serde(rename = "lt_0_2s")]
    Under200Ms,
    #[serde(rename = "0_2_0_5s")]
    Under500Ms,
    #[serde(rename = "0_5_1_0s")]
    UnderOneSecond,
    #[serde(rename = "gt_1_0s")]
    OverOneSecond,
}

impl LatencyBucket {
    pub fn for_latency(latency: Duration) -> Self {
        let secs = latency.as_secs_f64();
        if secs < 0.2 {
            Self::Under200Ms
        } else if secs < 0.5 {
            Self::Under500Ms
        } else if secs < 1.0 {
            Self::UnderOneSecond
        } else {
            Self::OverOneSecond
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Under200Ms => "lt_0_2s",
            Self::Under500Ms => "0_2_0_5s",
            Self::UnderOneSecond => "0_5_1_0s",
            Self::OverOneSecond => "gt_1_0s",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LatencyHistogram {
    pub lt_0_2s: u64,
    #[serde(rename = "0_2_0_5s")]
    pub from_0_2_to_0_5s: u64,
    #[serde(rename = "0_5_1_0s")]
    pub from_0_5_to_1_0s: u64,
    pub gt_1_0s: u64,
}

impl LatencyHistogram {
    fn record(&mut self, bucket: LatencyBucket) {
        let slot = match bucket {
            LatencyBucket::Under200Ms => &mut self.lt_0_2s,
            LatencyBucket::Under500Ms => &mut self.from_0_2_to_0_5s,
            LatencyBucket::UnderOneSecond => &mut self.from_0_5_to_1_0s,
            LatencyBucket::OverOneSecond => &mut self.gt_1_0s,
        };
        *slot += 1;
    }

    pub fn total(&self) -> u64 {
        self.lt_0_2s + self.from_0_2_to_0_5s + self.from_0_5_to_1_0s + self.gt_1_0s
    }
}

/// Point-in-time copy of the metrics, including the proxy pool view.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub bookmaker: String,
    pub started_at: DateTime<Utc>,
    pub requests_made: u64,
    pub successes: u64,
    pub failures: u64,
    pub matches_collected: u64,
    pub proxy_success: u64,
    pub proxy_fail: u64,
    pub per_endpoint_errors: BTreeMap<String, u64>,
    pub latency_histogram: LatencyHistogram,
    pub proxy_stats: ProxyPoolStats,
}

#[derive(Debug)]
struct MetricsState {
    started_at: DateTime<Utc>,
    requests_made: u64,
    successes: u64,
    failures: u64,
    matches_collected: u64,
    proxy_success: u64,
    proxy_fail: u64,
    per_endpoint_errors: BTreeMap<String, u64>,
    latency_histogram: LatencyHistogram,
}

impl Default for MetricsState {
    fn default() -> Self {
        Self {
            started_at: Utc::now(),
            requests_made: 0,
            successes: 0,
            failures: 0,
            matches_collected: 0,
            proxy_success: 0,
            proxy_fail: 0,
            per_endpoint_errors: BTreeMap::new(),
            latency_histogram: LatencyHistogram::default(),
        }
    }
}

/// Thread-safe metrics shared between the engine and its event handlers.
#[derive(Clone, Debug, Default)]
pub struct FetchMetrics {
    inner: Arc<Mutex<MetricsState>>,
}

impl FetchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MetricsState) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn record_request(&self) {
        self.with_state(|state| state.requests_made += 1);
    }

    /// Records a finished attempt. `proxied` is false in direct mode, where
    /// proxy counters stay untouched.
    pub fn record_outcome(&self, success: bool, proxied: bool) {
        self.with_state(|state| match (success, proxied) {
            (true, true) => {
                state.successes += 1;
                state.proxy_success += 1;
            }
            (true, false) => state.successes += 1,
            (false, true) => {
                state.failures += 1;
                state.proxy_fail += 1;
            }
            (false, false) => state.failures += 1,
        });
    }

    pub fn record_latency(&self, latency: Duration) {
        let bucket = LatencyBucket::for_latency(latency);
        self.with_state(|state| state.latency_histogram.record(bucket));
    }

    pub fn record_endpoint_error(&self, endpoint: &str) {
        self.with_state(|state| {
            *state
                .per_endpoint_errors
                .entry(endpoint.to_string())
                .or_insert(0) += 1;
        });
    }

    pub fn record_matches(&self, count: usize) {
        self.with_state(|state| state.matches_collected += count as u64);
    }

    pub fn endpoint_errors(&self, endpoint: &str) -> u64 {
        self.with_state(|state| {
            state
                .per_endpoint_errors
                .get(endpoint)
                .copied()
                .unwrap_or(0)
        })
    }

    pub fn snapshot(&self, bookmaker: &str, proxy_stats: ProxyPoolStats) -> MetricsSnapshot {
        self.with_state(|state| MetricsSnapshot {
            bookmaker: bookmaker.to_string(),
            started_at: state.started_at,
            requests_made: state.requests_made,
            successes: state.successes,
            failures: state.failures,
            matches_collected: state.matches_collected,
            proxy_success: state.proxy_success,
            proxy_fail: state.proxy_fail,
            per_endpoint_errors: state.per_endpoint_errors.clone(),
            latency_histogram: state.latency_histogram.clone(),
            proxy_stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_edges() {
        assert_eq!(
            LatencyBucket::for_latency(Duration::from_millis(199)),
            LatencyBucket::Under200Ms
        );
        assert_eq!(
            LatencyBucket::for_latency(Duration::from_millis(200)),
            LatencyBucket::Under500Ms
        );
        assert_eq!(
            LatencyBucket::for_latency(Duration::from_millis(999)),
            LatencyBucket::UnderOneSecond
        );
        assert_eq!(
            LatencyBucket::for_latency(Duration::from_secs(1)),
            LatencyBucket::OverOneSecond
        );
    }

    #[test]
    fn counters_accumulate() {
        let metrics = FetchMetrics::new();
        metrics.record_request();
        metrics.record_request();
        metrics.record_outcome(true, true);
        metrics.record_outcome(false, false);
        metrics.record_latency(Duration::from_millis(50));
        metrics.record_latency(Duration::from_millis(1500));
        metrics.record_endpoint_error("api:/odds");
        metrics.record_endpoint_error("api:/odds");
        metrics.record_matches(3);

        let snapshot = metrics.snapshot("betika", ProxyPoolStats::default());
        assert_eq!(snapshot.bookmaker, "betika");
        assert_eq!(snapshot.requests_made, 2);
        assert_eq!(snapshot.successes, 1);
        assert_eq!(snapshot.failures, 1);
        assert_eq!(snapshot.proxy_success, 1);
        assert_eq!(snapshot.proxy_fail, 0);
        assert_eq!(snapshot.matches_collected, 3);
        assert_eq!(snapshot.per_endpoint_errors.get("api:/odds"), Some(&2));
        assert_eq!(snapshot.latency_histogram.lt_0_2s, 1);
        assert_eq!(snapshot.latency_histogram.gt_1_0s, 1);
        assert_eq!(snapshot.latency_histogram.total(), 2);
    }

    #[test]
    fn snapshot_serialises_bucket_labels() {
        let metrics = FetchMetrics::new();
        metrics.record_latency(Duration::from_millis(300));
        let snapshot = metrics.snapshot("x", ProxyPoolStats::default());
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["latency_histogram"]["0_2_0_5s"], 1);
        assert_eq!(json["latency_histogram"]["lt_0_2s"], 0);
    }
}
