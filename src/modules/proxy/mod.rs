//! Proxy rotation and health tracking utilities.
//!
//! Tracks per-proxy failures and latency, blacklists unhealthy endpoints for
//! a cooldown window, and hands out either the fastest healthy proxy or the
//! next one in rotation.

use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Latency samples kept per proxy.
pub const LATENCY_WINDOW: usize = 20;

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub max_failures: u32,
    pub cooldown: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            max_failures: 3,
            cooldown: Duration::from_secs(300),
        }
    }
}

/// Read-only view of the pool used by metrics snapshots.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProxyPoolStats {
    pub total_proxies: usize,
    pub available_proxies: usize,
    pub blacklisted_proxies: usize,
    pub proxies: Vec<ProxyStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProxyStats {
    pub endpoint: String,
    pub failure_count: u32,
    pub average_latency_secs: Option<f64>,
    pub blacklisted_for_secs: Option<f64>,
}

#[derive(Debug, Clone)]
struct ProxyEntry {
    endpoint: String,
    failure_count: u32,
    blacklisted_until: Option<Instant>,
    latencies: VecDeque<f64>,
}

impl ProxyEntry {
    fn new(endpoint: String) -> Self {
        Self {
            endpoint,
            failure_count: 0,
            blacklisted_until: None,
            latencies: VecDeque::with_capacity(LATENCY_WINDOW),
        }
    }

    fn mean_latency(&self) -> Option<f64> {
        if self.latencies.is_empty() {
            return None;
        }
        Some(self.latencies.iter().sum::<f64>() / self.latencies.len() as f64)
    }

    /// Drops an elapsed blacklist entry. The proxy comes back on probation:
    /// one more failure puts it straight back on the blacklist.
    fn expire_blacklist(&mut self, now: Instant, max_failures: u32) {
        if let Some(until) = self.blacklisted_until
            && until <= now
        {
            self.blacklisted_until = None;
            self.failure_count = self.failure_count.min(max_failures.saturating_sub(1));
        }
    }

    fn is_eligible(&self, now: Instant, max_failures: u32) -> bool {
        let blacklisted = self.blacklisted_until.is_some_and(|until| until > now);
        !blacklisted && self.failure_count < max_failures
    }
}

/// Pool of egress proxies with latency ranking and failure blacklisting.
///
/// An empty pool is "direct mode": every lookup returns `None`.
#[derive(Debug)]
pub struct ProxyPool {
    config: ProxyConfig,
    proxies: Vec<ProxyEntry>,
    cursor: usize,
}

impl ProxyPool {
    pub fn new(config: ProxyConfig) -> Self {
        Self {
            config,
            proxies: Vec::new(),
            cursor: 0,
        }
    }

    pub fn with_proxies<I>(config: ProxyConfig, proxies: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut pool = Self::new(config);
        pool.load(proxies);
        pool
    }

    pub fn load<I>(&mut self, proxies: I)
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.proxies.clear();
        self.cursor = 0;
        for proxy in proxies {
            self.add_proxy(proxy);
        }
    }

    pub fn add_proxy(&mut self, proxy: impl Into<String>) {
        let endpoint = proxy.into();
        if endpoint.is_empty() || self.proxies.iter().any(|entry| entry.endpoint == endpoint) {
            return;
        }
        self.proxies.push(ProxyEntry::new(endpoint));
    }

    pub fn is_direct(&self) -> bool {
        self.proxies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    /// Best eligible proxy by mean latency. Unsampled proxies rank last; when
    /// nothing has been sampled yet this is plain rotation.
    pub fn get(&mut self) -> Option<String> {
        if self.proxies.is_empty() {
            return None;
        }
        if self.proxies.iter().all(|entry| entry.latencies.is_empty()) {
            return self.next();
        }

        let now = Instant::now();
        let max_failures = self.config.max_failures;
        let mut best: Option<(usize, f64)> = None;
        for (idx, entry) in self.proxies.iter_mut().enumerate() {
            entry.expire_blacklist(now, max_failures);
            if !entry.is_eligible(now, max_failures) {
                continue;
            }
            let latency = entry.mean_latency().unwrap_or(f64::INFINITY);
            if best.is_none_or(|(_, current)| latency < current) {
                best = Some((idx, latency));
            }
        }

        best.map(|(idx, _)| self.proxies[idx].endpoint.clone())
    }

    /// Cyclic rotation skipping ineligible proxies. Gives up after one full
    /// cycle.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<String> {
        let len = self.proxies.len();
        if len == 0 {
            return None;
        }

        let now = Instant::now();
        let max_failures = self.config.max_failures;
        for _ in 0..len {
            let idx = self.cursor % len;
            self.cursor = (self.cursor + 1) % len;
            let entry = &mut self.proxies[idx];
            entry.expire_blacklist(now, max_failures);
            if entry.is_eligible(now, max_failures) {
                return Some(entry.endpoint.clone());
            }
        }
        None
    }

    pub fn mark_success(&mut self, proxy: &str) {
        let max_failures = self.config.max_failures;
        if let Some(entry) = self.entry_mut(proxy) {
            entry.failure_count = entry
                .failure_count
                .saturating_sub(1)
                .min(max_failures.saturating_sub(1));
            entry.blacklisted_until = None;
        }
    }

    pub fn mark_failed(&mut self, proxy: &str) {
        let max_failures = self.config.max_failures;
        let cooldown = self.config.cooldown;
        if let Some(entry) = self.entry_mut(proxy) {
            // Overlapping failures on a blacklisted proxy stop counting at the
            // limit.
            entry.failure_count = entry.failure_count.saturating_add(1).min(max_failures);
            if entry.failure_count >= max_failures {
                entry.blacklisted_until = Some(Instant::now() + cooldown);
                log::warn!(
                    "proxy blacklisted proxy={} failures={} cooldown={:.0}s",
                    entry.endpoint,
                    entry.failure_count,
                    cooldown.as_secs_f64()
                );
            }
        }
    }

    pub fn mark_latency(&mut self, proxy: &str, latency: Duration) {
        if let Some(entry) = self.entry_mut(proxy) {
            if entry.latencies.len() == LATENCY_WINDOW {
                entry.latencies.pop_front();
            }
            entry.latencies.push_back(latency.as_secs_f64());
        }
    }

    pub fn failure_count(&self, proxy: &str) -> Option<u32> {
        self.proxies
            .iter()
            .find(|entry| entry.endpoint == proxy)
            .map(|entry| entry.failure_count)
    }

    pub fn stats(&self) -> ProxyPoolStats {
        let now = Instant::now();
        let max_failures = self.config.max_failures;
        let mut available = 0;
        let mut blacklisted = 0;
        let mut proxies = Vec::with_capacity(self.proxies.len());

        for entry in &self.proxies {
            let remaining = entry
                .blacklisted_until
                .filter(|until| *until > now)
                .map(|until| (until - now).as_secs_f64());
            if remaining.is_some() {
                blacklisted += 1;
            } else if entry.failure_count < max_failures || entry.blacklisted_until.is_some() {
                available += 1;
            }
            proxies.push(ProxyStats {
                endpoint: entry.endpoint.clone(),
                failure_count: entry.failure_count,
                average_latency_secs: entry.mean_latency(),
                blacklisted_for_secs: remaining,
            });
        }

        ProxyPoolStats {
            total_proxies: self.proxies.len(),
            available_proxies: available,
            blacklisted_proxies: blacklisted,
            proxies,
        }
    }

    fn entry_mut(&mut self, proxy: &str) -> Option<&mut ProxyEntry> {
        self.proxies.iter_mut().find(|entry| entry.endpoint == proxy)
    }
}

impl Default for ProxyPool {
    fn default() -> Self {
        Self::new(ProxyConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &str = "http://10.0.0.1:8080";
    const B: &str = "http://10.0.0.2:8080";
    const C: &str = "http://10.0.0.3:8080";

    fn pool(max_failures: u32) -> ProxyPool {
        ProxyPool::with_proxies(
            ProxyConfig {
                max_failures,
                cooldown: Duration::from_secs(300),
            },
            [A, B],
        )
    }

    #[test]
    fn direct_mode_never_returns_a_proxy() {
        let mut pool = ProxyPool::default();
        assert!(pool.is_direct());
        assert_eq!(pool.get(), None);
        assert_eq!(pool.next(), None);
    }

    #[test]
    fn deduplicates_on_load() {
        let pool = ProxyPool::with_proxies(ProxyConfig::default(), [A, A, B]);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn next_rotates_cyclically() {
        let mut pool = ProxyPool::with_proxies(ProxyConfig::default(), [A, B, C]);
        assert_eq!(pool.next().as_deref(), Some(A));
        assert_eq!(pool.next().as_deref(), Some(B));
        assert_eq!(pool.next().as_deref(), Some(C));
        assert_eq!(pool.next().as_deref(), Some(A));
    }

    #[test]
    fn blacklisted_proxy_is_skipped_by_get() {
        let mut pool = pool(2);
        pool.mark_failed(A);
        pool.mark_failed(A);
        assert_eq!(pool.stats().blacklisted_proxies, 1);
        assert_eq!(pool.get().as_deref(), Some(B));
        assert_eq!(pool.next().as_deref(), Some(B));
    }

    #[test]
    fn all_ineligible_yields_none() {
        let mut pool = pool(1);
        pool.mark_failed(A);
        pool.mark_failed(B);
        assert_eq!(pool.next(), None);
        assert_eq!(pool.get(), None);
    }

    #[test]
    fn get_prefers_lowest_mean_latency() {
        let mut pool = ProxyPool::with_proxies(ProxyConfig::default(), [A, B, C]);
        pool.mark_latency(A, Duration::from_millis(900));
        pool.mark_latency(B, Duration::from_millis(120));
        pool.mark_latency(B, Duration::from_millis(180));
        assert_eq!(pool.get().as_deref(), Some(B));
    }

    #[test]
    fn unsampled_proxies_rank_after_sampled_ones() {
        let mut pool = ProxyPool::with_proxies(ProxyConfig::default(), [A, B]);
        pool.mark_latency(B, Duration::from_secs(4));
        assert_eq!(pool.get().as_deref(), Some(B));
    }

    #[test]
    fn latency_window_is_bounded() {
        let mut pool = ProxyPool::with_proxies(ProxyConfig::default(), [A]);
        pool.mark_latency(A, Duration::from_secs(100));
        for _ in 0..LATENCY_WINDOW {
            pool.mark_latency(A, Duration::from_secs(1));
        }
        let stats = pool.stats();
        assert_eq!(stats.proxies[0].average_latency_secs, Some(1.0));
    }

    #[test]
    fn mark_success_floors_at_zero_and_clears_blacklist() {
        let mut pool = pool(2);
        pool.mark_success(A);
        pool.mark_success(A);
        assert_eq!(pool.failure_count(A), Some(0));

        pool.mark_failed(A);
        pool.mark_failed(A);
        pool.mark_success(A);
        assert_eq!(pool.failure_count(A), Some(1));
        assert_eq!(pool.stats().blacklisted_proxies, 0);
    }

    #[test]
    fn success_after_piled_up_failures_restores_the_proxy() {
        let mut pool = pool(2);
        for _ in 0..5 {
            pool.mark_failed(A);
        }
        assert_eq!(pool.failure_count(A), Some(2));

        pool.mark_success(A);
        assert_eq!(pool.failure_count(A), Some(1));
        assert_eq!(pool.next().as_deref(), Some(A));
        assert_eq!(pool.next().as_deref(), Some(B));
    }

    #[tokio::test(start_paused = true)]
    async fn blacklist_expires_after_cooldown() {
        let mut pool = pool(2);
        pool.mark_failed(A);
        pool.mark_failed(A);
        assert_eq!(pool.next().as_deref(), Some(B));

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(pool.next().as_deref(), Some(B));

        tokio::time::advance(Duration::from_secs(2)).await;
        let mut seen = vec![pool.next(), pool.next()];
        seen.sort();
        assert_eq!(seen, vec![Some(A.to_string()), Some(B.to_string())]);

        // back on probation: one more failure blacklists again
        pool.mark_failed(A);
        assert_eq!(pool.stats().blacklisted_proxies, 1);
    }
}
