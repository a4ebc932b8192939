//! LRU + TTL cache of browser sessions, one per egress proxy.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use super::stealth::init_script;
use super::{BrowserError, BrowserRuntime, BrowserSession, SessionOptions};
use crate::modules::fingerprint::{FingerprintProfile, choose_profile};

pub const DIRECT_KEY: &str = "direct";

#[derive(Debug, Clone)]
pub struct ContextCacheConfig {
    pub capacity: usize,
    pub ttl: Duration,
}

impl Default for ContextCacheConfig {
    fn default() -> Self {
        Self {
            capacity: 6,
            ttl: Duration::from_secs(180),
        }
    }
}

/// Read-only view of a cached context.
#[derive(Debug, Clone)]
pub struct ContextInfo {
    pub key: String,
    pub user_agent: String,
    pub fingerprint: FingerprintProfile,
    pub age: Duration,
}

struct CachedContext {
    key: String,
    session: Arc<dyn BrowserSession>,
    created_at: Instant,
    fingerprint: FingerprintProfile,
    user_agent: String,
}

#[derive(Default)]
struct Slots {
    /// Ordered least- to most-recently used.
    live: Vec<CachedContext>,
    /// Dropped from the cache while a caller still held the session; closed
    /// once that caller lets go.
    retired: Vec<CachedContext>,
}

impl Slots {
    async fn retire(&mut self, entry: CachedContext) {
        if is_idle(&entry) {
            close_entry(entry).await;
        } else {
            log::debug!("browser context still in use, closing later key={}", entry.key);
            self.retired.push(entry);
        }
    }

    async fn sweep_retired(&mut self) {
        let (idle, busy): (Vec<_>, Vec<_>) = self.retired.drain(..).partition(is_idle);
        self.retired = busy;
        for entry in idle {
            close_entry(entry).await;
        }
    }
}

pub struct BrowserContextCache {
    config: ContextCacheConfig,
    runtime: Arc<dyn BrowserRuntime>,
    slots: Mutex<Slots>,
}

impl BrowserContextCache {
    pub fn new(runtime: Arc<dyn BrowserRuntime>, config: ContextCacheConfig) -> Self {
        Self {
            config: ContextCacheConfig {
                capacity: config.capacity.max(1),
                ..config
            },
            runtime,
            slots: Mutex::new(Slots::default()),
        }
    }

    pub fn runtime(&self) -> &Arc<dyn BrowserRuntime> {
        &self.runtime
    }

    /// Returns the session for `proxy`, reusing the cached one only when it is
    /// still fresh and was created with `user_agent`.
    ///
    /// Sessions pushed out of the cache are closed right away only if no
    /// caller still holds them.
    pub async fn acquire(
        &self,
        proxy: Option<&str>,
        user_agent: &str,
    ) -> Result<Arc<dyn BrowserSession>, BrowserError> {
        let key = proxy.unwrap_or(DIRECT_KEY);
        let mut slots = self.slots.lock().await;
        slots.sweep_retired().await;

        let ttl = self.config.ttl;
        let (expired, live): (Vec<_>, Vec<_>) = slots
            .live
            .drain(..)
            .partition(|entry| entry.created_at.elapsed() >= ttl);
        slots.live = live;
        for entry in expired {
            log::debug!("browser context expired key={}", entry.key);
            slots.retire(entry).await;
        }

        if let Some(idx) = slots.live.iter().position(|entry| entry.key == key) {
            let entry = slots.live.remove(idx);
            if entry.user_agent == user_agent {
                let session = Arc::clone(&entry.session);
                slots.live.push(entry);
                return Ok(session);
            }
            log::debug!("browser context user agent changed key={key}");
            slots.retire(entry).await;
        }

        while slots.live.len() >= self.config.capacity {
            let evicted = slots.live.remove(0);
            log::debug!("browser context evicted key={}", evicted.key);
            slots.retire(evicted).await;
        }

        let fingerprint = choose_profile(user_agent);
        let options = SessionOptions {
            proxy: proxy.map(str::to_string),
            user_agent: user_agent.to_string(),
            fingerprint: fingerprint.clone(),
        };
        let session: Arc<dyn BrowserSession> =
            Arc::from(self.runtime.new_session(&options).await?);
        if let Err(err) = session.prepare(&init_script(&fingerprint)).await {
            if let Err(close_err) = session.close().await {
                log::warn!("failed to close unprepared browser context key={key}: {close_err}");
            }
            return Err(err);
        }

        log::debug!(
            "browser context created key={key} locale={} timezone={}",
            fingerprint.locale,
            fingerprint.timezone_id
        );
        slots.live.push(CachedContext {
            key: key.to_string(),
            session: Arc::clone(&session),
            created_at: Instant::now(),
            fingerprint,
            user_agent: user_agent.to_string(),
        });
        Ok(session)
    }

    pub async fn len(&self) -> usize {
        self.slots.lock().await.live.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.lock().await.live.is_empty()
    }

    /// Sessions evicted while in use that are waiting to be closed.
    pub async fn retired_len(&self) -> usize {
        self.slots.lock().await.retired.len()
    }

    pub async fn contexts(&self) -> Vec<ContextInfo> {
        self.slots
            .lock()
            .await
            .live
            .iter()
            .map(|entry| ContextInfo {
                key: entry.key.clone(),
                user_agent: entry.user_agent.clone(),
                fingerprint: entry.fingerprint.clone(),
                age: entry.created_at.elapsed(),
            })
            .collect()
    }

    /// Closes every session, cached or retired, whether or not a caller still
    /// holds it. Only meant for engine shutdown.
    pub async fn close_all(&self) {
        let drained: Vec<_> = {
            let mut slots = self.slots.lock().await;
            let Slots { live, retired } = &mut *slots;
            retired.drain(..).chain(live.drain(..)).collect()
        };
        for entry in drained {
            close_entry(entry).await;
        }
    }
}

impl std::fmt::Debug for BrowserContextCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserContextCache")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// The cache's own handle is the only one left.
fn is_idle(entry: &CachedContext) -> bool {
    Arc::strong_count(&entry.session) == 1
}

async fn close_entry(entry: CachedContext) {
    if let Err(err) = entry.session.close().await {
        log::warn!("failed to close browser context key={}: {err}", entry.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::BrowserPage;
    use crate::modules::user_agents::DEFAULT_USER_AGENTS;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counters {
        created: AtomicUsize,
        closed: AtomicUsize,
        prepared: AtomicUsize,
    }

    impl Counters {
        fn live(&self) -> usize {
            self.created.load(Ordering::SeqCst) - self.closed.load(Ordering::SeqCst)
        }
    }

    struct FakeRuntime(Arc<Counters>);
    struct FakeSession(Arc<Counters>);

    #[async_trait]
    impl BrowserRuntime for FakeRuntime {
        async fn launch(&self) -> Result<(), BrowserError> {
            Ok(())
        }

        async fn new_session(
            &self,
            _options: &SessionOptions,
        ) -> Result<Box<dyn BrowserSession>, BrowserError> {
            self.0.created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeSession(Arc::clone(&self.0))))
        }

        async fn shutdown(&self) -> Result<(), BrowserError> {
            Ok(())
        }
    }

    #[async_trait]
    impl BrowserSession for FakeSession {
        async fn prepare(&self, script: &str) -> Result<(), BrowserError> {
            assert!(script.contains("webdriver"));
            self.0.prepared.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn new_page(&self) -> Result<Box<dyn BrowserPage>, BrowserError> {
            Err(BrowserError::Protocol("no pages in this fake".into()))
        }

        async fn cookies(&self) -> Result<Vec<String>, BrowserError> {
            Ok(Vec::new())
        }

        async fn close(&self) -> Result<(), BrowserError> {
            self.0.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn cache(capacity: usize, ttl: Duration) -> (BrowserContextCache, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let cache = BrowserContextCache::new(
            Arc::new(FakeRuntime(Arc::clone(&counters))),
            ContextCacheConfig { capacity, ttl },
        );
        (cache, counters)
    }

    const UA: &str = DEFAULT_USER_AGENTS[0];

    #[tokio::test(start_paused = true)]
    async fn reuses_context_with_same_user_agent() {
        let (cache, counters) = cache(6, Duration::from_secs(180));
        cache.acquire(Some("http://p1:1"), UA).await.unwrap();
        cache.acquire(Some("http://p1:1"), UA).await.unwrap();
        assert_eq!(counters.created.load(Ordering::SeqCst), 1);
        assert_eq!(counters.prepared.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn user_agent_mismatch_rebuilds() {
        let (cache, counters) = cache(6, Duration::from_secs(180));
        cache.acquire(None, UA).await.unwrap();
        cache.acquire(None, DEFAULT_USER_AGENTS[1]).await.unwrap();
        assert_eq!(counters.created.load(Ordering::SeqCst), 2);
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);

        let contexts = cache.contexts().await;
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].key, DIRECT_KEY);
        assert_eq!(contexts[0].user_agent, DEFAULT_USER_AGENTS[1]);
    }

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_capacity_and_evicts_lru() {
        let (cache, counters) = cache(2, Duration::from_secs(180));
        cache.acquire(Some("a"), UA).await.unwrap();
        cache.acquire(Some("b"), UA).await.unwrap();
        // Touch "a" so "b" becomes least recently used.
        cache.acquire(Some("a"), UA).await.unwrap();
        cache.acquire(Some("c"), UA).await.unwrap();

        assert_eq!(cache.len().await, 2);
        assert_eq!(counters.live(), 2);
        let keys: Vec<_> = cache.contexts().await.into_iter().map(|c| c.key).collect();
        assert_eq!(keys, vec!["a".to_string(), "c".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_context_is_replaced() {
        let (cache, counters) = cache(6, Duration::from_secs(1));
        cache.acquire(None, UA).await.unwrap();
        tokio::time::advance(Duration::from_millis(1100)).await;
        cache.acquire(None, UA).await.unwrap();
        assert_eq!(counters.created.load(Ordering::SeqCst), 2);
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn session_in_use_survives_a_rebuild() {
        let (cache, counters) = cache(6, Duration::from_secs(180));
        let first = cache.acquire(Some("http://p1:1"), UA).await.unwrap();
        let second = cache
            .acquire(Some("http://p1:1"), DEFAULT_USER_AGENTS[1])
            .await
            .unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(counters.closed.load(Ordering::SeqCst), 0);
        assert_eq!(cache.retired_len().await, 1);
        assert_eq!(cache.len().await, 1);

        drop(first);
        cache.acquire(Some("http://p1:1"), DEFAULT_USER_AGENTS[1]).await.unwrap();
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
        assert_eq!(cache.retired_len().await, 0);
        drop(second);
    }

    #[tokio::test(start_paused = true)]
    async fn evicted_session_in_use_is_closed_once_released() {
        let (cache, counters) = cache(1, Duration::from_secs(180));
        let held = cache.acquire(Some("a"), UA).await.unwrap();
        cache.acquire(Some("b"), UA).await.unwrap();
        assert_eq!(counters.closed.load(Ordering::SeqCst), 0);
        assert_eq!(cache.retired_len().await, 1);

        drop(held);
        cache.acquire(Some("b"), UA).await.unwrap();
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
        assert_eq!(counters.live(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn close_all_closes_retired_sessions_too() {
        let (cache, counters) = cache(6, Duration::from_secs(1));
        let _held = cache.acquire(Some("a"), UA).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        cache.acquire(Some("a"), UA).await.unwrap();
        assert_eq!(cache.retired_len().await, 1);

        cache.close_all().await;
        assert_eq!(counters.live(), 0);
        assert_eq!(cache.retired_len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn close_all_releases_everything() {
        let (cache, counters) = cache(6, Duration::from_secs(180));
        cache.acquire(Some("a"), UA).await.unwrap();
        cache.acquire(Some("b"), UA).await.unwrap();
        cache.close_all().await;
        assert!(cache.is_empty().await);
        assert_eq!(counters.live(), 0);
    }
}
