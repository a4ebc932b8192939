//! Short-lived in-process cache for fetched payloads.
//!
//! Keys follow the tier naming (`api:<url>`, `html:<url>`). Entries expire a
//! fixed time after insertion and are dropped when a read finds them stale.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub enum CachedPayload {
    Json(Value),
    Html(String),
}

#[derive(Debug)]
struct CacheEntry {
    payload: CachedPayload,
    stored_at: Instant,
}

#[derive(Debug)]
pub struct ResponseCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn api_key(url: &str) -> String {
        format!("api:{url}")
    }

    pub fn html_key(url: &str) -> String {
        format!("html:{url}")
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &str) -> Option<CachedPayload> {
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            match entries.get(key) {
                None => return None,
                Some(entry) if entry.stored_at.elapsed() < self.ttl => {
                    return Some(entry.payload.clone());
                }
                Some(_) => {}
            }
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries
            .get(key)
            .is_some_and(|entry| entry.stored_at.elapsed() >= self.ttl)
        {
            entries.remove(key);
        }
        None
    }

    pub fn insert(&self, key: impl Into<String>, payload: CachedPayload) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            key.into(),
            CacheEntry {
                payload,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
