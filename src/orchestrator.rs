//! Runs several odds sources side by side.
//!
//! Each source is opened, fetched under a timeout and closed again; at most
//! `max_concurrent` sources run at once. A source that fails or times out
//! contributes nothing and does not affect the others.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::time::timeout;

use crate::hooks::OddsParser;
use crate::oddsfetch::OddsFetcher;

/// Something that yields records for one bookmaker.
#[async_trait]
pub trait OddsSource: Send + Sync {
    type Record: Send + 'static;

    fn bookmaker(&self) -> &str;

    async fn open(&self);

    async fn close(&self);

    /// Fetches every configured listing. Upstream failures yield fewer (or
    /// no) records rather than an error.
    async fn fetch(&self) -> Vec<Self::Record>;
}

/// An [`OddsFetcher`] together with the listings it should fetch.
#[derive(Debug)]
pub struct BookmakerSource<P: OddsParser> {
    fetcher: OddsFetcher<P>,
    api_endpoints: Vec<String>,
    sport_paths: Vec<String>,
}

impl<P: OddsParser> BookmakerSource<P> {
    pub fn new(fetcher: OddsFetcher<P>) -> Self {
        Self {
            fetcher,
            api_endpoints: Vec::new(),
            sport_paths: Vec::new(),
        }
    }

    pub fn with_api_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.api_endpoints.push(endpoint.into());
        self
    }

    pub fn with_sport_path(mut self, path: impl Into<String>) -> Self {
        self.sport_paths.push(path.into());
        self
    }

    pub fn fetcher(&self) -> &OddsFetcher<P> {
        &self.fetcher
    }
}

#[async_trait]
impl<P: OddsParser> OddsSource for BookmakerSource<P> {
    type Record = P::Record;

    fn bookmaker(&self) -> &str {
        self.fetcher.bookmaker()
    }

    async fn open(&self) {
        self.fetcher.open().await;
    }

    async fn close(&self) {
        self.fetcher.close().await;
    }

    async fn fetch(&self) -> Vec<Self::Record> {
        let apis: Vec<&str> = self.api_endpoints.iter().map(String::as_str).collect();
        let paths: Vec<&str> = self.sport_paths.iter().map(String::as_str).collect();
        match self.fetcher.get_multiple_odds(&apis, &paths).await {
            Ok(records) => records,
            Err(err) => {
                log::error!("[{}] source fetch failed: {err}", self.bookmaker());
                Vec::new()
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_concurrent: usize,
    pub source_timeout: Duration,
    /// Keeps the last non-empty result per bookmaker and serves it on later
    /// runs instead of fetching again.
    pub cache_results: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            source_timeout: Duration::from_secs(40),
            cache_results: true,
        }
    }
}

pub struct FetchOrchestrator<R> {
    config: OrchestratorConfig,
    sources: Vec<Arc<dyn OddsSource<Record = R>>>,
    results: Mutex<HashMap<String, Vec<R>>>,
}

impl<R: Clone + Send + 'static> FetchOrchestrator<R> {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            config,
            sources: Vec::new(),
            results: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_source(mut self, source: Arc<dyn OddsSource<Record = R>>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn add_source(&mut self, source: Arc<dyn OddsSource<Record = R>>) {
        self.sources.push(source);
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn clear_cache(&self) {
        self.cache().clear();
    }

    /// Runs every source once and returns all records, cached ones first.
    pub async fn run(&self) -> Vec<R> {
        let mut records = Vec::new();
        let mut pending = Vec::new();

        for source in &self.sources {
            if self.config.cache_results
                && let Some(cached) = self.cache().get(source.bookmaker()).cloned()
            {
                log::info!("[{}] serving {} cached records", source.bookmaker(), cached.len());
                records.extend(cached);
                continue;
            }
            pending.push(Arc::clone(source));
        }

        let semaphore = Semaphore::new(self.config.max_concurrent.max(1));
        let batches = join_all(
            pending
                .iter()
                .map(|source| self.run_source(&semaphore, source.as_ref())),
        )
        .await;
        for batch in batches {
            records.extend(batch);
        }
        records
    }

    async fn run_source(&self, semaphore: &Semaphore, source: &dyn OddsSource<Record = R>) -> Vec<R> {
        let Ok(_permit) = semaphore.acquire().await else {
            return Vec::new();
        };
        let bookmaker = source.bookmaker().to_string();

        source.open().await;
        let fetched = timeout(self.config.source_timeout, source.fetch()).await;
        source.close().await;

        match fetched {
            Ok(records) if records.is_empty() => {
                log::warn!("[{bookmaker}] source returned no records");
                records
            }
            Ok(records) => {
                if self.config.cache_results {
                    self.cache().insert(bookmaker, records.clone());
                }
                records
            }
            Err(_) => {
                log::error!(
                    "[{bookmaker}] source timed out after {:?}",
                    self.config.source_timeout
                );
                Vec::new()
            }
        }
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<R>>> {
        self.results.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<R> std::fmt::Debug for FetchOrchestrator<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchOrchestrator")
            .field("config", &self.config)
            .field("sources", &self.sources.len())
            .finish_non_exhaustive()
    }
}
