//! Browser automation seam.
//!
//! The browser tier drives a headless browser through three small traits:
//! a [`BrowserRuntime`] (the launched browser), [`BrowserSession`]s (isolated
//! contexts bound to one proxy, user agent and fingerprint) and
//! [`BrowserPage`]s. Sessions are expensive, so the engine keeps them in a
//! [`BrowserContextCache`].

mod context_cache;
pub mod stealth;

pub use context_cache::{BrowserContextCache, ContextCacheConfig, ContextInfo, DIRECT_KEY};

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::modules::fingerprint::FingerprintProfile;
use crate::modules::retry::AttemptError;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("browser runtime is not running")]
    NotRunning,
    #[error("failed to launch browser: {0}")]
    Launch(String),
    #[error("failed to create browser context: {0}")]
    Context(String),
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error("browser protocol error: {0}")]
    Protocol(String),
}

impl From<BrowserError> for AttemptError {
    fn from(err: BrowserError) -> Self {
        match err {
            BrowserError::NotRunning => AttemptError::NonRetryable(err.to_string()),
            other => AttemptError::Transient(other.to_string()),
        }
    }
}

/// Everything a new session is bound to.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub proxy: Option<String>,
    pub user_agent: String,
    pub fingerprint: FingerprintProfile,
}

#[async_trait]
pub trait BrowserRuntime: Send + Sync {
    async fn launch(&self) -> Result<(), BrowserError>;

    async fn new_session(
        &self,
        options: &SessionOptions,
    ) -> Result<Box<dyn BrowserSession>, BrowserError>;

    async fn shutdown(&self) -> Result<(), BrowserError>;
}

#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Installs `script` so it runs before any page script. Called once,
    /// before the first page is opened.
    async fn prepare(&self, script: &str) -> Result<(), BrowserError>;

    async fn new_page(&self) -> Result<Box<dyn BrowserPage>, BrowserError>;

    /// Cookies held by the session, as `Set-Cookie` style strings.
    async fn cookies(&self) -> Result<Vec<String>, BrowserError>;

    async fn close(&self) -> Result<(), BrowserError>;
}

#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Navigates and resolves once the DOM content has loaded.
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), BrowserError>;

    async fn content(&self) -> Result<String, BrowserError>;

    async fn close(&self) -> Result<(), BrowserError>;
}
