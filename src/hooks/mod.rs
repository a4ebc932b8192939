//! Site-specific hooks injected into the engine.
//!
//! The engine knows how to fetch; callers supply how to read what came back
//! ([`OddsParser`]) and how to walk multi-page listings ([`Paginator`]).

use async_trait::async_trait;
use scraper::Html;
use serde_json::Value;
use thiserror::Error;

/// The three fetch strategies, in the order the chain tries them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Api,
    Http,
    Browser,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Api => "api",
            Tier::Http => "http",
            Tier::Browser => "browser",
        }
    }

    /// Circuit-breaker and metrics key for a URL fetched through this tier.
    pub fn endpoint_key(self, url: &str) -> String {
        format!("{}:{url}", self.as_str())
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("parse failed: {0}")]
pub struct ParseError(pub String);

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<serde_json::Error> for ParseError {
    fn from(err: serde_json::Error) -> Self {
        Self(err.to_string())
    }
}

/// Turns fetched payloads into records.
///
/// Parsers are synchronous: HTML documents are parsed right before
/// `parse_html` runs and never cross an await point.
pub trait OddsParser: Send + Sync + 'static {
    type Record: Send + 'static;

    fn parse_api(&self, payload: &Value) -> Result<Vec<Self::Record>, ParseError> {
        let _ = payload;
        Ok(Vec::new())
    }

    fn parse_html(&self, document: &Html) -> Result<Vec<Self::Record>, ParseError> {
        let _ = document;
        Ok(Vec::new())
    }
}

/// First page of an HTML listing, as fetched by the HTTP or browser tier.
#[derive(Debug, Clone)]
pub struct PageSource {
    pub url: String,
    pub tier: Tier,
    pub html: String,
}

/// Expands the first page of a listing into every page that should be
/// parsed. Each returned document goes through `parse_html` separately.
#[async_trait]
pub trait Paginator: Send + Sync {
    async fn paginate(&self, first: PageSource) -> Vec<String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoPagination;

#[async_trait]
impl Paginator for NoPagination {
    async fn paginate(&self, first: PageSource) -> Vec<String> {
        vec![first.html]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_keys_carry_tier_prefix() {
        assert_eq!(Tier::Api.endpoint_key("/odds"), "api:/odds");
        assert_eq!(
            Tier::Http.endpoint_key("https://example.com/football"),
            "http:https://example.com/football"
        );
        assert_eq!(Tier::Browser.endpoint_key("/x"), "browser:/x");
    }

    #[tokio::test]
    async fn no_pagination_returns_first_page() {
        let pages = NoPagination
            .paginate(PageSource {
                url: "https://example.com".into(),
                tier: Tier::Http,
                html: "<html></html>".into(),
            })
            .await;
        assert_eq!(pages, vec!["<html></html>".to_string()]);
    }
}
