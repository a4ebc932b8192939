//! User-agent rotation.
//!
//! Every attempt draws a fresh agent from the configured list. In direct mode
//! (no proxies) the rotator is pinned to a single agent so the origin sees one
//! stable client.

use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use rand::thread_rng;
use regex::{Regex, RegexBuilder};

pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1",
];

static MOBILE_UA_RE: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r"\b(mobile|android|iphone|ipad|ipod)\b")
        .case_insensitive(true)
        .build()
        .expect("invalid mobile user-agent regex")
});

/// True when the agent string advertises a phone or tablet.
pub fn is_mobile_user_agent(user_agent: &str) -> bool {
    MOBILE_UA_RE.is_match(user_agent)
}

#[derive(Debug, Clone)]
pub struct UserAgentRotator {
    agents: Vec<String>,
    pinned: Option<String>,
}

impl UserAgentRotator {
    /// Builds a rotator over `agents`, falling back to the built-in list when
    /// the iterator yields nothing usable.
    pub fn new<I>(agents: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut agents: Vec<String> = agents
            .into_iter()
            .map(Into::into)
            .filter(|agent: &String| !agent.trim().is_empty())
            .collect();
        if agents.is_empty() {
            agents = DEFAULT_USER_AGENTS.iter().map(|ua| ua.to_string()).collect();
        }
        Self {
            agents,
            pinned: None,
        }
    }

    /// Rotator that always returns `agent`.
    pub fn fixed(agent: impl Into<String>) -> Self {
        let agent = agent.into();
        Self {
            agents: vec![agent.clone()],
            pinned: Some(agent),
        }
    }

    /// Pins the rotator to its first agent.
    pub fn pin_first(mut self) -> Self {
        self.pinned = self.agents.first().cloned();
        self
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned.is_some()
    }

    pub fn agents(&self) -> &[String] {
        &self.agents
    }

    pub fn default_agent(&self) -> &str {
        self.pinned
            .as_deref()
            .or_else(|| self.agents.first().map(String::as_str))
            .unwrap_or(DEFAULT_USER_AGENTS[0])
    }

    pub fn rotate(&self) -> String {
        if let Some(agent) = &self.pinned {
            return agent.clone();
        }
        self.agents
            .choose(&mut thread_rng())
            .cloned()
            .unwrap_or_else(|| self.default_agent().to_string())
    }
}

impl Default for UserAgentRotator {
    fn default() -> Self {
        Self::new(Vec::<String>::new())
    }
}
