//! Captcha detection and solving hooks.
//!
//! Detection is a cheap synchronous check over page HTML; solving is handed
//! to an external [`CaptchaSolver`]. The engine ships with a substring
//! detector and a solver that never succeeds, which turns every captcha into
//! a failed (and retried) attempt.

use async_trait::async_trait;
use thiserror::Error;

use crate::browser::BrowserPage;
use crate::hooks::Tier;

/// Lower-cased needles searched for by [`MarkerCaptchaDetector`].
pub const DEFAULT_CAPTCHA_MARKERS: &[&str] = &[
    "captcha",
    "recaptcha",
    "hcaptcha",
    "g-recaptcha",
    "cf-challenge",
    "are you a robot",
];

/// Page that tripped the detector.
#[derive(Debug, Clone)]
pub struct CaptchaChallenge {
    pub tier: Tier,
    pub url: String,
    pub html: String,
    pub proxy: Option<String>,
    pub user_agent: String,
}

#[derive(Debug, Error)]
pub enum CaptchaError {
    #[error("captcha solver misconfigured: {0}")]
    Configuration(String),
    #[error("captcha solver request failed: {0}")]
    Provider(String),
    #[error("captcha error: {0}")]
    Other(String),
}

pub trait CaptchaDetector: Send + Sync {
    fn detect(&self, tier: Tier, url: &str, html: &str) -> bool;
}

#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    /// Solves a captcha met over plain HTTP. Returns the unlocked HTML, or
    /// `None` when the page could not be unlocked.
    async fn solve_http(&self, challenge: &CaptchaChallenge) -> Result<Option<String>, CaptchaError>;

    /// Solves a captcha inside a live page. Returns whether the page is now
    /// unlocked; the engine re-reads the page content afterwards.
    async fn solve_browser(
        &self,
        challenge: &CaptchaChallenge,
        page: &dyn BrowserPage,
    ) -> Result<bool, CaptchaError>;
}

/// Case-insensitive substring detector.
#[derive(Debug, Clone)]
pub struct MarkerCaptchaDetector {
    markers: Vec<String>,
}

impl MarkerCaptchaDetector {
    pub fn new<I>(markers: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            markers: markers
                .into_iter()
                .map(|marker| marker.into().to_lowercase())
                .filter(|marker| !marker.is_empty())
                .collect(),
        }
    }
}

impl Default for MarkerCaptchaDetector {
    fn default() -> Self {
        Self::new(DEFAULT_CAPTCHA_MARKERS.iter().copied())
    }
}

impl CaptchaDetector for MarkerCaptchaDetector {
    fn detect(&self, _tier: Tier, _url: &str, html: &str) -> bool {
        if html.is_empty() {
            return false;
        }
        let haystack = html.to_lowercase();
        self.markers.iter().any(|marker| haystack.contains(marker))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCaptchaSolver;

#[async_trait]
impl CaptchaSolver for NoopCaptchaSolver {
    async fn solve_http(&self, _challenge: &CaptchaChallenge) -> Result<Option<String>, CaptchaError> {
        Ok(None)
    }

    async fn solve_browser(
        &self,
        _challenge: &CaptchaChallenge,
        _page: &dyn BrowserPage,
    ) -> Result<bool, CaptchaError> {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_markers_match_case_insensitively() {
        let detector = MarkerCaptchaDetector::default();
        assert!(detector.detect(Tier::Http, "", "<div class=\"g-recaptcha\"></div>"));
        assert!(detector.detect(Tier::Browser, "", "<h1>Are You A Robot?</h1>"));
        assert!(!detector.detect(Tier::Http, "", "<table>odds</table>"));
        assert!(!detector.detect(Tier::Http, "", ""));
    }

    #[test]
    fn custom_markers() {
        let detector = MarkerCaptchaDetector::new(["Verify You Are Human", ""]);
        assert!(detector.detect(Tier::Http, "", "please verify you are human"));
        assert!(!detector.detect(Tier::Http, "", "captcha"));
    }

    #[tokio::test]
    async fn noop_solver_never_unlocks() {
        let challenge = CaptchaChallenge {
            tier: Tier::Http,
            url: "https://example.com".into(),
            html: "captcha".into(),
            proxy: None,
            user_agent: "ua".into(),
        };
        assert!(NoopCaptchaSolver.solve_http(&challenge).await.unwrap().is_none());
    }
}
