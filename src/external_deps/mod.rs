//! Integrations that rely on third-party services.
//!
//! Groups the captcha hooks and, behind the `chromium` feature, the
//! headless browser runtime used by the browser tier.

pub mod captcha;

#[cfg(feature = "chromium")]
pub mod chromium;

pub use captcha::{MarkerCaptchaDetector, NoopCaptchaSolver};
