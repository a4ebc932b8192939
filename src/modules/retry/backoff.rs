//! Backoff computation and `Retry-After` parsing.

use std::time::Duration;

use chrono::{DateTime, Utc};
use http::HeaderMap;
use http::header::RETRY_AFTER;
use rand::Rng;

/// Multiplicative jitter bounds applied to the exponential delay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Jitter {
    pub min: f64,
    pub max: f64,
}

impl Default for Jitter {
    fn default() -> Self {
        Self { min: 0.5, max: 1.5 }
    }
}

impl Jitter {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    fn sample(&self) -> f64 {
        if self.max <= self.min {
            return self.min;
        }
        rand::thread_rng().gen_range(self.min..=self.max)
    }
}

/// `base * 2^(attempt-1) * jitter`, with `attempt` starting at 1.
pub fn exponential_delay(base: Duration, attempt: u32, jitter: Jitter) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16) as i32;
    let secs = base.as_secs_f64() * 2f64.powi(exponent) * jitter.sample();
    Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
}

/// Sleep before the next attempt. A server-provided `Retry-After` wins when it
/// asks for longer than the computed backoff.
pub fn retry_delay(
    base: Duration,
    attempt: u32,
    jitter: Jitter,
    retry_after: Option<Duration>,
) -> Duration {
    let computed = exponential_delay(base, attempt, jitter);
    match retry_after {
        Some(server) if server > computed => server,
        _ => computed,
    }
}

/// Reads `Retry-After` as either delta-seconds or an HTTP date.
///
/// Values too large for a `Duration` are ignored; callers clamp what remains
/// to their own ceiling.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(seconds) = raw.parse::<f64>() {
        if seconds < 0.0 {
            return None;
        }
        return Duration::try_from_secs_f64(seconds).ok();
    }

    let date = DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()?;
    // A date in the past means "retry now".
    Some(
        (date.with_timezone(&Utc) - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn delay_doubles_per_attempt_within_jitter() {
        let base = Duration::from_secs(1);
        for attempt in 1..=4u32 {
            let nominal = 2f64.powi(attempt as i32 - 1);
            let delay = exponential_delay(base, attempt, Jitter::default()).as_secs_f64();
            assert!(delay >= nominal * 0.5 - 1e-9, "attempt {attempt}: {delay}");
            assert!(delay <= nominal * 1.5 + 1e-9, "attempt {attempt}: {delay}");
        }
    }

    #[test]
    fn fixed_jitter_is_exact() {
        let delay = exponential_delay(Duration::from_millis(500), 3, Jitter::new(1.0, 1.0));
        assert_eq!(delay, Duration::from_secs(2));
    }

    #[test]
    fn retry_after_overrides_shorter_backoff() {
        let delay = retry_delay(
            Duration::from_secs(1),
            1,
            Jitter::default(),
            Some(Duration::from_secs(5)),
        );
        assert_eq!(delay, Duration::from_secs(5));

        let delay = retry_delay(
            Duration::from_secs(10),
            1,
            Jitter::new(1.0, 1.0),
            Some(Duration::from_secs(5)),
        );
        assert_eq!(delay, Duration::from_secs(10));
    }

    #[test]
    fn parses_seconds_and_dates() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("5"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(5)));

        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), Some(Duration::ZERO));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn oversized_seconds_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("99999999999999999999"));
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("inf"));
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("-3"));
        assert_eq!(parse_retry_after(&headers), None);
    }
}
