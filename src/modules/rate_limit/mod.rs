//! Request pacing.
//!
//! Two flavours are supported: a limiter private to one engine that spaces
//! request starts by a fixed minimum interval, and a semaphore-backed limiter
//! that several engines share to bound their combined request rate.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use tokio::time::{Instant, sleep};

/// Converts a requests-per-minute budget into the spacing between request
/// starts. A zero budget is treated as one request per minute.
pub fn min_interval_for(requests_per_minute: u32) -> Duration {
    Duration::from_secs_f64(60.0 / f64::from(requests_per_minute.max(1)))
}

/// Limiter handle that can be cloned into several engines.
///
/// A caller holds one of `permits` slots for the duration of its pacing
/// interval, so at most `permits` request starts happen per interval across
/// every engine sharing the handle.
#[derive(Debug, Clone)]
pub struct SharedRateLimiter {
    semaphore: Arc<Semaphore>,
    min_interval: Duration,
}

impl SharedRateLimiter {
    pub fn new(permits: usize, requests_per_minute: u32) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(permits.max(1))),
            min_interval: min_interval_for(requests_per_minute),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    async fn acquire(&self) {
        // The semaphore is never closed, so acquisition only fails if that
        // invariant is broken; pacing is skipped rather than failing the call.
        match self.semaphore.acquire().await {
            Ok(_permit) => sleep(self.min_interval).await,
            Err(_) => log::warn!("shared rate limiter closed; request not paced"),
        }
    }
}

#[derive(Debug)]
pub enum RateLimiter {
    Shared(SharedRateLimiter),
    PerInstance {
        min_interval: Duration,
        last_request: Mutex<Option<Instant>>,
    },
}

impl RateLimiter {
    pub fn per_instance(requests_per_minute: u32) -> Self {
        Self::PerInstance {
            min_interval: min_interval_for(requests_per_minute),
            last_request: Mutex::new(None),
        }
    }

    pub fn shared(limiter: SharedRateLimiter) -> Self {
        Self::Shared(limiter)
    }

    pub fn min_interval(&self) -> Duration {
        match self {
            Self::Shared(limiter) => limiter.min_interval(),
            Self::PerInstance { min_interval, .. } => *min_interval,
        }
    }

    /// Suspends until the caller may start its next request.
    pub async fn acquire(&self) {
        match self {
            Self::Shared(limiter) => limiter.acquire().await,
            Self::PerInstance {
                min_interval,
                last_request,
            } => {
                // The guard spans the wait so concurrent callers queue up
                // instead of all observing the same timestamp.
                let mut last = last_request.lock().await;
                if let Some(previous) = *last {
                    let elapsed = previous.elapsed();
                    if elapsed < *min_interval {
                        sleep(*min_interval - elapsed).await;
                    }
                }
                *last = Some(Instant::now());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn interval_from_rate() {
        assert_eq!(min_interval_for(60), Duration::from_secs(1));
        assert_eq!(min_interval_for(30), Duration::from_secs(2));
        assert_eq!(min_interval_for(0), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn first_request_is_not_delayed() {
        let limiter = RateLimiter::per_instance(30);
        let start = Instant::now();
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_starts_are_spaced() {
        let limiter = RateLimiter::per_instance(30);
        let mut starts = Vec::new();
        for _ in 0..4 {
            limiter.acquire().await;
            starts.push(Instant::now());
        }
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(2));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_are_spaced() {
        let limiter = Arc::new(RateLimiter::per_instance(60));
        let mut handles = Vec::new();
        for _ in 0..3 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                Instant::now()
            }));
        }
        let mut starts = Vec::new();
        for handle in handles {
            starts.push(handle.await.unwrap());
        }
        starts.sort();
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(1));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_time_counts_toward_interval() {
        let limiter = RateLimiter::per_instance(30);
        limiter.acquire().await;
        tokio::time::advance(Duration::from_millis(1500)).await;
        let start = Instant::now();
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn shared_limiter_spaces_engines() {
        let shared = SharedRateLimiter::new(1, 60);
        let a = RateLimiter::shared(shared.clone());
        let b = RateLimiter::shared(shared.clone());

        let start = Instant::now();
        a.acquire().await;
        b.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert_eq!(shared.available_permits(), 1);
    }
}
