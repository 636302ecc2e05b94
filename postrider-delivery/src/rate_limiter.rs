//! Upstream rate limiting using a sliding window
//!
//! The relay exists partly to protect the upstream provider from bursts, so
//! the limiter gives the exact guarantee: no more than `rate_limit` grants
//! inside any trailing `rate_window` interval. A fixed-window counter would
//! admit up to twice the limit across a window boundary, which is why the
//! implementation keeps the actual grant timestamps instead.

use std::{
    collections::VecDeque,
    sync::Mutex,
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};

/// Configuration for upstream rate limiting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum deliveries granted within any trailing window
    #[serde(default = "default_rate_limit")]
    pub rate_limit: usize,

    /// Window length in seconds
    #[serde(default = "default_rate_window_secs")]
    pub rate_window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rate_limit: default_rate_limit(),
            rate_window_secs: default_rate_window_secs(),
        }
    }
}

const fn default_rate_limit() -> usize {
    100
}

const fn default_rate_window_secs() -> u64 {
    60
}

/// Sliding-window rate limiter.
///
/// Holds the timestamps of recent grants; a grant is admitted only while
/// fewer than `limit` timestamps fall inside the trailing window. The check
/// and the recording happen under one lock, so concurrent workers cannot
/// both take the last slot.
#[derive(Debug)]
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    grants: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            limit: config.rate_limit,
            window: Duration::from_secs(config.rate_window_secs),
            grants: Mutex::new(VecDeque::with_capacity(config.rate_limit)),
        }
    }

    /// Try to consume one delivery slot at `now`.
    ///
    /// Returns `true` and records the grant if the window has room, `false`
    /// otherwise. Never blocks.
    pub fn try_acquire(&self, now: Instant) -> bool {
        let mut grants = self
            .grants
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        Self::evict(&mut grants, self.window, now);

        if grants.len() < self.limit {
            grants.push_back(now);
            true
        } else {
            false
        }
    }

    /// How long a denied caller should wait before a slot can open up.
    ///
    /// Returns `Duration::ZERO` if a grant would succeed right now. The
    /// estimate is exact for the current set of grants; new grants made in
    /// the meantime can push it further out.
    pub fn time_until_available(&self, now: Instant) -> Duration {
        let mut grants = self
            .grants
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        Self::evict(&mut grants, self.window, now);

        if grants.len() < self.limit {
            return Duration::ZERO;
        }

        grants
            .front()
            .map_or(Duration::ZERO, |oldest| (*oldest + self.window) - now)
    }

    fn evict(grants: &mut VecDeque<Instant>, window: Duration, now: Instant) {
        while let Some(oldest) = grants.front() {
            if now.duration_since(*oldest) >= window {
                grants.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(limit: usize, window_secs: u64) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            rate_limit: limit,
            rate_window_secs: window_secs,
        })
    }

    #[test]
    fn test_burst_is_capped_at_limit() {
        let limiter = limiter(10, 60);
        let start = Instant::now();

        // 15 acquisitions inside one second: exactly 10 may pass
        let granted = (0u64..15)
            .filter(|i| limiter.try_acquire(start + Duration::from_millis(i * 60)))
            .count();

        assert_eq!(granted, 10);
    }

    #[test]
    fn test_slot_opens_when_window_elapses() {
        let limiter = limiter(10, 60);
        let start = Instant::now();

        for _ in 0..10 {
            assert!(limiter.try_acquire(start));
        }
        assert!(!limiter.try_acquire(start + Duration::from_secs(59)));

        // The first grant ages out of the trailing window
        assert!(limiter.try_acquire(start + Duration::from_secs(61)));
    }

    #[test]
    fn test_window_slides_rather_than_resets() {
        let limiter = limiter(2, 10);
        let start = Instant::now();

        assert!(limiter.try_acquire(start));
        assert!(limiter.try_acquire(start + Duration::from_secs(6)));

        // A fixed window restarting at t=10 would admit this; a sliding one
        // still sees two grants inside (t=2, t=12]
        assert!(!limiter.try_acquire(start + Duration::from_secs(9)));

        // At t=11 the grant from t=0 has aged out
        assert!(limiter.try_acquire(start + Duration::from_secs(11)));

        // Now grants at t=6 and t=11 occupy the window
        assert!(!limiter.try_acquire(start + Duration::from_secs(12)));
    }

    #[test]
    fn test_time_until_available() {
        let limiter = limiter(2, 10);
        let start = Instant::now();

        assert_eq!(limiter.time_until_available(start), Duration::ZERO);

        assert!(limiter.try_acquire(start));
        assert!(limiter.try_acquire(start + Duration::from_secs(3)));

        // Full: the oldest grant (t=0) frees its slot at t=10
        assert_eq!(
            limiter.time_until_available(start + Duration::from_secs(4)),
            Duration::from_secs(6)
        );

        assert_eq!(
            limiter.time_until_available(start + Duration::from_secs(10)),
            Duration::ZERO
        );
    }

    #[test]
    fn test_concurrent_acquires_never_exceed_limit() {
        let limiter = std::sync::Arc::new(limiter(10, 60));
        let now = Instant::now();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let limiter = std::sync::Arc::clone(&limiter);
                std::thread::spawn(move || (0..10).filter(|_| limiter.try_acquire(now)).count())
            })
            .collect();

        let granted: usize = handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or(0))
            .sum();

        assert_eq!(granted, 10);
    }
}
