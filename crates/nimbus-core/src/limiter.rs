// crates/nimbus-core/src/limiter.rs
// ============================================================================
// Module: Rate Limiters
// Description: Token-bucket and sliding-window admission control.
// Purpose: Decide whether a key may proceed now, else report a wait.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Two interchangeable admission strategies keyed by an opaque scope string.
//! `reserve` never sleeps; it returns the wait until the next permit so the
//! caller decides whether to fail fast or back off. Key tables sit behind a
//! single mutex per limiter, acceptable because `reserve` is O(1).
//!
//! ## Invariants
//! - Token bucket: `0 <= tokens <= capacity` for every bucket.
//! - Sliding window: every retained timestamp satisfies `now - t < window`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Admission control keyed by an opaque scope string.
pub trait RateLimiter: Send + Sync {
    /// Reserves a permit for `key`.
    ///
    /// Returns [`Duration::ZERO`] when the permit was granted, otherwise the
    /// time until the next permit becomes available. Never sleeps.
    fn reserve(&self, key: &str) -> Duration;

    /// Returns true when a permit was granted for `key`.
    fn allow(&self, key: &str) -> bool {
        self.reserve(key).is_zero()
    }

    /// Drops all state for `key`.
    fn reset(&self, key: &str);
}

// ============================================================================
// SECTION: Token Bucket
// ============================================================================

/// Per-key token bucket state.
///
/// # Invariants
/// - `tokens <= capacity` at all times.
#[derive(Debug, Clone, Copy)]
struct Bucket {
    /// Whole tokens currently available.
    tokens: u64,
    /// Instant of the last refill that added at least one token.
    last_refill: Instant,
}

/// Token-bucket rate limiter.
///
/// Buckets start full. Refill is proportional to elapsed time: `rate` tokens
/// per `window`, capped at `capacity`.
pub struct TokenBucketLimiter {
    /// Tokens added per window.
    rate: u64,
    /// Refill window.
    window: Duration,
    /// Maximum tokens a bucket can hold.
    capacity: u64,
    /// Per-key bucket table.
    buckets: Mutex<BTreeMap<String, Bucket>>,
}

impl TokenBucketLimiter {
    /// Creates a limiter with `capacity` defaulting to `rate`.
    ///
    /// A zero `rate` or zero `window` is clamped to one to keep the refill
    /// arithmetic total.
    #[must_use]
    pub fn new(rate: u64, window: Duration) -> Self {
        Self::with_capacity(rate, window, rate)
    }

    /// Creates a limiter with an explicit bucket capacity.
    #[must_use]
    pub fn with_capacity(rate: u64, window: Duration, capacity: u64) -> Self {
        let rate = rate.max(1);
        let window = if window.is_zero() { Duration::from_secs(1) } else { window };
        Self {
            rate,
            window,
            capacity: capacity.max(1),
            buckets: Mutex::new(BTreeMap::new()),
        }
    }

    /// Returns the interval between single-token refills.
    fn token_interval(&self) -> Duration {
        let nanos = self.window.as_nanos() / u128::from(self.rate);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    /// Adds accrued tokens to the bucket, keeping the capacity invariant.
    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        let elapsed = now.saturating_duration_since(bucket.last_refill);
        let to_add = elapsed.as_nanos() * u128::from(self.rate) / self.window.as_nanos();
        if to_add > 0 {
            let to_add = u64::try_from(to_add).unwrap_or(u64::MAX);
            bucket.tokens = bucket.tokens.saturating_add(to_add).min(self.capacity);
            bucket.last_refill = now;
        }
    }
}

impl RateLimiter for TokenBucketLimiter {
    fn reserve(&self, key: &str) -> Duration {
        let now = Instant::now();
        let Ok(mut buckets) = self.buckets.lock() else {
            return self.token_interval();
        };
        let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
            tokens: self.capacity,
            last_refill: now,
        });
        self.refill(bucket, now);
        if bucket.tokens >= 1 {
            bucket.tokens -= 1;
            return Duration::ZERO;
        }
        self.token_interval()
    }

    fn reset(&self, key: &str) {
        if let Ok(mut buckets) = self.buckets.lock() {
            buckets.remove(key);
        }
    }
}

// ============================================================================
// SECTION: Sliding Window
// ============================================================================

/// Sliding-window rate limiter.
///
/// Keeps the admission timestamps inside the window per key; a new request is
/// admitted while fewer than `limit` timestamps remain.
pub struct SlidingWindowLimiter {
    /// Maximum admissions per window.
    limit: usize,
    /// Window length.
    window: Duration,
    /// Per-key admission timestamps, oldest first.
    windows: Mutex<BTreeMap<String, VecDeque<Instant>>>,
}

impl SlidingWindowLimiter {
    /// Creates a limiter admitting `limit` requests per `window`.
    #[must_use]
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit: limit.max(1),
            window: if window.is_zero() { Duration::from_secs(1) } else { window },
            windows: Mutex::new(BTreeMap::new()),
        }
    }
}

impl RateLimiter for SlidingWindowLimiter {
    fn reserve(&self, key: &str) -> Duration {
        let now = Instant::now();
        let Ok(mut windows) = self.windows.lock() else {
            return self.window;
        };
        let timestamps = windows.entry(key.to_string()).or_default();
        while let Some(oldest) = timestamps.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }
        if timestamps.len() < self.limit {
            timestamps.push_back(now);
            return Duration::ZERO;
        }
        timestamps.front().map_or(Duration::ZERO, |oldest| {
            (*oldest + self.window).saturating_duration_since(now)
        })
    }

    fn reset(&self, key: &str) {
        if let Ok(mut windows) = self.windows.lock() {
            windows.remove(key);
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only panic-based assertions."
    )]

    use std::time::Duration;

    use super::RateLimiter;
    use super::SlidingWindowLimiter;
    use super::TokenBucketLimiter;

    #[test]
    fn bucket_exhausts_and_reports_wait() {
        let limiter = TokenBucketLimiter::new(2, Duration::from_secs(1));
        assert!(limiter.allow("per_tool:list_instances"));
        assert!(limiter.allow("per_tool:list_instances"));
        let wait = limiter.reserve("per_tool:list_instances");
        assert!(!wait.is_zero());
        assert!(wait <= Duration::from_millis(500));
    }

    #[test]
    fn bucket_refills_one_token_after_window_share() {
        let limiter = TokenBucketLimiter::new(2, Duration::from_millis(100));
        assert!(limiter.allow("k"));
        assert!(limiter.allow("k"));
        assert!(!limiter.allow("k"));
        // One token accrues per half window.
        std::thread::sleep(Duration::from_millis(60));
        assert!(limiter.allow("k"));
        assert!(!limiter.allow("k"));
    }

    #[test]
    fn bucket_keys_are_independent() {
        let limiter = TokenBucketLimiter::new(1, Duration::from_secs(1));
        assert!(limiter.allow("a"));
        assert!(limiter.allow("b"));
        assert!(!limiter.allow("a"));
    }

    #[test]
    fn reset_restores_full_capacity() {
        let limiter = TokenBucketLimiter::new(1, Duration::from_secs(1));
        assert!(limiter.allow("a"));
        assert!(!limiter.allow("a"));
        limiter.reset("a");
        assert!(limiter.allow("a"));
    }

    #[test]
    fn window_admits_up_to_limit() {
        let limiter = SlidingWindowLimiter::new(3, Duration::from_secs(1));
        assert!(limiter.allow("k"));
        assert!(limiter.allow("k"));
        assert!(limiter.allow("k"));
        let wait = limiter.reserve("k");
        assert!(!wait.is_zero());
        assert!(wait <= Duration::from_secs(1));
    }

    #[test]
    fn window_slides_as_entries_expire() {
        let limiter = SlidingWindowLimiter::new(2, Duration::from_millis(50));
        assert!(limiter.allow("k"));
        assert!(limiter.allow("k"));
        assert!(!limiter.allow("k"));
        std::thread::sleep(Duration::from_millis(60));
        assert!(limiter.allow("k"));
    }
}
