//! Rate limiter property-based tests.
//!
//! ## Purpose
//! These tests fuzz limiter parameters and call patterns to ensure admission
//! control never panics and never admits more than its configured budget in
//! a burst.
//!
//! ## What is covered
//! - Random rates, windows, and capacities admit at most `capacity` calls
//!   back to back.
//! - Sliding windows admit at most `limit` calls back to back.
//! - Hostile keys are handled without panic.
//!
//! ## What is intentionally out of scope
//! - Refill timing (covered by unit tests with real sleeps).
// crates/nimbus-core/tests/proptest_limiter.rs
// ============================================================================
// Module: Rate Limiter Property-Based Tests
// Description: Fuzz-like checks for admission budgets.
// Purpose: Ensure limiters fail closed without panics on adversarial inputs.
// ============================================================================

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::time::Duration;

use nimbus_core::RateLimiter;
use nimbus_core::SlidingWindowLimiter;
use nimbus_core::TokenBucketLimiter;
use proptest::prelude::*;

proptest! {
    #[test]
    fn bucket_burst_never_exceeds_capacity(
        rate in 1u64..50,
        capacity in 1u64..50,
        window_ms in 50u64..5_000,
        key in ".{0,64}",
    ) {
        let limiter = TokenBucketLimiter::with_capacity(
            rate,
            Duration::from_millis(window_ms),
            capacity,
        );
        let admitted = (0..capacity + 20).filter(|_| limiter.allow(&key)).count();
        let admitted = u64::try_from(admitted).unwrap_or(u64::MAX);
        // A fast burst can pick up at most one refilled token on slow clocks.
        prop_assert!(admitted <= capacity + 1);
        prop_assert!(admitted >= 1);
    }

    #[test]
    fn window_burst_never_exceeds_limit(
        limit in 1usize..50,
        window_ms in 50u64..5_000,
        key in ".{0,64}",
    ) {
        let limiter = SlidingWindowLimiter::new(limit, Duration::from_millis(window_ms));
        let admitted = (0..limit + 20).filter(|_| limiter.allow(&key)).count();
        prop_assert!(admitted <= limit + 1);
    }

    #[test]
    fn rejected_calls_report_bounded_waits(
        rate in 1u64..10,
        window_ms in 100u64..2_000,
    ) {
        let limiter = TokenBucketLimiter::new(rate, Duration::from_millis(window_ms));
        for _ in 0..rate {
            let _ = limiter.allow("k");
        }
        let wait = limiter.reserve("k");
        prop_assert!(wait <= Duration::from_millis(window_ms));
    }
}
