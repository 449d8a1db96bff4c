// crates/nimbus-core/src/middleware/retry.rs
// ============================================================================
// Module: Retry Middleware
// Description: Replays transient failures with capped exponential backoff.
// Purpose: Absorb flaky provider calls without hammering the backend.
// Dependencies: nimbus-core::{chain, context, error}
// ============================================================================

//! ## Overview
//! Attempts run up to `max_retries + 1` times. Classification prefers the
//! structured error kind and falls back to message fragments for opaque
//! failures (see [`crate::error`]). Backoff waits park on the invocation's
//! cancellation token, so a cancelled context abandons the wait promptly and
//! surfaces [`ToolError::Cancelled`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use serde_json::Value;

use crate::chain::Middleware;
use crate::chain::Next;
use crate::chain::PRIORITY_RETRY;
use crate::context::ExecutionContext;
use crate::error::ToolError;
use crate::tool::Tool;
use crate::tool::ToolResult;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Retry tuning parameters.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// First backoff delay.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Multiplier applied per attempt.
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
        }
    }
}

impl RetryConfig {
    /// Returns the backoff delay for a zero-based attempt index.
    ///
    /// Computed in float seconds and capped before conversion, so large
    /// attempt counts saturate at `max_delay` instead of overflowing.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_factor.max(1.0).powi(i32::try_from(attempt).unwrap_or(i32::MAX));
        let capped = (self.base_delay.as_secs_f64() * factor).min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }
}

// ============================================================================
// SECTION: Middleware
// ============================================================================

/// Chain layer that retries transient failures.
pub struct RetryMiddleware {
    /// Backoff tuning.
    config: RetryConfig,
}

impl RetryMiddleware {
    /// Creates the layer with the given configuration.
    #[must_use]
    pub const fn new(config: RetryConfig) -> Self {
        Self {
            config,
        }
    }
}

impl Middleware for RetryMiddleware {
    fn name(&self) -> &str {
        "retry"
    }

    fn priority(&self) -> i32 {
        PRIORITY_RETRY
    }

    fn execute(
        &self,
        ctx: &ExecutionContext,
        tool: &dyn Tool,
        params: &Value,
        next: Next<'_>,
    ) -> ToolResult {
        let mut attempt = 0;
        loop {
            if ctx.cancel_token().is_cancelled() {
                return Err(ToolError::Cancelled(format!(
                    "{} cancelled before attempt {attempt}",
                    ctx.tool_name()
                )));
            }
            match next(ctx, tool, params) {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if matches!(err, ToolError::Cancelled(_)) {
                        return Err(err);
                    }
                    if !err.is_retryable() || attempt == self.config.max_retries {
                        return Err(wrap_exhausted(err, attempt));
                    }
                    let delay = self.config.delay_for(attempt);
                    if ctx.cancel_token().wait_timeout(delay) {
                        return Err(ToolError::Cancelled(format!(
                            "{} cancelled during retry backoff: {err}",
                            ctx.tool_name()
                        )));
                    }
                    attempt += 1;
                }
            }
        }
    }
}

/// Wraps the final error with the attempt count, preserving the variant.
fn wrap_exhausted(err: ToolError, attempt: u32) -> ToolError {
    let attempts = attempt + 1;
    match err {
        ToolError::Retryable(message) => {
            ToolError::Retryable(format!("{message} (after {attempts} attempts)"))
        }
        ToolError::NonRetryable(message) if attempt > 0 => {
            ToolError::NonRetryable(format!("{message} (after {attempts} attempts)"))
        }
        other => other,
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

    use std::sync::Arc;
    use std::sync::atomic::AtomicU32;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use std::time::Instant;

    use serde_json::json;

    use super::RetryConfig;
    use super::RetryMiddleware;
    use crate::chain::MiddlewareChain;
    use crate::context::ExecutionContext;
    use crate::error::ToolError;
    use crate::tool::FnTool;
    use crate::tool::ToolResult;

    /// Fast backoff for tests.
    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            backoff_factor: 2.0,
        }
    }

    /// Runs one invocation through a retry-only chain.
    fn invoke(config: RetryConfig, tool: &FnTool, ctx: &ExecutionContext) -> ToolResult {
        let chain = MiddlewareChain::new();
        chain.add(Arc::new(RetryMiddleware::new(config))).unwrap();
        chain.execute(ctx, tool, &json!({}), &|ctx, tool, params| tool.execute(ctx, params))
    }

    #[test]
    fn transient_failure_then_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let tool = FnTool::new("flaky", "Fails once.", json!({"type": "object"}), move |_, _| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ToolError::NonRetryable("network timeout".to_string()))
            } else {
                Ok(json!("success"))
            }
        });
        let ctx = ExecutionContext::new("r1", "flaky");
        let started = Instant::now();
        let result = invoke(fast_config(2), &tool, &ctx).unwrap();
        assert_eq!(result, json!("success"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn non_retryable_is_invoked_exactly_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let tool = FnTool::new("denied", "Always denied.", json!({"type": "object"}), move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(ToolError::NonRetryable("unauthorized".to_string()))
        });
        let ctx = ExecutionContext::new("r1", "denied");
        let err = invoke(fast_config(3), &tool, &ctx).unwrap_err();
        assert!(matches!(err, ToolError::NonRetryable(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn exhaustion_reports_attempt_count() {
        let tool = FnTool::new("down", "Always down.", json!({"type": "object"}), |_, _| {
            Err(ToolError::Retryable("connection refused".to_string()))
        });
        let ctx = ExecutionContext::new("r1", "down");
        let err = invoke(fast_config(2), &tool, &ctx).unwrap_err();
        match err {
            ToolError::Retryable(message) => assert!(message.contains("after 3 attempts")),
            other => panic!("expected retryable, got {other}"),
        }
    }

    #[test]
    fn backoff_delays_grow_and_cap() {
        let config = RetryConfig {
            max_retries: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            backoff_factor: 2.0,
        };
        assert_eq!(config.delay_for(0), Duration::from_millis(100));
        assert_eq!(config.delay_for(1), Duration::from_millis(200));
        assert_eq!(config.delay_for(2), Duration::from_millis(350));
        assert_eq!(config.delay_for(5), Duration::from_millis(350));
    }

    #[test]
    fn cancellation_interrupts_backoff() {
        let tool = FnTool::new("slow", "Always times out.", json!({"type": "object"}), |_, _| {
            Err(ToolError::Retryable("timeout".to_string()))
        });
        let ctx = ExecutionContext::new("r1", "slow");
        let cancel = ctx.cancel_token().clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            cancel.cancel();
        });
        let config = RetryConfig {
            max_retries: 5,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(5),
            backoff_factor: 1.0,
        };
        let started = Instant::now();
        let err = invoke(config, &tool, &ctx).unwrap_err();
        handle.join().unwrap();
        assert!(matches!(err, ToolError::Cancelled(_)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
