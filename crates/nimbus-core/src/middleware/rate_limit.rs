// crates/nimbus-core/src/middleware/rate_limit.rs
// ============================================================================
// Module: Rate Limit Middleware
// Description: Admission control layers over the pluggable rate limiters.
// Purpose: Derive limiter keys per invocation and fail fast on exhaustion.
// Dependencies: nimbus-core::{chain, limiter, error}
// ============================================================================

//! ## Overview
//! The plain layer derives a limiter key from the configured strategy and
//! fails with a wait hint when the limiter refuses the invocation. The
//! adaptive layer consults an external load signal: above the threshold the
//! key moves into a stricter load band and rejections surface as
//! [`ToolError::SystemLoadHigh`]. Neither layer ever sleeps.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;

use serde_json::Value;

use crate::chain::Middleware;
use crate::chain::Next;
use crate::chain::PRIORITY_RATE_LIMIT;
use crate::context::ExecutionContext;
use crate::error::ToolError;
use crate::limiter::RateLimiter;
use crate::tool::Tool;
use crate::tool::ToolResult;

// ============================================================================
// SECTION: Key Strategies
// ============================================================================

/// Limiter key derivation strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyStrategy {
    /// One bucket per tool name.
    #[default]
    PerTool,
    /// One bucket per user and tool; falls back to per-tool without a user.
    PerUser,
    /// One bucket per provider and tool; falls back to per-tool without a
    /// provider.
    PerProvider,
    /// One bucket per user, provider, and tool.
    PerUserProvider,
    /// A single global bucket.
    Global,
}

impl KeyStrategy {
    /// Parses a strategy name, defaulting to per-tool.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "per_user" => Self::PerUser,
            "per_provider" => Self::PerProvider,
            "per_user_provider" => Self::PerUserProvider,
            "global" => Self::Global,
            _ => Self::PerTool,
        }
    }

    /// Derives the limiter key for an invocation.
    #[must_use]
    pub fn key(self, ctx: &ExecutionContext) -> String {
        let tool = ctx.tool_name();
        match self {
            Self::PerTool => tool.to_string(),
            Self::PerUser => ctx
                .user_id()
                .map_or_else(|| tool.to_string(), |user| format!("{user}:{tool}")),
            Self::PerProvider => ctx
                .provider()
                .map_or_else(|| tool.to_string(), |provider| format!("{provider}:{tool}")),
            Self::PerUserProvider => match (ctx.user_id(), ctx.provider()) {
                (Some(user), Some(provider)) => format!("{user}:{provider}:{tool}"),
                (Some(user), None) => format!("{user}:{tool}"),
                (None, Some(provider)) => format!("{provider}:{tool}"),
                (None, None) => tool.to_string(),
            },
            Self::Global => "global".to_string(),
        }
    }
}

// ============================================================================
// SECTION: Rate Limit Middleware
// ============================================================================

/// Chain layer that rejects invocations refused by the limiter.
pub struct RateLimitMiddleware {
    /// Admission strategy.
    limiter: Arc<dyn RateLimiter>,
    /// Key derivation strategy.
    strategy: KeyStrategy,
}

impl RateLimitMiddleware {
    /// Creates the layer with the given limiter and key strategy.
    #[must_use]
    pub fn new(limiter: Arc<dyn RateLimiter>, strategy: KeyStrategy) -> Self {
        Self {
            limiter,
            strategy,
        }
    }
}

impl Middleware for RateLimitMiddleware {
    fn name(&self) -> &str {
        "rate_limit"
    }

    fn priority(&self) -> i32 {
        PRIORITY_RATE_LIMIT
    }

    fn execute(
        &self,
        ctx: &ExecutionContext,
        tool: &dyn Tool,
        params: &Value,
        next: Next<'_>,
    ) -> ToolResult {
        let key = self.strategy.key(ctx);
        let wait = self.limiter.reserve(&key);
        if !wait.is_zero() {
            return Err(ToolError::RateLimited {
                tool: ctx.tool_name().to_string(),
                retry_after: wait,
            });
        }
        next(ctx, tool, params)
    }
}

// ============================================================================
// SECTION: Load Signal
// ============================================================================

/// Externally supplied system-load signal in `[0, 1]` and beyond.
pub trait LoadSignal: Send + Sync {
    /// Returns the current load reading.
    fn load(&self) -> f64;
}

/// Mutable load signal for wiring and tests.
#[derive(Debug, Default)]
pub struct SharedLoad {
    /// Current load reading.
    value: Mutex<f64>,
}

impl SharedLoad {
    /// Creates a signal at the given load.
    #[must_use]
    pub fn new(value: f64) -> Self {
        Self {
            value: Mutex::new(value),
        }
    }

    /// Updates the load reading.
    pub fn set(&self, value: f64) {
        if let Ok(mut guard) = self.value.lock() {
            *guard = value;
        }
    }
}

impl LoadSignal for SharedLoad {
    fn load(&self) -> f64 {
        self.value.lock().map(|guard| *guard).unwrap_or(1.0)
    }
}

// ============================================================================
// SECTION: Adaptive Middleware
// ============================================================================

/// Chain layer that tightens admission as system load rises.
///
/// The limiter key is prefixed with a 0–10 load band, so higher load lands
/// in a fresh, stricter bucket. Rejections scale the reported wait by the
/// load overshoot and surface as [`ToolError::SystemLoadHigh`].
pub struct AdaptiveRateLimitMiddleware {
    /// Admission strategy.
    limiter: Arc<dyn RateLimiter>,
    /// Key derivation strategy.
    strategy: KeyStrategy,
    /// External load signal.
    signal: Arc<dyn LoadSignal>,
    /// Load above which rejections become load-shedding failures.
    threshold: f64,
}

impl AdaptiveRateLimitMiddleware {
    /// Default load threshold.
    pub const DEFAULT_THRESHOLD: f64 = 0.8;

    /// Creates the layer with the default threshold.
    #[must_use]
    pub fn new(
        limiter: Arc<dyn RateLimiter>,
        strategy: KeyStrategy,
        signal: Arc<dyn LoadSignal>,
    ) -> Self {
        Self::with_threshold(limiter, strategy, signal, Self::DEFAULT_THRESHOLD)
    }

    /// Creates the layer with an explicit threshold.
    #[must_use]
    pub fn with_threshold(
        limiter: Arc<dyn RateLimiter>,
        strategy: KeyStrategy,
        signal: Arc<dyn LoadSignal>,
        threshold: f64,
    ) -> Self {
        Self {
            limiter,
            strategy,
            signal,
            threshold,
        }
    }
}

impl Middleware for AdaptiveRateLimitMiddleware {
    fn name(&self) -> &str {
        "adaptive_rate_limit"
    }

    fn priority(&self) -> i32 {
        PRIORITY_RATE_LIMIT
    }

    fn execute(
        &self,
        ctx: &ExecutionContext,
        tool: &dyn Tool,
        params: &Value,
        next: Next<'_>,
    ) -> ToolResult {
        let load = self.signal.load().clamp(0.0, 10.0);
        let band = load_band(load);
        let key = format!("load{band}:{}", self.strategy.key(ctx));
        let wait = self.limiter.reserve(&key);
        if !wait.is_zero() {
            let wait =
                if load > self.threshold { wait.mul_f64(load - self.threshold) } else { wait };
            return Err(ToolError::SystemLoadHigh(format!(
                "load {load:.2} rejected {}; retry after {wait:?}",
                ctx.tool_name()
            )));
        }
        next(ctx, tool, params)
    }
}

/// Maps a load reading onto the 0–10 band used for key bucketing.
fn load_band(load: f64) -> u8 {
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "Input is clamped to [0, 10] before scaling."
    )]
    let band = (load * 10.0).clamp(0.0, 10.0) as u8;
    band
}

// ============================================================================
// SECTION: Tests
// ============================================================================
