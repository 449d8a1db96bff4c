// crates/nimbus-core/src/middleware/metrics.rs
// ============================================================================
// Module: Metrics Middleware
// Description: Execution counters, latency timings, and error taxonomy.
// Purpose: Emit one consistent metric set per tool invocation.
// Dependencies: nimbus-core::{chain, observe, error}
// ============================================================================

//! ## Overview
//! Emits started/completed/failed counters, a parameter-count histogram, an
//! execution-duration timing, an error counter labeled by taxonomy, and a
//! performance-category counter. Every series carries tool, provider, and
//! (when known) user tags. The layer observes errors for labeling but never
//! swallows them; cancelled invocations still record their terminal outcome.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::chain::Middleware;
use crate::chain::Next;
use crate::chain::PRIORITY_METRICS;
use crate::context::ExecutionContext;
use crate::observe::MetricTags;
use crate::observe::MetricsSink;
use crate::tool::Tool;
use crate::tool::ToolResult;

// ============================================================================
// SECTION: Middleware
// ============================================================================

/// Chain layer that emits the per-invocation metric set.
pub struct MetricsMiddleware {
    /// Downstream metrics sink.
    sink: Arc<dyn MetricsSink>,
}

impl MetricsMiddleware {
    /// Creates the layer with the given sink.
    #[must_use]
    pub fn new(sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            sink,
        }
    }

    /// Builds the base tag set for an invocation.
    fn tags(ctx: &ExecutionContext) -> MetricTags {
        let mut tags = MetricTags::new();
        tags.insert("tool".to_string(), ctx.tool_name().to_string());
        if let Some(provider) = ctx.provider() {
            tags.insert("provider".to_string(), provider.to_string());
        }
        if let Some(user_id) = ctx.user_id() {
            tags.insert("user_id".to_string(), user_id.to_string());
        }
        tags
    }
}

impl Middleware for MetricsMiddleware {
    fn name(&self) -> &str {
        "metrics"
    }

    fn priority(&self) -> i32 {
        PRIORITY_METRICS
    }

    fn execute(
        &self,
        ctx: &ExecutionContext,
        tool: &dyn Tool,
        params: &Value,
        next: Next<'_>,
    ) -> ToolResult {
        let tags = Self::tags(ctx);
        self.sink.counter("tool.executions.started", 1, &tags);
        #[allow(
            clippy::cast_precision_loss,
            reason = "Parameter counts are tiny integers."
        )]
        self.sink.histogram(
            "tool.parameters.count",
            params.as_object().map_or(0, serde_json::Map::len) as f64,
            &tags,
        );

        let result = next(ctx, tool, params);
        let duration = ctx.elapsed();
        self.sink.timing("tool.execution.duration", duration, &tags);

        match &result {
            Ok(_) => {
                self.sink.counter("tool.executions.completed", 1, &tags);
            }
            Err(err) => {
                self.sink.counter("tool.executions.failed", 1, &tags);
                let mut error_tags = tags.clone();
                error_tags.insert("error_type".to_string(), err.metrics_label().to_string());
                self.sink.counter("tool.errors", 1, &error_tags);
            }
        }

        let mut perf_tags = tags;
        perf_tags.insert("category".to_string(), performance_category(duration).to_string());
        self.sink.counter("tool.performance.category", 1, &perf_tags);
        result
    }
}

/// Buckets a duration into the performance category label set.
#[must_use]
pub fn performance_category(duration: Duration) -> &'static str {
    if duration < Duration::from_millis(100) {
        "fast"
    } else if duration < Duration::from_secs(1) {
        "normal"
    } else if duration < Duration::from_secs(5) {
        "slow"
    } else {
        "very_slow"
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
