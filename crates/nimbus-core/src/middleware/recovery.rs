// crates/nimbus-core/src/middleware/recovery.rs
// ============================================================================
// Module: Recovery Middleware
// Description: Converts panics in inner layers into typed errors.
// Purpose: Keep a panicking tool from unwinding across the chain boundary.
// Dependencies: nimbus-core::{chain, context, error}
// ============================================================================

//! ## Overview
//! Runs the continuation under an unwind guard. A panic anywhere below this
//! layer becomes a [`ToolError::Panic`] tagged with the request id, tool
//! name, and the captured payload; the invocation returns normally.
//!
//! ## Invariants
//! - This layer sits outermost (lowest priority) so nothing above it can
//!   observe an unwind.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::panic::AssertUnwindSafe;
use std::panic::catch_unwind;

use serde_json::Value;

use crate::chain::Middleware;
use crate::chain::Next;
use crate::chain::PRIORITY_RECOVERY;
use crate::context::ExecutionContext;
use crate::error::ToolError;
use crate::tool::Tool;
use crate::tool::ToolResult;

// ============================================================================
// SECTION: Middleware
// ============================================================================

/// Chain layer that captures panics from inner layers.
#[derive(Default)]
pub struct RecoveryMiddleware;

impl RecoveryMiddleware {
    /// Creates the recovery layer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Middleware for RecoveryMiddleware {
    fn name(&self) -> &str {
        "recovery"
    }

    fn priority(&self) -> i32 {
        PRIORITY_RECOVERY
    }

    fn execute(
        &self,
        ctx: &ExecutionContext,
        tool: &dyn Tool,
        params: &Value,
        next: Next<'_>,
    ) -> ToolResult {
        let outcome = catch_unwind(AssertUnwindSafe(|| next(ctx, tool, params)));
        match outcome {
            Ok(result) => result,
            Err(payload) => Err(ToolError::Panic {
                tool: ctx.tool_name().to_string(),
                request_id: ctx.request_id().to_string(),
                payload: describe_payload(payload.as_ref()),
            }),
        }
    }
}

/// Renders a panic payload as text.
fn describe_payload(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "non-string panic payload".to_string()
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
        reason = "Test-only panics exercise the unwind guard."
    )]

    use std::sync::Arc;

    use serde_json::json;

    use super::RecoveryMiddleware;
    use crate::chain::MiddlewareChain;
    use crate::context::ExecutionContext;
    use crate::error::ToolError;
    use crate::tool::FnTool;

    #[test]
    fn panicking_tool_yields_typed_error() {
        let chain = MiddlewareChain::new();
        chain.add(Arc::new(RecoveryMiddleware::new())).unwrap();
        let tool = FnTool::new("explode", "Panics.", json!({"type": "object"}), |_, _| {
            panic!("boom: index out of bounds")
        });
        let ctx = ExecutionContext::new("req-9", "explode");
        let err = chain
            .execute(&ctx, &tool, &json!({}), &|ctx, tool, params| tool.execute(ctx, params))
            .unwrap_err();
        match err {
            ToolError::Panic {
                tool,
                request_id,
                payload,
            } => {
                assert_eq!(tool, "explode");
                assert_eq!(request_id, "req-9");
                assert!(payload.contains("boom"));
            }
            other => panic!("expected panic error, got {other}"),
        }
    }

    #[test]
    fn healthy_tools_pass_through() {
        let chain = MiddlewareChain::new();
        chain.add(Arc::new(RecoveryMiddleware::new())).unwrap();
        let tool = FnTool::new("calm", "Succeeds.", json!({"type": "object"}), |_, _| {
            Ok(json!("fine"))
        });
        let ctx = ExecutionContext::new("req-1", "calm");
        let result = chain
            .execute(&ctx, &tool, &json!({}), &|ctx, tool, params| tool.execute(ctx, params))
            .unwrap();
        assert_eq!(result, json!("fine"));
    }
}
