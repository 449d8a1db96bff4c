// crates/nimbus-mcp/src/front.rs
// ============================================================================
// Module: Pipeline Front
// Description: Bridges transport requests into the execution pipeline.
// Purpose: Map tool calls onto the chain and results onto MCP envelopes.
// Dependencies: nimbus-core
// ============================================================================

//! ## Overview
//! The front receives `(tool_name, arguments)` from a transport, runs the
//! invocation through the shared [`nimbus_core::ToolExecutor`], and shapes
//! the outcome into the MCP tool-call envelope. Unknown tools surface as a
//! typed error so the server can answer with the JSON-RPC method-not-found
//! code; every other failure becomes an `isError` envelope.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use nimbus_core::ErrorKind;
use nimbus_core::InvocationOptions;
use nimbus_core::ToolDefinition;
use nimbus_core::ToolError;
use nimbus_core::ToolExecutor;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Envelopes
// ============================================================================

/// One content block in a tool-call envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolContent {
    /// Textual tool output.
    Text {
        /// Rendered payload.
        text: String,
    },
}

/// MCP tool-call response envelope.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallEnvelope {
    /// Tool output content blocks.
    pub content: Vec<ToolContent>,
    /// Whether the call failed.
    #[serde(rename = "isError")]
    pub is_error: bool,
}

impl ToolCallEnvelope {
    /// Builds a success envelope from a JSON result.
    #[must_use]
    pub fn success(result: &Value) -> Self {
        let text = serde_json::to_string(result).unwrap_or_else(|_| "null".to_string());
        Self {
            content: vec![ToolContent::Text {
                text,
            }],
            is_error: false,
        }
    }

    /// Builds an error envelope from a pipeline failure.
    #[must_use]
    pub fn failure(err: &ToolError) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: err.to_string(),
            }],
            is_error: true,
        }
    }
}

// ============================================================================
// SECTION: Front
// ============================================================================

/// Transport-facing adapter over the execution pipeline.
pub struct PipelineFront {
    /// Shared pipeline entry.
    executor: Arc<ToolExecutor>,
}

impl PipelineFront {
    /// Creates the front over a shared executor.
    #[must_use]
    pub fn new(executor: Arc<ToolExecutor>) -> Self {
        Self {
            executor,
        }
    }

    /// Returns definitions for every registered tool.
    #[must_use]
    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        self.executor.registry().definitions()
    }

    /// Executes one tool call and shapes the MCP envelope.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::ToolNotFound`] so the transport can map it onto
    /// the JSON-RPC method-not-found code; every other failure is already
    /// folded into the envelope.
    pub fn call_tool(
        &self,
        name: &str,
        arguments: &Value,
        options: InvocationOptions,
    ) -> Result<ToolCallEnvelope, ToolError> {
        match self.executor.execute(name, arguments, options) {
            Ok(result) => Ok(ToolCallEnvelope::success(&result)),
            Err(err) if err.kind() == ErrorKind::ToolNotFound => Err(err),
            Err(err) => Ok(ToolCallEnvelope::failure(&err)),
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

    use std::sync::Arc;

    use nimbus_core::FnTool;
    use nimbus_core::InvocationOptions;
    use nimbus_core::MiddlewareChain;
    use nimbus_core::ToolError;
    use nimbus_core::ToolExecutor;
    use nimbus_core::ToolRegistry;
    use serde_json::json;

    use super::PipelineFront;
    use super::ToolContent;

    /// Front over one echo tool.
    fn front() -> PipelineFront {
        let registry = Arc::new(ToolRegistry::new());
        registry
            .register(Arc::new(FnTool::new(
                "echo",
                "Echoes.",
                json!({"type": "object"}),
                |_, params| Ok(params.clone()),
            )))
            .unwrap();
        PipelineFront::new(Arc::new(ToolExecutor::new(registry, Arc::new(MiddlewareChain::new()))))
    }

    #[test]
    fn success_envelope_carries_serialized_result() {
        let front = front();
        let envelope =
            front.call_tool("echo", &json!({"k": 1}), InvocationOptions::default()).unwrap();
        assert!(!envelope.is_error);
        let ToolContent::Text {
            text,
        } = &envelope.content[0];
        assert_eq!(text, "{\"k\":1}");
    }

    #[test]
    fn unknown_tools_surface_as_typed_errors() {
        let front = front();
        let err = front
            .call_tool("missing", &json!({}), InvocationOptions::default())
            .unwrap_err();
        assert!(matches!(err, ToolError::ToolNotFound(_)));
    }

    #[test]
    fn pipeline_failures_fold_into_error_envelopes() {
        let registry = Arc::new(ToolRegistry::new());
        registry
            .register(Arc::new(FnTool::new(
                "broken",
                "Fails.",
                json!({"type": "object"}),
                |_, _| Err(ToolError::NonRetryable("bad request".to_string())),
            )))
            .unwrap();
        let front = PipelineFront::new(Arc::new(ToolExecutor::new(
            registry,
            Arc::new(MiddlewareChain::new()),
        )));
        let envelope =
            front.call_tool("broken", &json!({}), InvocationOptions::default()).unwrap();
        assert!(envelope.is_error);
    }
}
