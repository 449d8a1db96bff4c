// crates/nimbus-core/src/tool.rs
// ============================================================================
// Module: Tool Abstraction
// Description: Named units of work exposed to MCP clients.
// Purpose: Describe tools by capability set instead of inheritance.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! A [`Tool`] is an opaque named unit of work: a name, a human description,
//! an input schema, and an execute entry point. Tools are immutable after
//! registration and unique by name within a registry. The pipeline treats
//! execution bodies as opaque; cross-cutting behavior lives in middleware.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::error::ToolError;

// ============================================================================
// SECTION: Tool Trait
// ============================================================================

/// Result type for tool execution.
pub type ToolResult = Result<Value, ToolError>;

/// A named, schema-described operation exposed to the LLM.
pub trait Tool: Send + Sync {
    /// Returns the unique tool name.
    fn name(&self) -> &str;

    /// Returns the human-readable description.
    fn description(&self) -> &str;

    /// Returns the JSON input schema for the tool.
    fn input_schema(&self) -> Value;

    /// Validates parameters before execution.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::ParamValidation`] when the parameters are
    /// rejected. The default accepts everything; schema enforcement happens
    /// in the pipeline terminal.
    fn validate(&self, params: &Value) -> Result<(), ToolError> {
        let _ = params;
        Ok(())
    }

    /// Executes the tool.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError`] when execution fails.
    fn execute(&self, ctx: &ExecutionContext, params: &Value) -> ToolResult;

    /// Returns the transport-facing definition for this tool.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

// ============================================================================
// SECTION: Tool Definition
// ============================================================================

/// Transport-facing tool descriptor.
///
/// # Invariants
/// - `name` matches the registered tool name exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Opaque JSON input schema.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

// ============================================================================
// SECTION: Closure Tool
// ============================================================================

/// Execute body for a [`FnTool`].
type ExecuteFn = dyn Fn(&ExecutionContext, &Value) -> ToolResult + Send + Sync;

/// Tool built from a closure, used for small built-in tools and tests.
pub struct FnTool {
    /// Unique tool name.
    name: String,
    /// Human-readable description.
    description: String,
    /// Opaque JSON input schema.
    schema: Value,
    /// Execution body.
    body: Box<ExecuteFn>,
}

impl FnTool {
    /// Builds a closure-backed tool.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: Value,
        body: impl Fn(&ExecutionContext, &Value) -> ToolResult + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            body: Box::new(body),
        }
    }
}

impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        self.schema.clone()
    }

    fn execute(&self, ctx: &ExecutionContext, params: &Value) -> ToolResult {
        (self.body)(ctx, params)
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

    use serde_json::json;

    use super::FnTool;
    use super::Tool;
    use crate::context::ExecutionContext;

    #[test]
    fn definition_mirrors_the_tool() {
        let tool = FnTool::new("echo", "Echoes parameters.", json!({"type": "object"}), |_, p| {
            Ok(p.clone())
        });
        let definition = tool.definition();
        assert_eq!(definition.name, "echo");
        assert_eq!(definition.input_schema, json!({"type": "object"}));

        let ctx = ExecutionContext::new("req-1", "echo");
        let result = tool.execute(&ctx, &json!({"k": 1})).unwrap();
        assert_eq!(result, json!({"k": 1}));
    }
}
