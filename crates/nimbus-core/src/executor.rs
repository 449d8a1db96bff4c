// crates/nimbus-core/src/executor.rs
// ============================================================================
// Module: Tool Executor
// Description: Invocation pipeline from lookup to terminal execution.
// Purpose: Build the execution context and fold the chain per invocation.
// Dependencies: nimbus-core::{registry, chain, context}, jsonschema
// ============================================================================

//! ## Overview
//! The executor is the pipeline entry used by every transport: look up the
//! tool, construct an [`ExecutionContext`], and run the middleware chain
//! around the terminal handler. The terminal enforces the tool's input
//! schema, runs the tool's own validation hook, and only then executes.
//! Compiled schema validators are cached per tool name, which is sound
//! because tools are immutable after registration.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::RwLock;

use jsonschema::Validator;
use serde_json::Value;

use crate::chain::MiddlewareChain;
use crate::context::CancelToken;
use crate::context::ExecutionContext;
use crate::context::RequestIdGenerator;
use crate::error::ToolError;
use crate::registry::ToolRegistry;
use crate::tool::Tool;
use crate::tool::ToolResult;

// ============================================================================
// SECTION: Invocation Options
// ============================================================================

/// Caller-supplied identity and cancellation for one invocation.
#[derive(Debug, Clone, Default)]
pub struct InvocationOptions {
    /// Caller identity when known.
    pub user_id: Option<String>,
    /// External cancellation token; a fresh token is used when absent.
    pub cancel: Option<CancelToken>,
}

// ============================================================================
// SECTION: Executor
// ============================================================================

/// Pipeline entry shared by every transport.
pub struct ToolExecutor {
    /// Authoritative tool owner.
    registry: Arc<ToolRegistry>,
    /// Cross-cutting middleware chain.
    chain: Arc<MiddlewareChain>,
    /// Request identifier source.
    ids: RequestIdGenerator,
    /// Provider tag applied to every context.
    provider: Option<String>,
    /// Compiled schema validators keyed by tool name.
    validators: RwLock<BTreeMap<String, Arc<Validator>>>,
}

impl ToolExecutor {
    /// Creates an executor over the given registry and chain.
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>, chain: Arc<MiddlewareChain>) -> Self {
        Self {
            registry,
            chain,
            ids: RequestIdGenerator::new("req"),
            provider: None,
            validators: RwLock::new(BTreeMap::new()),
        }
    }

    /// Returns a copy with the provider tag set.
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Returns the underlying registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Executes one tool invocation through the chain.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::ToolNotFound`] for unknown names, a validation
    /// error before the tool body runs, or whatever the chain surfaces. The
    /// outward error is enriched with invocation metadata.
    pub fn execute(&self, name: &str, arguments: &Value, options: InvocationOptions) -> ToolResult {
        let Some(tool) = self.registry.get(name) else {
            return Err(ToolError::ToolNotFound(name.to_string()));
        };
        let mut ctx = ExecutionContext::new(self.ids.issue(), name);
        if let Some(user_id) = options.user_id {
            ctx = ctx.with_user(user_id);
        }
        if let Some(provider) = &self.provider {
            ctx = ctx.with_provider(provider.clone());
        }
        if let Some(cancel) = options.cancel {
            ctx = ctx.with_cancel(cancel);
        }
        let terminal = |ctx: &ExecutionContext, tool: &dyn Tool, params: &Value| -> ToolResult {
            self.check_schema(tool, params)?;
            tool.validate(params)?;
            tool.execute(ctx, params)
        };
        let result = self.chain.execute(&ctx, tool.as_ref(), arguments, &terminal);
        result
            .map_err(|err| err.enrich(ctx.tool_name(), ctx.provider(), ctx.request_id()))
    }

    /// Validates parameters against the tool's input schema.
    fn check_schema(&self, tool: &dyn Tool, params: &Value) -> Result<(), ToolError> {
        let validator = self.validator_for(tool)?;
        if let Err(err) = validator.validate(params) {
            return Err(ToolError::ParamValidation(err.to_string()));
        }
        Ok(())
    }

    /// Returns the cached validator for a tool, compiling on first use.
    fn validator_for(&self, tool: &dyn Tool) -> Result<Arc<Validator>, ToolError> {
        if let Ok(validators) = self.validators.read() {
            if let Some(validator) = validators.get(tool.name()) {
                return Ok(Arc::clone(validator));
            }
        }
        let compiled = jsonschema::options()
            .build(&tool.input_schema())
            .map_err(|err| ToolError::Internal(format!("invalid tool schema: {err}")))?;
        let validator = Arc::new(compiled);
        if let Ok(mut validators) = self.validators.write() {
            validators.insert(tool.name().to_string(), Arc::clone(&validator));
        }
        Ok(validator)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
