// crates/nimbus-core/src/chain.rs
// ============================================================================
// Module: Middleware Chain
// Description: Priority-ordered composition of cross-cutting concerns.
// Purpose: Fold middlewares around a terminal handler for each invocation.
// Dependencies: nimbus-core::{context, tool, error}
// ============================================================================

//! ## Overview
//! A [`MiddlewareChain`] holds an ordered set of [`Middleware`] layers and
//! wraps a terminal handler with them at execution time. Lower priority runs
//! outermost; the sort is stable, so layers registered at equal priority keep
//! their registration order. Disabled layers are skipped when the chain
//! snapshot is taken.
//!
//! ## Invariants
//! - Middleware names are unique within a chain.
//! - `execute` snapshots the layer list under a shared lock; registration
//!   after the snapshot does not affect in-flight invocations.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::RwLock;

use serde_json::Value;

use crate::context::ExecutionContext;
use crate::error::ToolError;
use crate::tool::Tool;
use crate::tool::ToolResult;

// ============================================================================
// SECTION: Priorities
// ============================================================================

/// Priority of the panic-recovery layer (outermost).
pub const PRIORITY_RECOVERY: i32 = 1;
/// Priority of the security-audit logging layer.
pub const PRIORITY_AUDIT: i32 = 5;
/// Priority of the request logging layer.
pub const PRIORITY_REQUEST_LOG: i32 = 10;
/// Priority of the structured logging layer.
pub const PRIORITY_STRUCTURED_LOG: i32 = 15;
/// Priority of the metrics layer.
pub const PRIORITY_METRICS: i32 = 20;
/// Priority of the rate-limit layer.
pub const PRIORITY_RATE_LIMIT: i32 = 30;
/// Priority of the circuit-breaker layer.
pub const PRIORITY_CIRCUIT: i32 = 40;
/// Priority of the retry layer (innermost).
pub const PRIORITY_RETRY: i32 = 50;

// ============================================================================
// SECTION: Middleware Trait
// ============================================================================

/// Continuation invoked by a middleware to run the remainder of the chain.
pub type Next<'a> = &'a (dyn Fn(&ExecutionContext, &dyn Tool, &Value) -> ToolResult + Sync);

/// A composable wrapper around tool execution.
pub trait Middleware: Send + Sync {
    /// Returns the unique middleware name.
    fn name(&self) -> &str;

    /// Returns the chain priority; lower runs outermost.
    fn priority(&self) -> i32;

    /// Returns false to skip this layer without removing it.
    fn enabled(&self) -> bool {
        true
    }

    /// Wraps the continuation for one invocation.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError`] when the layer short-circuits or the
    /// continuation fails.
    fn execute(
        &self,
        ctx: &ExecutionContext,
        tool: &dyn Tool,
        params: &Value,
        next: Next<'_>,
    ) -> ToolResult;
}

// ============================================================================
// SECTION: Chain
// ============================================================================

/// Ordered collection of middlewares folded around a terminal handler.
#[derive(Default)]
pub struct MiddlewareChain {
    /// Registered layers in registration order.
    layers: RwLock<Vec<Arc<dyn Middleware>>>,
}

impl MiddlewareChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a middleware to the chain.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::DuplicateRegistration`] when a layer with the
    /// same name is already present.
    pub fn add(&self, middleware: Arc<dyn Middleware>) -> Result<(), ToolError> {
        let mut layers = self
            .layers
            .write()
            .map_err(|_| ToolError::Internal("chain lock poisoned".to_string()))?;
        if layers.iter().any(|layer| layer.name() == middleware.name()) {
            return Err(ToolError::DuplicateRegistration(middleware.name().to_string()));
        }
        layers.push(middleware);
        Ok(())
    }

    /// Removes the middleware with the given name; returns true when found.
    pub fn remove(&self, name: &str) -> bool {
        self.layers.write().map_or(false, |mut layers| {
            let before = layers.len();
            layers.retain(|layer| layer.name() != name);
            layers.len() != before
        })
    }

    /// Returns true when a middleware with the given name is registered.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.layers
            .read()
            .map_or(false, |layers| layers.iter().any(|layer| layer.name() == name))
    }

    /// Removes every middleware from the chain.
    pub fn clear(&self) {
        if let Ok(mut layers) = self.layers.write() {
            layers.clear();
        }
    }

    /// Returns the number of registered middlewares.
    #[must_use]
    pub fn count(&self) -> usize {
        self.layers.read().map_or(0, |layers| layers.len())
    }

    /// Returns middleware names sorted by ascending priority.
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        self.snapshot(false).iter().map(|layer| layer.name().to_string()).collect()
    }

    /// Executes the chain around a terminal handler.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError`] from the first layer that short-circuits, or
    /// from the terminal handler.
    pub fn execute(
        &self,
        ctx: &ExecutionContext,
        tool: &dyn Tool,
        params: &Value,
        terminal: Next<'_>,
    ) -> ToolResult {
        let layers = self.snapshot(true);
        if layers.is_empty() {
            return terminal(ctx, tool, params);
        }
        run_layers(&layers, ctx, tool, params, terminal)
    }

    /// Returns the layer list sorted by ascending priority (stable).
    ///
    /// When `enabled_only` is set, disabled layers are dropped from the
    /// snapshot.
    fn snapshot(&self, enabled_only: bool) -> Vec<Arc<dyn Middleware>> {
        let Ok(layers) = self.layers.read() else {
            return Vec::new();
        };
        let mut snapshot: Vec<Arc<dyn Middleware>> = layers
            .iter()
            .filter(|layer| !enabled_only || layer.enabled())
            .map(Arc::clone)
            .collect();
        snapshot.sort_by_key(|layer| layer.priority());
        snapshot
    }
}

/// Recursively folds the layer list around the terminal handler.
fn run_layers(
    layers: &[Arc<dyn Middleware>],
    ctx: &ExecutionContext,
    tool: &dyn Tool,
    params: &Value,
    terminal: Next<'_>,
) -> ToolResult {
    match layers.split_first() {
        None => terminal(ctx, tool, params),
        Some((head, rest)) => head.execute(ctx, tool, params, &|ctx, tool, params| {
            run_layers(rest, ctx, tool, params, terminal)
        }),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
