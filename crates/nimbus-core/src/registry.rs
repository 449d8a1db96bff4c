// crates/nimbus-core/src/registry.rs
// ============================================================================
// Module: Tool Registry
// Description: Thread-safe name-to-tool mapping with transport publication.
// Purpose: Own every registered tool and expose lookup to the pipeline.
// Dependencies: nimbus-core::{tool, error}
// ============================================================================

//! ## Overview
//! The registry is the authoritative owner of tools; every other component
//! references tools by name. Registration is exclusive and publishes the
//! tool to the external transport adapter exactly once; lookups take a
//! shared lock.
//!
//! ## Invariants
//! - Tool names are unique within a registry.
//! - Tools are immutable after registration.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::RwLock;

use serde_json::Value;

use crate::context::ExecutionContext;
use crate::error::ToolError;
use crate::tool::Tool;
use crate::tool::ToolDefinition;

// ============================================================================
// SECTION: Transport Publication
// ============================================================================

/// Handler shape expected by push-style transport SDKs: raw arguments in,
/// textual result or typed error out.
pub type PublishedHandler = Box<dyn Fn(Value) -> Result<String, ToolError> + Send + Sync>;

/// External transport adapter accepting tool registrations.
pub trait ToolPublisher: Send + Sync {
    /// Publishes one tool definition with its invocation handler.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError`] when the transport rejects the registration.
    fn add_tool(&self, definition: ToolDefinition, handler: PublishedHandler)
    -> Result<(), ToolError>;
}

// ============================================================================
// SECTION: Tool Registry
// ============================================================================

/// Thread-safe mapping from tool name to implementation.
#[derive(Default)]
pub struct ToolRegistry {
    /// Registered tools keyed by name.
    tools: RwLock<BTreeMap<String, Arc<dyn Tool>>>,
    /// Optional transport adapter notified on registration.
    publisher: Option<Arc<dyn ToolPublisher>>,
}

impl ToolRegistry {
    /// Creates an empty registry without a transport adapter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry that publishes registrations to `publisher`.
    #[must_use]
    pub fn with_publisher(publisher: Arc<dyn ToolPublisher>) -> Self {
        Self {
            tools: RwLock::new(BTreeMap::new()),
            publisher: Some(publisher),
        }
    }

    /// Registers a tool under its own name.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::DuplicateRegistration`] when the name is taken,
    /// or the transport error when publication fails.
    pub fn register(&self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if name.is_empty() {
            return Err(ToolError::ParamValidation("tool name must be non-empty".to_string()));
        }
        let mut tools = self
            .tools
            .write()
            .map_err(|_| ToolError::Internal("registry lock poisoned".to_string()))?;
        if tools.contains_key(&name) {
            return Err(ToolError::DuplicateRegistration(name));
        }
        if let Some(publisher) = &self.publisher {
            publisher.add_tool(tool.definition(), published_handler(&tool))?;
        }
        tools.insert(name, tool);
        Ok(())
    }

    /// Registers a batch of tools, failing fast on the first error.
    ///
    /// # Errors
    ///
    /// Returns the first registration error; earlier tools stay registered.
    pub fn register_many(&self, tools: Vec<Arc<dyn Tool>>) -> Result<(), ToolError> {
        for tool in tools {
            self.register(tool)?;
        }
        Ok(())
    }

    /// Returns the tool registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().ok().and_then(|tools| tools.get(name).cloned())
    }

    /// Returns true when a tool is registered under `name`.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.tools.read().map_or(false, |tools| tools.contains_key(name))
    }

    /// Returns the sorted list of registered tool names.
    #[must_use]
    pub fn list_names(&self) -> Vec<String> {
        self.tools.read().map_or_else(|_| Vec::new(), |tools| tools.keys().cloned().collect())
    }

    /// Returns the number of registered tools.
    #[must_use]
    pub fn count(&self) -> usize {
        self.tools.read().map_or(0, |tools| tools.len())
    }

    /// Returns transport-facing definitions for every registered tool.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.read().map_or_else(
            |_| Vec::new(),
            |tools| tools.values().map(|tool| tool.definition()).collect(),
        )
    }

    /// Removes every registered tool. Test-only escape hatch.
    pub fn clear(&self) {
        if let Ok(mut tools) = self.tools.write() {
            tools.clear();
        }
    }
}

/// Wraps a tool's execute into the transport handler shape.
fn published_handler(tool: &Arc<dyn Tool>) -> PublishedHandler {
    let tool = Arc::clone(tool);
    Box::new(move |arguments: Value| {
        let ctx = ExecutionContext::new(format!("pub-{}", tool.name()), tool.name());
        let result = tool.execute(&ctx, &arguments)?;
        serde_json::to_string(&result).map_err(|_| ToolError::Serialization)
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================
