// crates/nimbus-providers/src/provider.rs
// ============================================================================
// Module: Provider Interface
// Description: Lifecycle contract for cloud back-end providers.
// Purpose: Describe providers by capability set and enforce lifecycle order.
// Dependencies: nimbus-core, nimbus-config
// ============================================================================

//! ## Overview
//! A provider contributes tools for one cloud back-end and declares its
//! configuration and capability surface. The lifecycle is strict:
//! `validate_config` precedes `initialize`, tools register only after a
//! successful initialization, health checks fail before initialization, and
//! shutdown is an idempotent no-op for never-initialized providers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use nimbus_config::Config;
use nimbus_core::MigrationRouter;
use nimbus_core::ToolError;
use nimbus_core::ToolRegistry;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Metadata
// ============================================================================

/// A declared provider feature set used for discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capability {
    /// Capability name.
    pub name: String,
    /// Capability version.
    pub version: String,
    /// Capability category (for example `compute`).
    pub category: String,
    /// Capabilities this one depends on.
    pub dependencies: Vec<String>,
    /// Whether the capability is experimental.
    pub experimental: bool,
}

/// Immutable provider description registered with a factory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderMetadata {
    /// Unique provider name.
    pub name: String,
    /// Human-facing display name.
    pub display_name: String,
    /// Provider version.
    pub version: String,
    /// Short description.
    pub description: String,
    /// Author or maintainer.
    pub author: String,
    /// Homepage URL.
    pub homepage: String,
    /// License identifier.
    pub license: String,
    /// Configuration keys that must be present.
    pub required_config: Vec<String>,
    /// Configuration keys that may be present.
    pub optional_config: Vec<String>,
    /// Declared capabilities.
    pub capabilities: Vec<Capability>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Provider lifecycle and back-end errors.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider was used before initialization.
    #[error("provider not initialized: {0}")]
    NotInitialized(String),
    /// The provider was initialized twice.
    #[error("provider already initialized: {0}")]
    AlreadyInitialized(String),
    /// Required configuration keys are absent.
    #[error("provider {provider} missing required config keys: {keys:?}")]
    MissingConfig {
        /// Provider whose configuration is incomplete.
        provider: String,
        /// Keys that were absent.
        keys: Vec<String>,
    },
    /// No factory is registered under the requested name.
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    /// A factory name was registered twice.
    #[error("provider already registered: {0}")]
    DuplicateRegistration(String),
    /// A back-end API call failed.
    #[error("provider api error{}: {message}", status_suffix(.status))]
    Api {
        /// HTTP status when the failure carried one.
        status: Option<u16>,
        /// Failure description.
        message: String,
    },
    /// Tool registration with the core registry failed.
    #[error("tool registration failed: {0}")]
    Registration(String),
}

/// Renders an HTTP status suffix for API error messages.
fn status_suffix(status: &Option<u16>) -> String {
    status.map_or_else(String::new, |status| format!(" (status {status})"))
}

impl From<ProviderError> for ToolError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotInitialized(provider) => Self::NotInitialized(provider),
            ProviderError::AlreadyInitialized(provider) => Self::AlreadyInitialized(provider),
            ProviderError::MissingConfig {
                provider,
                keys,
            } => Self::ConfigMissingKeys {
                provider,
                keys,
            },
            ProviderError::Api {
                status,
                message,
            } => api_to_tool_error(status, message),
            other => Self::Internal(other.to_string()),
        }
    }
}

/// Classifies a back-end API failure for the retry engine.
fn api_to_tool_error(status: Option<u16>, message: String) -> ToolError {
    match status {
        Some(status) if status >= 500 || status == 408 => {
            ToolError::Retryable(format!("server error {status}: {message}"))
        }
        Some(429) => ToolError::NonRetryable(format!("rate limited upstream: {message}")),
        Some(status) => ToolError::NonRetryable(format!("request rejected ({status}): {message}")),
        None => ToolError::Retryable(format!("network failure: {message}")),
    }
}

// ============================================================================
// SECTION: Provider Trait
// ============================================================================

/// A cloud back-end implementation that contributes tools.
pub trait Provider: Send + Sync {
    /// Returns the immutable provider metadata.
    fn metadata(&self) -> &ProviderMetadata;

    /// Checks configuration without mutating provider state.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::MissingConfig`] when required keys are
    /// absent.
    fn validate_config(&self, config: &Config) -> Result<(), ProviderError> {
        let missing = config.missing_keys(&self.metadata().required_config);
        if missing.is_empty() {
            return Ok(());
        }
        Err(ProviderError::MissingConfig {
            provider: self.metadata().name.clone(),
            keys: missing,
        })
    }

    /// Initializes the provider from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::AlreadyInitialized`] on repeat calls and
    /// validation errors before any state changes.
    fn initialize(&mut self, config: &Config) -> Result<(), ProviderError>;

    /// Registers the provider's tools with the core registry.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NotInitialized`] before initialization and
    /// [`ProviderError::Registration`] when the registry rejects a tool.
    fn register_tools(
        &self,
        tools: &ToolRegistry,
        router: &Arc<MigrationRouter>,
    ) -> Result<(), ProviderError>;

    /// Reports provider health.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NotInitialized`] before initialization.
    fn health_check(&self) -> Result<Value, ProviderError>;

    /// Releases provider resources.
    ///
    /// Safe to call when never initialized and idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when resource release fails.
    fn shutdown(&mut self) -> Result<(), ProviderError>;
}

/// Factory producing uninitialized provider instances.
pub trait ProviderFactory: Send + Sync {
    /// Returns the metadata shared by every produced instance.
    fn metadata(&self) -> ProviderMetadata;

    /// Creates a fresh, uninitialized provider.
    fn create(&self) -> Box<dyn Provider>;
}

// ============================================================================
// SECTION: Tests
// ============================================================================
