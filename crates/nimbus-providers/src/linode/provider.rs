// crates/nimbus-providers/src/linode/provider.rs
// ============================================================================
// Module: Linode Provider
// Description: Lifecycle and tool registration for the Linode back-end.
// Purpose: Wire dual-arm Linode tools into the registry and router.
// Dependencies: nimbus-core, nimbus-config, crate::linode::{api, tools}
// ============================================================================

//! ## Overview
//! The provider owns the API client and registers one dual-arm tool per
//! Linode operation. Initialization validates configuration first and is
//! rejected on repeat calls; shutdown drops the client and is idempotent.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use nimbus_config::Config;
use nimbus_core::MigratedTool;
use nimbus_core::MigrationRouter;
use nimbus_core::ToolRegistry;
use serde_json::Value;
use serde_json::json;

use crate::linode::api::DEFAULT_API_URL;
use crate::linode::api::DEFAULT_TIMEOUT_MS;
use crate::linode::api::HttpLinodeApi;
use crate::linode::api::LinodeApi;
use crate::linode::tools::LinodeOp;
use crate::linode::tools::LinodeService;
use crate::linode::tools::ProviderNativeTool;
use crate::linode::tools::ServiceBackedTool;
use crate::provider::Capability;
use crate::provider::Provider;
use crate::provider::ProviderError;
use crate::provider::ProviderFactory;
use crate::provider::ProviderMetadata;

// ============================================================================
// SECTION: Metadata
// ============================================================================

/// Provider name used for registration and routing tags.
pub const PROVIDER_NAME: &str = "linode";

/// Builds the immutable Linode provider metadata.
#[must_use]
pub fn linode_metadata() -> ProviderMetadata {
    ProviderMetadata {
        name: PROVIDER_NAME.to_string(),
        display_name: "Linode".to_string(),
        version: "0.1.0".to_string(),
        description: "Linode compute management over the v4 API.".to_string(),
        author: "Nimbus contributors".to_string(),
        homepage: "https://www.linode.com".to_string(),
        license: "Apache-2.0".to_string(),
        required_config: vec!["api_token".to_string()],
        optional_config: vec!["api_url".to_string(), "timeout_ms".to_string()],
        capabilities: vec![
            Capability {
                name: "instances".to_string(),
                version: "v4".to_string(),
                category: "compute".to_string(),
                dependencies: Vec::new(),
                experimental: false,
            },
            Capability {
                name: "catalogs".to_string(),
                version: "v4".to_string(),
                category: "discovery".to_string(),
                dependencies: Vec::new(),
                experimental: false,
            },
        ],
    }
}

// ============================================================================
// SECTION: Provider
// ============================================================================

/// Linode back-end provider.
pub struct LinodeProvider {
    /// Immutable provider description.
    metadata: ProviderMetadata,
    /// API client, present while initialized.
    api: Option<Arc<dyn LinodeApi>>,
    /// Client injected for tests and offline runs.
    injected_api: Option<Arc<dyn LinodeApi>>,
}

impl LinodeProvider {
    /// Creates an uninitialized provider that builds an HTTP client.
    #[must_use]
    pub fn new() -> Self {
        Self {
            metadata: linode_metadata(),
            api: None,
            injected_api: None,
        }
    }

    /// Creates an uninitialized provider over an injected API client.
    #[must_use]
    pub fn with_api(api: Arc<dyn LinodeApi>) -> Self {
        Self {
            metadata: linode_metadata(),
            api: None,
            injected_api: Some(api),
        }
    }

    /// Returns the live API client or a lifecycle error.
    fn live_api(&self) -> Result<&Arc<dyn LinodeApi>, ProviderError> {
        self.api
            .as_ref()
            .ok_or_else(|| ProviderError::NotInitialized(PROVIDER_NAME.to_string()))
    }
}

impl Default for LinodeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for LinodeProvider {
    fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    fn initialize(&mut self, config: &Config) -> Result<(), ProviderError> {
        if self.api.is_some() {
            return Err(ProviderError::AlreadyInitialized(PROVIDER_NAME.to_string()));
        }
        self.validate_config(config)?;
        let api = match &self.injected_api {
            Some(api) => Arc::clone(api),
            None => {
                let token = config.get_string("api_token").unwrap_or_default();
                let url =
                    config.get_string("api_url").unwrap_or_else(|| DEFAULT_API_URL.to_string());
                let timeout_ms = config
                    .get_int("timeout_ms")
                    .and_then(|value| u64::try_from(value).ok())
                    .unwrap_or(DEFAULT_TIMEOUT_MS);
                Arc::new(HttpLinodeApi::new(&url, &token, Duration::from_millis(timeout_ms))?)
                    as Arc<dyn LinodeApi>
            }
        };
        self.api = Some(api);
        Ok(())
    }

    fn register_tools(
        &self,
        tools: &ToolRegistry,
        router: &Arc<MigrationRouter>,
    ) -> Result<(), ProviderError> {
        let api = self.live_api()?;
        let service = Arc::new(LinodeService::new(Arc::clone(api)));
        for op in LinodeOp::ALL {
            router
                .register_tool(op.name(), PROVIDER_NAME)
                .map_err(|err| ProviderError::Registration(err.to_string()))?;
            let tool = MigratedTool::new(
                Arc::new(ServiceBackedTool::new(*op, Arc::clone(&service))),
                Arc::new(ProviderNativeTool::new(*op, Arc::clone(api))),
                Arc::clone(router),
            );
            tools
                .register(Arc::new(tool))
                .map_err(|err| ProviderError::Registration(err.to_string()))?;
        }
        Ok(())
    }

    fn health_check(&self) -> Result<Value, ProviderError> {
        let _ = self.live_api()?;
        Ok(json!({
            "provider": PROVIDER_NAME,
            "status": "healthy",
            "tools": LinodeOp::ALL.len(),
        }))
    }

    fn shutdown(&mut self) -> Result<(), ProviderError> {
        self.api = None;
        Ok(())
    }
}

// ============================================================================
// SECTION: Factory
// ============================================================================

/// Factory producing [`LinodeProvider`] instances.
#[derive(Default)]
pub struct LinodeProviderFactory {
    /// Client injected into every produced provider, for tests.
    injected_api: Option<Arc<dyn LinodeApi>>,
}

impl LinodeProviderFactory {
    /// Creates the production factory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a factory that injects the given API client.
    #[must_use]
    pub fn with_api(api: Arc<dyn LinodeApi>) -> Self {
        Self {
            injected_api: Some(api),
        }
    }
}

impl ProviderFactory for LinodeProviderFactory {
    fn metadata(&self) -> ProviderMetadata {
        linode_metadata()
    }

    fn create(&self) -> Box<dyn Provider> {
        match &self.injected_api {
            Some(api) => Box::new(LinodeProvider::with_api(Arc::clone(api))),
            None => Box::new(LinodeProvider::new()),
        }
    }
}
