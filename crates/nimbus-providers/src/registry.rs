// crates/nimbus-providers/src/registry.rs
// ============================================================================
// Module: Provider Registry
// Description: Factory-based registry for cloud back-end providers.
// Purpose: Resolve providers by name and police registration uniqueness.
// Dependencies: nimbus-config, crate::provider
// ============================================================================

//! ## Overview
//! Factories register under unique names; `get` produces a fresh,
//! uninitialized provider per call so callers own the lifecycle. Metadata is
//! served from the factory without constructing a provider.
//!
//! ## Invariants
//! - Factory names are unique and non-empty.
//! - Returned providers are uninitialized.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::RwLock;

use nimbus_config::Config;

use crate::provider::Provider;
use crate::provider::ProviderError;
use crate::provider::ProviderFactory;
use crate::provider::ProviderMetadata;

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Factory registry keyed by provider name.
#[derive(Default)]
pub struct ProviderRegistry {
    /// Registered factories.
    factories: RwLock<BTreeMap<String, Arc<dyn ProviderFactory>>>,
}

impl ProviderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::DuplicateRegistration`] for taken names and
    /// [`ProviderError::Registration`] for empty ones.
    pub fn register(
        &self,
        name: impl Into<String>,
        factory: Arc<dyn ProviderFactory>,
    ) -> Result<(), ProviderError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ProviderError::Registration(
                "provider name must be non-empty".to_string(),
            ));
        }
        let mut factories = self
            .factories
            .write()
            .map_err(|_| ProviderError::Registration("registry lock poisoned".to_string()))?;
        if factories.contains_key(&name) {
            return Err(ProviderError::DuplicateRegistration(name));
        }
        factories.insert(name, factory);
        Ok(())
    }

    /// Creates a fresh, uninitialized provider by name.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::UnknownProvider`] when no factory matches.
    pub fn get(&self, name: &str) -> Result<Box<dyn Provider>, ProviderError> {
        let factory = self.factory(name)?;
        Ok(factory.create())
    }

    /// Returns the sorted list of registered provider names.
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        self.factories
            .read()
            .map_or_else(|_| Vec::new(), |factories| factories.keys().cloned().collect())
    }

    /// Returns true when a factory is registered under `name`.
    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.factories.read().map_or(false, |factories| factories.contains_key(name))
    }

    /// Returns the metadata for one registered provider.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::UnknownProvider`] when no factory matches.
    pub fn metadata(&self, name: &str) -> Result<ProviderMetadata, ProviderError> {
        Ok(self.factory(name)?.metadata())
    }

    /// Returns metadata for every registered provider.
    #[must_use]
    pub fn all_metadata(&self) -> Vec<ProviderMetadata> {
        self.factories.read().map_or_else(
            |_| Vec::new(),
            |factories| factories.values().map(|factory| factory.metadata()).collect(),
        )
    }

    /// Validates configuration for one provider without initializing it.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::UnknownProvider`] or the provider's own
    /// validation error.
    pub fn validate_provider(&self, name: &str, config: &Config) -> Result<(), ProviderError> {
        self.get(name)?.validate_config(config)
    }

    /// Returns the number of registered factories.
    #[must_use]
    pub fn count(&self) -> usize {
        self.factories.read().map_or(0, |factories| factories.len())
    }

    /// Removes every registered factory. Test-only escape hatch.
    pub fn reset(&self) {
        if let Ok(mut factories) = self.factories.write() {
            factories.clear();
        }
    }

    /// Returns the factory registered under `name`.
    fn factory(&self, name: &str) -> Result<Arc<dyn ProviderFactory>, ProviderError> {
        self.factories
            .read()
            .ok()
            .and_then(|factories| factories.get(name).map(Arc::clone))
            .ok_or_else(|| ProviderError::UnknownProvider(name.to_string()))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
