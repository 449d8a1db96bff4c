// crates/nimbus-providers/src/registry/tests.rs
// ============================================================================
// Module: Provider Registry Unit Tests
// Description: Registration uniqueness and factory resolution.
// Purpose: Validate registry bookkeeping and metadata access.
// Dependencies: nimbus-providers
// ============================================================================

//! ## Overview
//! Exercises factory registration, duplicate rejection, and config
//! validation through the registry surface.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions favor direct unwrap/expect for clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use nimbus_config::Config;

use super::ProviderRegistry;
use crate::linode::provider::LinodeProviderFactory;
use crate::provider::ProviderError;

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn registration_rejects_empty_and_duplicate_names() {
    let registry = ProviderRegistry::new();
    let err = registry.register("", Arc::new(LinodeProviderFactory::new())).unwrap_err();
    assert!(matches!(err, ProviderError::Registration(_)));

    registry.register("linode", Arc::new(LinodeProviderFactory::new())).unwrap();
    let err = registry.register("linode", Arc::new(LinodeProviderFactory::new())).unwrap_err();
    assert!(matches!(err, ProviderError::DuplicateRegistration(name) if name == "linode"));
    assert_eq!(registry.count(), 1);
}

#[test]
fn get_produces_fresh_uninitialized_providers() {
    let registry = ProviderRegistry::new();
    registry.register("linode", Arc::new(LinodeProviderFactory::new())).unwrap();
    let provider = registry.get("linode").unwrap();
    // Uninitialized providers fail their health check.
    assert!(matches!(provider.health_check(), Err(ProviderError::NotInitialized(_))));

    let err = registry.get("missing").err().unwrap();
    assert!(matches!(err, ProviderError::UnknownProvider(name) if name == "missing"));
}

#[test]
fn metadata_is_served_without_construction() {
    let registry = ProviderRegistry::new();
    registry.register("linode", Arc::new(LinodeProviderFactory::new())).unwrap();
    let metadata = registry.metadata("linode").unwrap();
    assert_eq!(metadata.name, "linode");
    assert_eq!(metadata.required_config, vec!["api_token"]);
    assert_eq!(registry.all_metadata().len(), 1);
    assert!(registry.is_registered("linode"));
    assert_eq!(registry.list(), vec!["linode"]);
}

#[test]
fn validate_provider_reports_missing_keys() {
    let registry = ProviderRegistry::new();
    registry.register("linode", Arc::new(LinodeProviderFactory::new())).unwrap();
    let err = registry.validate_provider("linode", &Config::default()).unwrap_err();
    match err {
        ProviderError::MissingConfig {
            provider,
            keys,
        } => {
            assert_eq!(provider, "linode");
            assert_eq!(keys, vec!["api_token"]);
        }
        other => panic!("expected missing config, got {other}"),
    }
    let config = Config::from_pairs([("api_token", "t")]);
    registry.validate_provider("linode", &config).unwrap();
}

#[test]
fn reset_clears_everything() {
    let registry = ProviderRegistry::new();
    registry.register("linode", Arc::new(LinodeProviderFactory::new())).unwrap();
    registry.reset();
    assert_eq!(registry.count(), 0);
    assert!(!registry.is_registered("linode"));
}
