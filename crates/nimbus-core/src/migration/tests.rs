// crates/nimbus-core/src/migration/tests.rs
// ============================================================================
// Module: Migration Router Unit Tests
// Description: Routing precedence, mutation validation, and metrics bounds.
// Purpose: Validate decision order and state bookkeeping.
// Dependencies: nimbus-core
// ============================================================================

//! ## Overview
//! Covers the decision precedence chain, mutation validation, metric buffer
//! trimming, and the dual-arm dispatcher. Distribution properties live in
//! the crate's integration suite.

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

use serde_json::json;

use super::BackendArm;
use super::GlobalMigrationConfig;
use super::MigratedTool;
use super::MigrationError;
use super::MigrationRouter;
use super::RouteDecision;
use crate::context::ExecutionContext;
use crate::observe::NoopLogSink;
use crate::tool::FnTool;
use crate::tool::Tool;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds a router with default global config.
fn router() -> MigrationRouter {
    MigrationRouter::new(GlobalMigrationConfig::default(), Arc::new(NoopLogSink))
}

/// Builds a router with a tool registered at the given percentage.
fn router_with(tool: &str, percentage: u8) -> MigrationRouter {
    let router = router();
    router.register_tool(tool, "test").unwrap();
    router.set_tool_migration_percentage(tool, percentage, "test").unwrap();
    router
}

// ============================================================================
// SECTION: Decision Precedence
// ============================================================================

#[test]
fn unknown_tool_routes_service_backed() {
    let router = router();
    assert!(!router.should_use_provider_native("never_registered"));
    assert_eq!(router.decide("never_registered").arm, BackendArm::ServiceBacked);
}

#[test]
fn zero_percent_routes_service_backed() {
    let router = router_with("list_instances", 0);
    for _ in 0..20 {
        assert!(!router.should_use_provider_native("list_instances"));
    }
}

#[test]
fn hundred_percent_routes_provider_native() {
    let router = router_with("list_instances", 100);
    for _ in 0..20 {
        assert!(router.should_use_provider_native("list_instances"));
    }
}

#[test]
fn force_flags_dominate_percentage() {
    let router = router_with("list_instances", 0);
    router.force_provider_native("list_instances", "op").unwrap();
    for _ in 0..50 {
        assert!(router.should_use_provider_native("list_instances"));
    }
    router.force_service_backed("list_instances", "op").unwrap();
    for _ in 0..50 {
        assert!(!router.should_use_provider_native("list_instances"));
    }
    // Flags are mutually exclusive: the second force cleared the first.
    let status = router.migration_status();
    let settings = status.settings.get("list_instances").unwrap();
    assert!(!settings.force_provider_native);
    assert!(settings.force_service_backed);
}

#[test]
fn rollback_dominates_force_flags() {
    let router = router_with("list_instances", 100);
    router.force_provider_native("list_instances", "op").unwrap();
    router.enable_global_rollback("op").unwrap();
    for _ in 0..20 {
        assert!(!router.should_use_provider_native("list_instances"));
    }
    // Disabling rollback restores prior behavior without state loss.
    router.disable_global_rollback("op").unwrap();
    assert!(router.should_use_provider_native("list_instances"));
}

#[test]
fn maintenance_mode_routes_service_backed() {
    let router = router_with("list_instances", 100);
    router.set_maintenance_mode(true, "op").unwrap();
    assert!(!router.should_use_provider_native("list_instances"));
    router.set_maintenance_mode(false, "op").unwrap();
    assert!(router.should_use_provider_native("list_instances"));
}

#[test]
fn disabled_tool_routes_service_backed() {
    let router = router_with("list_instances", 100);
    router.disable_tool_migration("list_instances", "op").unwrap();
    assert!(!router.should_use_provider_native("list_instances"));
    router.enable_tool_migration("list_instances", "op").unwrap();
    assert!(router.should_use_provider_native("list_instances"));
}

// ============================================================================
// SECTION: Mutation Validation
// ============================================================================

#[test]
fn percentage_mutations_validate_bounds() {
    let router = router_with("list_instances", 0);
    let err = router.set_tool_migration_percentage("missing", 10, "op").unwrap_err();
    assert!(matches!(err, MigrationError::UnknownTool(_)));

    let err = router.set_tool_migration_percentage("list_instances", 101, "op").unwrap_err();
    assert!(matches!(err, MigrationError::PercentageOutOfRange(101)));
}

#[test]
fn percentage_respects_global_ceiling() {
    let router = MigrationRouter::new(
        GlobalMigrationConfig {
            max_percentage: 25,
            ..GlobalMigrationConfig::default()
        },
        Arc::new(NoopLogSink),
    );
    router.register_tool("list_instances", "op").unwrap();
    let err = router.set_tool_migration_percentage("list_instances", 50, "op").unwrap_err();
    assert!(matches!(
        err,
        MigrationError::AboveGlobalMax {
            percentage: 50,
            max: 25,
        }
    ));
    router.set_tool_migration_percentage("list_instances", 25, "op").unwrap();
}

#[test]
fn mutations_stamp_operator_and_time() {
    let router = router_with("list_instances", 0);
    router.set_tool_migration_percentage("list_instances", 10, "alice").unwrap();
    let status = router.migration_status();
    let settings = status.settings.get("list_instances").unwrap();
    assert_eq!(settings.updated_by, "alice");
    assert!(settings.last_updated_ms > 0);
}

// ============================================================================
// SECTION: Metrics
// ============================================================================

#[test]
fn record_execution_counts_per_arm() {
    let router = router_with("list_instances", 0);
    let native = RouteDecision {
        tool: "list_instances".to_string(),
        arm: BackendArm::ProviderNative,
    };
    let backed = RouteDecision {
        tool: "list_instances".to_string(),
        arm: BackendArm::ServiceBacked,
    };
    router.record_execution(&native, true, 12);
    router.record_execution(&native, false, 80);
    router.record_execution(&backed, true, 5);

    let status = router.migration_status();
    let metrics = status.metrics.get("list_instances").unwrap();
    assert_eq!(metrics.provider_native.calls, 2);
    assert_eq!(metrics.provider_native.errors, 1);
    assert_eq!(metrics.provider_native.latency_ms, vec![12, 80]);
    assert_eq!(metrics.service_backed.calls, 1);
    assert_eq!(metrics.service_backed.errors, 0);

    router.reset_metrics();
    assert!(router.migration_status().metrics.is_empty());
}

#[test]
fn latency_buffer_trims_oldest_tenth() {
    let router = router_with("list_instances", 0);
    let decision = RouteDecision {
        tool: "list_instances".to_string(),
        arm: BackendArm::ProviderNative,
    };
    for latency in 0..10_001u64 {
        router.record_execution(&decision, true, latency);
    }
    let status = router.migration_status();
    let samples = &status.metrics.get("list_instances").unwrap().provider_native.latency_ms;
    assert_eq!(samples.len(), 9_001);
    // The oldest thousand samples were dropped.
    assert_eq!(samples.first().copied(), Some(1_000));
    assert_eq!(samples.last().copied(), Some(10_000));
}

#[test]
fn status_snapshot_is_a_deep_copy() {
    let router = router_with("list_instances", 10);
    let before = router.migration_status();
    router.set_tool_migration_percentage("list_instances", 90, "op").unwrap();
    assert_eq!(before.settings.get("list_instances").unwrap().traffic_percentage, 10);
}

// ============================================================================
// SECTION: Dual-Arm Dispatch
// ============================================================================

#[test]
fn migrated_tool_follows_the_decision() {
    let router = Arc::new(router_with("probe", 0));
    let service = Arc::new(FnTool::new("probe", "probe", json!({"type": "object"}), |_, _| {
        Ok(json!("service_backed"))
    }));
    let native = Arc::new(FnTool::new("probe", "probe", json!({"type": "object"}), |_, _| {
        Ok(json!("provider_native"))
    }));
    let tool = MigratedTool::new(service, native, Arc::clone(&router));
    let ctx = ExecutionContext::new("r1", "probe");

    assert_eq!(tool.execute(&ctx, &json!({})).unwrap(), json!("service_backed"));
    router.force_provider_native("probe", "op").unwrap();
    assert_eq!(tool.execute(&ctx, &json!({})).unwrap(), json!("provider_native"));

    let status = router.migration_status();
    let metrics = status.metrics.get("probe").unwrap();
    assert_eq!(metrics.service_backed.calls, 1);
    assert_eq!(metrics.provider_native.calls, 1);
}
