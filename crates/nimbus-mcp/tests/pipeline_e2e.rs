// crates/nimbus-mcp/tests/pipeline_e2e.rs
// ============================================================================
// Module: Pipeline End-to-End Tests
// Description: Full JSON-RPC scenarios through a bootstrapped server.
// Purpose: Validate the assembled pipeline against literal expectations.
// Dependencies: nimbus-mcp, nimbus-providers, nimbus-config
// ============================================================================

//! ## Overview
//! Bootstraps the production wiring over the in-memory Linode fake and
//! drives JSON-RPC lines end to end: health checks, unknown tools, rate
//! limiting, validation rejection, and migration routing with rollback.

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

use nimbus_config::NimbusConfig;
use nimbus_mcp::Bootstrap;
use nimbus_mcp::build_with_providers;
use nimbus_providers::InMemoryLinodeApi;
use nimbus_providers::LinodeProviderFactory;
use nimbus_providers::ProviderFactory;
use nimbus_providers::ProviderRegistry;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Bootstraps the server over the in-memory Linode fake.
fn bootstrap_with(config_toml: &str) -> Bootstrap {
    let mut config = NimbusConfig::from_toml(config_toml).unwrap();
    config.apply_env_from(|_| None);
    config.validate().unwrap();
    let providers = Arc::new(ProviderRegistry::new());
    providers
        .register(
            "linode",
            Arc::new(LinodeProviderFactory::with_api(Arc::new(InMemoryLinodeApi::new())))
                as Arc<dyn ProviderFactory>,
        )
        .unwrap();
    build_with_providers(&config, providers).unwrap()
}

/// Default test configuration.
fn default_bootstrap() -> Bootstrap {
    bootstrap_with(
        r#"
        [providers.linode]
        enabled = true

        [providers.linode.settings]
        api_token = "test-token"
    "#,
    )
}

/// Issues one tools/call and returns the response value.
fn call(bootstrap: &Bootstrap, id: u64, name: &str, arguments: Value) -> Value {
    let line = serde_json::to_string(&json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {"name": name, "arguments": arguments},
    }))
    .unwrap();
    let response = bootstrap.server.handle_line(&line).unwrap();
    serde_json::to_value(response).unwrap()
}

/// Extracts the text payload from a tool-call response.
fn envelope_text(value: &Value) -> &str {
    value.pointer("/result/content/0/text").and_then(Value::as_str).unwrap_or_default()
}

// ============================================================================
// SECTION: Scenarios
// ============================================================================

#[test]
fn s1_health_check_end_to_end() {
    let bootstrap = default_bootstrap();
    let value = call(&bootstrap, 1, "health_check", json!({}));
    assert_eq!(value.get("id"), Some(&json!(1)));
    assert_eq!(value.pointer("/result/isError"), Some(&json!(false)));
    let text = envelope_text(&value);
    assert!(text.contains("\"status\":\"healthy\""), "unexpected payload: {text}");
}

#[test]
fn s2_unknown_tool_is_method_not_found() {
    let bootstrap = default_bootstrap();
    let value = call(&bootstrap, 2, "nonexistent", json!({}));
    assert_eq!(value.pointer("/error/code"), Some(&json!(-32601)));
}

#[test]
fn s3_third_rapid_call_is_rate_limited() {
    let bootstrap = bootstrap_with(
        r#"
        [rate_limit]
        rate = 2
        window_ms = 1000

        [providers.linode]
        enabled = true

        [providers.linode.settings]
        api_token = "test-token"
    "#,
    );
    for id in 0..2 {
        let value = call(&bootstrap, id, "list_regions", json!({}));
        assert_eq!(value.pointer("/result/isError"), Some(&json!(false)));
    }
    let value = call(&bootstrap, 9, "list_regions", json!({}));
    assert_eq!(value.pointer("/result/isError"), Some(&json!(true)));
    assert!(envelope_text(&value).contains("rate limit"));
}

#[test]
fn s6_validation_rejects_before_execution() {
    let bootstrap = default_bootstrap();
    // create_instance requires label, region, and type.
    let value = call(&bootstrap, 3, "create_instance", json!({}));
    assert_eq!(value.pointer("/result/isError"), Some(&json!(true)));
    let text = envelope_text(&value);
    assert!(text.contains("validation failed"), "unexpected payload: {text}");
    // Nothing was created.
    let value = call(&bootstrap, 4, "list_instances", json!({}));
    assert!(!envelope_text(&value).contains("\"id\":1"));
}

#[test]
fn s5_migration_routing_with_rollback() {
    let bootstrap = default_bootstrap();
    bootstrap.router.set_tool_migration_percentage("get_instance", 100, "test").unwrap();

    let value =
        call(&bootstrap, 5, "create_instance", json!({"label": "a", "region": "us-east", "type": "g6-nanode-1"}));
    assert_eq!(value.pointer("/result/isError"), Some(&json!(false)));

    // Provider-native arm returns the raw payload, including the type field.
    let value = call(&bootstrap, 6, "get_instance", json!({"instance_id": 1}));
    assert!(envelope_text(&value).contains("g6-nanode-1"));

    bootstrap.router.enable_global_rollback("test").unwrap();
    // Service-backed arm returns the legacy summary, which drops the field.
    let value = call(&bootstrap, 7, "get_instance", json!({"instance_id": 1}));
    assert!(!envelope_text(&value).contains("g6-nanode-1"));

    let status = bootstrap.router.migration_status();
    let metrics = status.metrics.get("get_instance").unwrap();
    assert_eq!(metrics.provider_native.calls, 1);
    assert_eq!(metrics.service_backed.calls, 1);
}

#[test]
fn migration_admin_tools_drive_the_router() {
    let bootstrap = default_bootstrap();
    let value =
        call(&bootstrap, 8, "set_migration_percentage", json!({"tool": "reboot_instance", "percentage": 100}));
    assert_eq!(value.pointer("/result/isError"), Some(&json!(false)));

    let value = call(&bootstrap, 9, "migration_status", json!({}));
    assert!(envelope_text(&value).contains("\"traffic_percentage\":100"));

    let value = call(&bootstrap, 10, "enable_rollback", json!({}));
    assert_eq!(value.pointer("/result/isError"), Some(&json!(false)));
    let status = bootstrap.router.migration_status();
    assert!(status.global.rollback_mode);

    call(&bootstrap, 11, "disable_rollback", json!({}));
    assert!(!bootstrap.router.migration_status().global.rollback_mode);
}

#[test]
fn sensitive_delete_flows_through_the_whole_stack() {
    let bootstrap = default_bootstrap();
    let value = call(
        &bootstrap,
        12,
        "create_instance",
        json!({"label": "doomed", "region": "us-east", "type": "g6-nanode-1"}),
    );
    assert_eq!(value.pointer("/result/isError"), Some(&json!(false)));
    let value = call(&bootstrap, 13, "delete_instance", json!({"instance_id": 1}));
    assert_eq!(value.pointer("/result/isError"), Some(&json!(false)));
    // Deleting again is an upstream 404 folded into an error envelope.
    let value = call(&bootstrap, 14, "delete_instance", json!({"instance_id": 1}));
    assert_eq!(value.pointer("/result/isError"), Some(&json!(true)));
}

#[test]
fn metrics_aggregate_observes_pipeline_traffic() {
    let bootstrap = default_bootstrap();
    call(&bootstrap, 15, "health_check", json!({}));
    let rendered = bootstrap.metrics.render_prometheus();
    assert!(rendered.contains("tool_executions_started"), "missing series: {rendered}");
    assert!(rendered.contains("tool_executions_completed"));
}

#[test]
fn provider_shutdown_is_clean() {
    let bootstrap = default_bootstrap();
    bootstrap.shutdown();
    // Shutdown is idempotent through the bootstrap handle as well.
    bootstrap.shutdown();
}
