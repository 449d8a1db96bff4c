// crates/nimbus-core/tests/pipeline_stack.rs
// ============================================================================
// Module: Pipeline Stack Tests
// Description: The full middleware stack assembled as in production.
// Purpose: Validate cross-layer behavior through the executor entry point.
// Dependencies: nimbus-core
// ============================================================================

//! ## Overview
//! Assembles recovery, audit, request, structured, metrics, rate-limit,
//! circuit, and retry layers in their production priorities and drives
//! invocations through [`nimbus_core::ToolExecutor`].

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
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::time::Duration;

use nimbus_core::CircuitBreakerConfig;
use nimbus_core::CircuitBreakerMiddleware;
use nimbus_core::FnTool;
use nimbus_core::InMemoryMetrics;
use nimbus_core::InvocationOptions;
use nimbus_core::KeyStrategy;
use nimbus_core::MemoryLogSink;
use nimbus_core::MetricTags;
use nimbus_core::MetricsMiddleware;
use nimbus_core::MiddlewareChain;
use nimbus_core::RateLimitMiddleware;
use nimbus_core::RecoveryMiddleware;
use nimbus_core::RequestLogConfig;
use nimbus_core::RequestLogMiddleware;
use nimbus_core::RetryConfig;
use nimbus_core::RetryMiddleware;
use nimbus_core::SecurityAuditMiddleware;
use nimbus_core::SensitiveToolSet;
use nimbus_core::StructuredLogMiddleware;
use nimbus_core::TokenBucketLimiter;
use nimbus_core::ToolError;
use nimbus_core::ToolExecutor;
use nimbus_core::ToolRegistry;
use serde_json::json;

// ============================================================================
// SECTION: Fixture
// ============================================================================

/// Shared observability handles for assertions.
struct Stack {
    /// Pipeline entry point.
    executor: ToolExecutor,
    /// Captured log records.
    sink: Arc<MemoryLogSink>,
    /// Aggregated metrics.
    metrics: Arc<InMemoryMetrics>,
}

/// Assembles the production middleware stack over a fresh registry.
fn stack(registry: Arc<ToolRegistry>) -> Stack {
    let sink = Arc::new(MemoryLogSink::new());
    let metrics = Arc::new(InMemoryMetrics::new());
    let chain = MiddlewareChain::new();
    chain.add(Arc::new(RecoveryMiddleware::new())).unwrap();
    chain
        .add(Arc::new(SecurityAuditMiddleware::new(
            Arc::clone(&sink) as _,
            SensitiveToolSet::defaults(),
        )))
        .unwrap();
    chain
        .add(Arc::new(RequestLogMiddleware::new(
            Arc::clone(&sink) as _,
            RequestLogConfig::default(),
        )))
        .unwrap();
    chain.add(Arc::new(StructuredLogMiddleware::new(Arc::clone(&sink) as _))).unwrap();
    chain.add(Arc::new(MetricsMiddleware::new(Arc::clone(&metrics) as _))).unwrap();
    chain
        .add(Arc::new(RateLimitMiddleware::new(
            Arc::new(TokenBucketLimiter::new(2, Duration::from_secs(1))),
            KeyStrategy::PerTool,
        )))
        .unwrap();
    chain
        .add(Arc::new(CircuitBreakerMiddleware::new(CircuitBreakerConfig {
            failure_threshold: 3,
            recovery_timeout: Duration::from_millis(50),
            success_threshold: 1,
        })))
        .unwrap();
    chain
        .add(Arc::new(RetryMiddleware::new(RetryConfig {
            max_retries: 2,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            backoff_factor: 2.0,
        })))
        .unwrap();
    Stack {
        executor: ToolExecutor::new(registry, Arc::new(chain)).with_provider("linode"),
        sink,
        metrics,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn registration_order_does_not_leak_into_priorities() {
    let sink = Arc::new(MemoryLogSink::new());
    let chain = MiddlewareChain::new();
    chain.add(Arc::new(RetryMiddleware::new(RetryConfig::default()))).unwrap();
    chain.add(Arc::new(RecoveryMiddleware::new())).unwrap();
    chain.add(Arc::new(StructuredLogMiddleware::new(Arc::clone(&sink) as _))).unwrap();
    assert_eq!(chain.list(), vec!["recovery", "structured_log", "retry"]);
}

#[test]
fn happy_path_emits_logs_and_metrics() {
    let registry = Arc::new(ToolRegistry::new());
    registry
        .register(Arc::new(FnTool::new(
            "list_instances",
            "Lists instances.",
            json!({"type": "object"}),
            |_, _| Ok(json!([{"id": 1}])),
        )))
        .unwrap();
    let stack = stack(registry);
    let result = stack
        .executor
        .execute("list_instances", &json!({}), InvocationOptions::default())
        .unwrap();
    assert_eq!(result, json!([{"id": 1}]));

    assert_eq!(stack.sink.events("tool_started").len(), 1);
    assert_eq!(stack.sink.events("tool_completed").len(), 1);
    assert_eq!(stack.sink.events("tool_invocation").len(), 1);

    let mut tags = MetricTags::new();
    tags.insert("tool".to_string(), "list_instances".to_string());
    tags.insert("provider".to_string(), "linode".to_string());
    assert_eq!(stack.metrics.counter_value("tool.executions.completed", &tags), 1);
}

#[test]
fn third_rapid_call_hits_the_rate_limit() {
    let registry = Arc::new(ToolRegistry::new());
    registry
        .register(Arc::new(FnTool::new(
            "list_regions",
            "Lists regions.",
            json!({"type": "object"}),
            |_, _| Ok(json!([])),
        )))
        .unwrap();
    let stack = stack(registry);
    for _ in 0..2 {
        stack
            .executor
            .execute("list_regions", &json!({}), InvocationOptions::default())
            .unwrap();
    }
    let err = stack
        .executor
        .execute("list_regions", &json!({}), InvocationOptions::default())
        .unwrap_err();
    assert!(err.to_string().contains("rate limit"));
}

#[test]
fn panicking_tool_is_contained_and_counted() {
    let registry = Arc::new(ToolRegistry::new());
    registry
        .register(Arc::new(FnTool::new(
            "explode",
            "Panics.",
            json!({"type": "object"}),
            |_, _| panic!("array index out of range"),
        )))
        .unwrap();
    let stack = stack(registry);
    let err = stack
        .executor
        .execute("explode", &json!({}), InvocationOptions::default())
        .unwrap_err();
    assert!(matches!(err, ToolError::Panic { .. }));
    assert_eq!(stack.sink.events("tool_failed").len(), 1);
}

#[test]
fn breaker_opens_after_consecutive_failures() {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);
    let registry = Arc::new(ToolRegistry::new());
    registry
        .register(Arc::new(FnTool::new(
            "always_down",
            "Fails.",
            json!({"type": "object"}),
            move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ToolError::NonRetryable("upstream unavailable".to_string()))
            },
        )))
        .unwrap();
    let stack = stack(registry);
    // Three invocations trip the breaker; rate limiter allows two per second,
    // so space them across windows.
    for _ in 0..3 {
        let _ = stack.executor.execute("always_down", &json!({}), InvocationOptions::default());
        std::thread::sleep(Duration::from_millis(510));
    }
    let before = attempts.load(Ordering::SeqCst);
    let err = stack
        .executor
        .execute("always_down", &json!({}), InvocationOptions::default())
        .unwrap_err();
    assert!(err.to_string().contains("circuit open"));
    // The handler was not invoked while the circuit was open.
    assert_eq!(attempts.load(Ordering::SeqCst), before);
}
