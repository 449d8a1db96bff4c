// crates/nimbus-core/src/lib.rs
// ============================================================================
// Module: Nimbus Core Library
// Description: Public API surface for the Nimbus tool-execution pipeline.
// Purpose: Expose tools, middleware, registries, and the migration router.
// Dependencies: crate::{chain, context, error, executor, limiter, ...}
// ============================================================================

//! ## Overview
//! Nimbus core implements the tool-execution pipeline behind the MCP
//! surface: a registry of named tools, a priority-ordered middleware chain
//! for cross-cutting concerns, pluggable rate limiters, a circuit breaker,
//! a retry engine, and the gradual-migration router that dispatches each
//! invocation to one of two coexisting back-ends. It is transport-agnostic
//! and integrates through explicit interfaces.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod chain;
pub mod context;
pub mod error;
pub mod executor;
pub mod limiter;
pub mod middleware;
pub mod migration;
pub mod observe;
pub mod registry;
pub mod tool;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use chain::Middleware;
pub use chain::MiddlewareChain;
pub use chain::Next;
pub use context::CancelToken;
pub use context::ExecutionContext;
pub use context::RequestIdGenerator;
pub use error::ErrorKind;
pub use error::ToolError;
pub use executor::InvocationOptions;
pub use executor::ToolExecutor;
pub use limiter::RateLimiter;
pub use limiter::SlidingWindowLimiter;
pub use limiter::TokenBucketLimiter;
pub use middleware::circuit::CircuitBreaker;
pub use middleware::circuit::CircuitBreakerConfig;
pub use middleware::circuit::CircuitBreakerMiddleware;
pub use middleware::circuit::CircuitState;
pub use middleware::logging::RequestLogConfig;
pub use middleware::logging::RequestLogMiddleware;
pub use middleware::logging::SecurityAuditMiddleware;
pub use middleware::logging::SensitiveToolSet;
pub use middleware::logging::StructuredLogMiddleware;
pub use middleware::metrics::MetricsMiddleware;
pub use middleware::rate_limit::AdaptiveRateLimitMiddleware;
pub use middleware::rate_limit::KeyStrategy;
pub use middleware::rate_limit::LoadSignal;
pub use middleware::rate_limit::RateLimitMiddleware;
pub use middleware::rate_limit::SharedLoad;
pub use middleware::recovery::RecoveryMiddleware;
pub use middleware::retry::RetryConfig;
pub use middleware::retry::RetryMiddleware;
pub use migration::BackendArm;
pub use migration::GlobalMigrationConfig;
pub use migration::MigratedTool;
pub use migration::MigrationError;
pub use migration::MigrationRouter;
pub use migration::MigrationStatus;
pub use migration::RouteDecision;
pub use observe::InMemoryMetrics;
pub use observe::LogLevel;
pub use observe::LogMetrics;
pub use observe::LogRecord;
pub use observe::LogSink;
pub use observe::MemoryLogSink;
pub use observe::MetricTags;
pub use observe::MetricsSink;
pub use observe::NoopLogSink;
pub use observe::NoopMetrics;
pub use observe::StderrLogSink;
pub use registry::PublishedHandler;
pub use registry::ToolPublisher;
pub use registry::ToolRegistry;
pub use tool::FnTool;
pub use tool::Tool;
pub use tool::ToolDefinition;
pub use tool::ToolResult;
