// crates/nimbus-mcp/src/bootstrap.rs
// ============================================================================
// Module: Server Bootstrap
// Description: Assembles the pipeline, providers, and server from config.
// Purpose: One place that wires sinks, chain layers, and tool registration.
// Dependencies: nimbus-core, nimbus-config, nimbus-providers
// ============================================================================

//! ## Overview
//! Bootstrap turns a validated [`nimbus_config::NimbusConfig`] into a ready
//! [`McpServer`]: observability sinks, the middleware chain in production
//! priority order, the migration router, provider initialization and tool
//! registration, and the built-in health and migration-admin tools.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::Weak;
use std::time::Duration;

use nimbus_config::Config;
use nimbus_config::LimiterStrategy;
use nimbus_config::NimbusConfig;
use nimbus_core::AdaptiveRateLimitMiddleware;
use nimbus_core::CircuitBreakerConfig;
use nimbus_core::CircuitBreakerMiddleware;
use nimbus_core::FnTool;
use nimbus_core::GlobalMigrationConfig;
use nimbus_core::InMemoryMetrics;
use nimbus_core::KeyStrategy;
use nimbus_core::LogLevel;
use nimbus_core::LogSink;
use nimbus_core::MetricsMiddleware;
use nimbus_core::Middleware;
use nimbus_core::MiddlewareChain;
use nimbus_core::MigrationRouter;
use nimbus_core::RateLimitMiddleware;
use nimbus_core::RateLimiter;
use nimbus_core::RecoveryMiddleware;
use nimbus_core::RequestLogConfig;
use nimbus_core::RequestLogMiddleware;
use nimbus_core::RetryConfig;
use nimbus_core::RetryMiddleware;
use nimbus_core::SecurityAuditMiddleware;
use nimbus_core::SensitiveToolSet;
use nimbus_core::SharedLoad;
use nimbus_core::SlidingWindowLimiter;
use nimbus_core::StderrLogSink;
use nimbus_core::StructuredLogMiddleware;
use nimbus_core::TokenBucketLimiter;
use nimbus_core::Tool;
use nimbus_core::ToolError;
use nimbus_core::ToolExecutor;
use nimbus_core::ToolRegistry;
use nimbus_providers::LinodeProviderFactory;
use nimbus_providers::Provider;
use nimbus_providers::ProviderFactory;
use nimbus_providers::ProviderRegistry;
use serde_json::json;

use crate::front::PipelineFront;
use crate::server::McpServer;
use crate::server::McpServerError;
use crate::server::ServerSettings;

// ============================================================================
// SECTION: Bootstrap Result
// ============================================================================

/// Assembled server plus the handles the binary needs at runtime.
pub struct Bootstrap {
    /// Ready MCP server.
    pub server: Arc<McpServer>,
    /// Metrics aggregate backing the Prometheus listener.
    pub metrics: Arc<InMemoryMetrics>,
    /// Migration router, exposed for operational tooling.
    pub router: Arc<MigrationRouter>,
    /// Load signal feeding the adaptive limiter when installed.
    pub load: Arc<SharedLoad>,
    /// Initialized providers, shut down on exit.
    pub active_providers: Mutex<Vec<Box<dyn Provider>>>,
}

impl Bootstrap {
    /// Shuts down every initialized provider.
    pub fn shutdown(&self) {
        if let Ok(mut providers) = self.active_providers.lock() {
            for provider in providers.iter_mut() {
                let _ = provider.shutdown();
            }
        }
    }
}

// ============================================================================
// SECTION: Assembly
// ============================================================================

/// Builds a ready server from validated configuration.
///
/// # Errors
///
/// Returns [`McpServerError::Init`] when a provider fails to initialize or a
/// tool fails to register.
pub fn build(config: &NimbusConfig) -> Result<Bootstrap, McpServerError> {
    let providers = Arc::new(ProviderRegistry::new());
    providers
        .register("linode", Arc::new(LinodeProviderFactory::new()) as Arc<dyn ProviderFactory>)
        .map_err(|err| McpServerError::Init(err.to_string()))?;
    build_with_providers(config, providers)
}

/// Builds a ready server over a caller-supplied provider registry.
///
/// # Errors
///
/// Returns [`McpServerError::Init`] when a provider fails to initialize or a
/// tool fails to register.
pub fn build_with_providers(
    config: &NimbusConfig,
    providers: Arc<ProviderRegistry>,
) -> Result<Bootstrap, McpServerError> {
    let sink: Arc<dyn LogSink> =
        Arc::new(StderrLogSink::new(LogLevel::parse(&config.log.level)));
    let metrics = Arc::new(InMemoryMetrics::new());
    let load = Arc::new(SharedLoad::new(0.0));

    let chain = build_chain(config, &sink, &metrics, &load)?;
    let router = Arc::new(MigrationRouter::new(
        GlobalMigrationConfig {
            migration_enabled: config.migration.enabled,
            default_percentage: config.migration.default_percentage,
            max_percentage: config.migration.max_percentage,
            ..GlobalMigrationConfig::default()
        },
        Arc::clone(&sink),
    ));

    let tools = Arc::new(ToolRegistry::new());

    let mut active = Vec::new();
    let mut provider_tag = None;
    for (name, block) in &config.providers {
        if !block.enabled {
            continue;
        }
        let mut provider =
            providers.get(name).map_err(|err| McpServerError::Init(err.to_string()))?;
        let accessor = provider_accessor(name, block.accessor());
        provider
            .initialize(&accessor)
            .map_err(|err| McpServerError::Init(err.to_string()))?;
        provider
            .register_tools(&tools, &router)
            .map_err(|err| McpServerError::Init(err.to_string()))?;
        provider_tag.get_or_insert_with(|| name.clone());
        active.push(provider);
    }

    register_builtin_tools(&tools, &providers, &router, &config.server.name)?;

    let mut executor = ToolExecutor::new(Arc::clone(&tools), chain);
    if let Some(provider) = provider_tag {
        executor = executor.with_provider(provider);
    }
    let front = PipelineFront::new(Arc::new(executor));
    let server = Arc::new(McpServer::new(
        ServerSettings {
            name: config.server.name.clone(),
            max_body_bytes: config.server.max_body_bytes,
            bind: config.server.bind.clone(),
        },
        front,
    ));
    Ok(Bootstrap {
        server,
        metrics,
        router,
        load,
        active_providers: Mutex::new(active),
    })
}

/// Assembles the middleware chain in production priority order.
fn build_chain(
    config: &NimbusConfig,
    sink: &Arc<dyn LogSink>,
    metrics: &Arc<InMemoryMetrics>,
    load: &Arc<SharedLoad>,
) -> Result<Arc<MiddlewareChain>, McpServerError> {
    let chain = MiddlewareChain::new();
    let add = |middleware: Arc<dyn Middleware>| {
        chain.add(middleware).map_err(|err| McpServerError::Init(err.to_string()))
    };
    add(Arc::new(RecoveryMiddleware::new()))?;
    add(Arc::new(SecurityAuditMiddleware::new(
        Arc::clone(sink),
        SensitiveToolSet::defaults(),
    )))?;
    add(Arc::new(RequestLogMiddleware::new(
        Arc::clone(sink),
        RequestLogConfig {
            log_parameters: config.log.log_parameters,
            log_results: config.log.log_results,
        },
    )))?;
    add(Arc::new(StructuredLogMiddleware::new(Arc::clone(sink))))?;
    add(Arc::new(MetricsMiddleware::new(Arc::clone(metrics) as _)))?;
    if config.rate_limit.enabled {
        let window = Duration::from_millis(config.rate_limit.window_ms);
        let limiter: Arc<dyn RateLimiter> = match config.rate_limit.strategy {
            LimiterStrategy::TokenBucket => {
                let capacity = if config.rate_limit.capacity == 0 {
                    config.rate_limit.rate
                } else {
                    config.rate_limit.capacity
                };
                Arc::new(TokenBucketLimiter::with_capacity(
                    config.rate_limit.rate,
                    window,
                    capacity,
                ))
            }
            LimiterStrategy::SlidingWindow => {
                let limit = usize::try_from(config.rate_limit.rate).unwrap_or(usize::MAX);
                Arc::new(SlidingWindowLimiter::new(limit, window))
            }
        };
        let key_strategy = KeyStrategy::parse(&config.rate_limit.key_strategy);
        if config.rate_limit.adaptive {
            add(Arc::new(AdaptiveRateLimitMiddleware::with_threshold(
                limiter,
                key_strategy,
                Arc::clone(load) as _,
                config.rate_limit.load_threshold,
            )))?;
        } else {
            add(Arc::new(RateLimitMiddleware::new(limiter, key_strategy)))?;
        }
    }
    if config.circuit_breaker.enabled {
        add(Arc::new(CircuitBreakerMiddleware::new(CircuitBreakerConfig {
            failure_threshold: config.circuit_breaker.failure_threshold,
            recovery_timeout: Duration::from_millis(config.circuit_breaker.recovery_timeout_ms),
            success_threshold: config.circuit_breaker.success_threshold,
        })))?;
    }
    if config.retry.enabled {
        add(Arc::new(RetryMiddleware::new(RetryConfig {
            max_retries: config.retry.max_retries,
            base_delay: Duration::from_millis(config.retry.base_delay_ms),
            max_delay: Duration::from_millis(config.retry.max_delay_ms),
            backoff_factor: config.retry.backoff_factor,
        })))?;
    }
    Ok(Arc::new(chain))
}

/// Overlays provider environment variables onto the settings accessor.
fn provider_accessor(name: &str, accessor: Config) -> Config {
    if name != "linode" {
        return accessor;
    }
    let mut accessor = accessor;
    if !accessor.is_set("api_token") {
        if let Ok(token) = env::var("LINODE_API_TOKEN") {
            accessor = accessor.with_override("api_token", token);
        }
    }
    if !accessor.is_set("api_url") {
        if let Ok(url) = env::var("LINODE_API_URL") {
            accessor = accessor.with_override("api_url", url);
        }
    }
    accessor
}

/// Registers the health and migration-admin tools.
fn register_builtin_tools(
    tools: &Arc<ToolRegistry>,
    providers: &Arc<ProviderRegistry>,
    router: &Arc<MigrationRouter>,
    server_name: &str,
) -> Result<(), McpServerError> {
    let register = |tool: Arc<dyn Tool>| {
        tools.register(tool).map_err(|err| McpServerError::Init(err.to_string()))
    };

    let registry: Weak<ToolRegistry> = Arc::downgrade(tools);
    let provider_registry = Arc::clone(providers);
    let server_name = server_name.to_string();
    register(Arc::new(FnTool::new(
        "health_check",
        "Report server health and registered surface counts.",
        json!({"type": "object", "properties": {}, "additionalProperties": false}),
        move |_, _| {
            let tool_count = registry.upgrade().map_or(0, |registry| registry.count());
            Ok(json!({
                "status": "healthy",
                "server": server_name,
                "providers": provider_registry.count(),
                "tools": tool_count,
            }))
        },
    )))?;

    let status_router = Arc::clone(router);
    register(Arc::new(FnTool::new(
        "migration_status",
        "Snapshot migration settings, global config, and per-arm metrics.",
        json!({"type": "object", "properties": {}, "additionalProperties": false}),
        move |_, _| {
            serde_json::to_value(status_router.migration_status())
                .map_err(|_| ToolError::Serialization)
        },
    )))?;

    let percentage_router = Arc::clone(router);
    register(Arc::new(FnTool::new(
        "set_migration_percentage",
        "Set the provider-native traffic percentage for one tool.",
        json!({
            "type": "object",
            "properties": {
                "tool": {"type": "string", "minLength": 1},
                "percentage": {"type": "integer", "minimum": 0, "maximum": 100},
            },
            "required": ["tool", "percentage"],
            "additionalProperties": false,
        }),
        move |ctx, params| {
            let tool = params
                .get("tool")
                .and_then(serde_json::Value::as_str)
                .ok_or_else(|| ToolError::ParamValidation("tool must be a string".to_string()))?;
            let percentage = params
                .get("percentage")
                .and_then(serde_json::Value::as_u64)
                .and_then(|value| u8::try_from(value).ok())
                .ok_or_else(|| {
                    ToolError::ParamValidation("percentage must be within [0, 100]".to_string())
                })?;
            let updated_by = ctx.user_id().unwrap_or("mcp").to_string();
            percentage_router.set_tool_migration_percentage(tool, percentage, &updated_by)?;
            Ok(json!({"tool": tool, "percentage": percentage}))
        },
    )))?;

    let enable_router = Arc::clone(router);
    register(Arc::new(FnTool::new(
        "enable_rollback",
        "Engage the global migration kill-switch.",
        json!({"type": "object", "properties": {}, "additionalProperties": false}),
        move |ctx, _| {
            enable_router.enable_global_rollback(ctx.user_id().unwrap_or("mcp"))?;
            Ok(json!({"rollback_mode": true}))
        },
    )))?;

    let disable_router = Arc::clone(router);
    register(Arc::new(FnTool::new(
        "disable_rollback",
        "Release the global migration kill-switch.",
        json!({"type": "object", "properties": {}, "additionalProperties": false}),
        move |ctx, _| {
            disable_router.disable_global_rollback(ctx.user_id().unwrap_or("mcp"))?;
            Ok(json!({"rollback_mode": false}))
        },
    )))?;

    Ok(())
}
