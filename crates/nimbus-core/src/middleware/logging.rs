// crates/nimbus-core/src/middleware/logging.rs
// ============================================================================
// Module: Logging Middlewares
// Description: Audit, request, and structured logging layers.
// Purpose: Emit lifecycle records for every tool invocation.
// Dependencies: nimbus-core::{chain, observe}
// ============================================================================

//! ## Overview
//! Three layers at fixed priorities: the security audit layer surrounds
//! sensitive tools with `initiated`/`completed`/`failed` records, the request
//! layer emits start and end lines, and the structured layer emits exactly
//! one summary record per invocation. Parameters and results are only logged
//! when explicitly enabled; labels must never carry secrets.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;
use serde_json::json;

use crate::chain::Middleware;
use crate::chain::Next;
use crate::chain::PRIORITY_AUDIT;
use crate::chain::PRIORITY_REQUEST_LOG;
use crate::chain::PRIORITY_STRUCTURED_LOG;
use crate::context::ExecutionContext;
use crate::observe::LogLevel;
use crate::observe::LogRecord;
use crate::observe::LogSink;
use crate::tool::Tool;
use crate::tool::ToolResult;

// ============================================================================
// SECTION: Sensitive Tools
// ============================================================================

/// Verbs that mark a tool as sensitive regardless of configuration.
const SENSITIVE_VERBS: &[&str] = &["boot", "shutdown", "reboot"];

/// Matcher for tools that require security auditing.
#[derive(Debug, Clone, Default)]
pub struct SensitiveToolSet {
    /// Exact tool names configured as sensitive.
    names: BTreeSet<String>,
}

impl SensitiveToolSet {
    /// Returns the default sensitive set.
    #[must_use]
    pub fn defaults() -> Self {
        let mut names = BTreeSet::new();
        names.insert("account_switch".to_string());
        Self {
            names,
        }
    }

    /// Adds an exact tool name to the set.
    pub fn insert(&mut self, name: impl Into<String>) {
        self.names.insert(name.into());
    }

    /// Returns true when the tool requires audit records.
    #[must_use]
    pub fn matches(&self, tool_name: &str) -> bool {
        if self.names.contains(tool_name) {
            return true;
        }
        if tool_name.ends_with("_delete") || tool_name.starts_with("delete_") {
            return true;
        }
        SENSITIVE_VERBS.iter().any(|verb| tool_name.contains(verb))
    }
}

// ============================================================================
// SECTION: Security Audit
// ============================================================================

/// Audit layer for sensitive tools.
pub struct SecurityAuditMiddleware {
    /// Downstream log sink.
    sink: Arc<dyn LogSink>,
    /// Tools requiring audit records.
    sensitive: SensitiveToolSet,
}

impl SecurityAuditMiddleware {
    /// Creates the layer with the given sink and sensitive set.
    #[must_use]
    pub fn new(sink: Arc<dyn LogSink>, sensitive: SensitiveToolSet) -> Self {
        Self {
            sink,
            sensitive,
        }
    }

    /// Emits one audit record for the given phase.
    fn emit(&self, ctx: &ExecutionContext, phase: &str) {
        let record = LogRecord::new(LogLevel::Warn, "security_audit")
            .field("phase", json!(phase))
            .field("tool", json!(ctx.tool_name()))
            .field("request_id", json!(ctx.request_id()))
            .field("user_id", json!(ctx.user_id()));
        self.sink.record(&record);
    }
}

impl Middleware for SecurityAuditMiddleware {
    fn name(&self) -> &str {
        "security_audit"
    }

    fn priority(&self) -> i32 {
        PRIORITY_AUDIT
    }

    fn execute(
        &self,
        ctx: &ExecutionContext,
        tool: &dyn Tool,
        params: &Value,
        next: Next<'_>,
    ) -> ToolResult {
        if !self.sensitive.matches(ctx.tool_name()) {
            return next(ctx, tool, params);
        }
        self.emit(ctx, "initiated");
        let result = next(ctx, tool, params);
        match &result {
            Ok(_) => self.emit(ctx, "completed"),
            Err(_) => self.emit(ctx, "failed"),
        }
        result
    }
}

// ============================================================================
// SECTION: Request Logging
// ============================================================================

/// Payload logging switches for the request layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLogConfig {
    /// Log raw parameters on start records.
    pub log_parameters: bool,
    /// Log raw results on end records.
    pub log_results: bool,
}

/// Start/end line layer for every invocation.
pub struct RequestLogMiddleware {
    /// Downstream log sink.
    sink: Arc<dyn LogSink>,
    /// Payload logging switches.
    config: RequestLogConfig,
}

impl RequestLogMiddleware {
    /// Creates the layer with the given sink and switches.
    #[must_use]
    pub fn new(sink: Arc<dyn LogSink>, config: RequestLogConfig) -> Self {
        Self {
            sink,
            config,
        }
    }
}

impl Middleware for RequestLogMiddleware {
    fn name(&self) -> &str {
        "request_log"
    }

    fn priority(&self) -> i32 {
        PRIORITY_REQUEST_LOG
    }

    fn execute(
        &self,
        ctx: &ExecutionContext,
        tool: &dyn Tool,
        params: &Value,
        next: Next<'_>,
    ) -> ToolResult {
        let mut start = LogRecord::new(LogLevel::Info, "tool_started")
            .field("tool", json!(ctx.tool_name()))
            .field("request_id", json!(ctx.request_id()))
            .field("provider", json!(ctx.provider()))
            .field("params_count", json!(params_count(params)));
        if self.config.log_parameters {
            start = start.field("parameters", params.clone());
        }
        self.sink.record(&start);

        let result = next(ctx, tool, params);

        let duration_ms = u64::try_from(ctx.elapsed().as_millis()).unwrap_or(u64::MAX);
        let mut end = match &result {
            Ok(value) => {
                let mut record = LogRecord::new(LogLevel::Info, "tool_completed");
                if self.config.log_results {
                    record = record.field("result", value.clone());
                }
                record
            }
            Err(err) => LogRecord::new(LogLevel::Error, "tool_failed")
                .field("error", json!(err.to_string())),
        };
        end = end
            .field("tool", json!(ctx.tool_name()))
            .field("request_id", json!(ctx.request_id()))
            .field("duration_ms", json!(duration_ms));
        self.sink.record(&end);
        result
    }
}

/// Returns the number of top-level parameters.
fn params_count(params: &Value) -> usize {
    params.as_object().map_or(0, serde_json::Map::len)
}

// ============================================================================
// SECTION: Structured Logging
// ============================================================================

/// One-record-per-invocation summary layer.
pub struct StructuredLogMiddleware {
    /// Downstream log sink.
    sink: Arc<dyn LogSink>,
}

impl StructuredLogMiddleware {
    /// Creates the layer with the given sink.
    #[must_use]
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink,
        }
    }
}

impl Middleware for StructuredLogMiddleware {
    fn name(&self) -> &str {
        "structured_log"
    }

    fn priority(&self) -> i32 {
        PRIORITY_STRUCTURED_LOG
    }

    fn execute(
        &self,
        ctx: &ExecutionContext,
        tool: &dyn Tool,
        params: &Value,
        next: Next<'_>,
    ) -> ToolResult {
        let result = next(ctx, tool, params);
        let duration_ms = u64::try_from(ctx.elapsed().as_millis()).unwrap_or(u64::MAX);
        let mut record = LogRecord::new(LogLevel::Info, "tool_invocation")
            .field("event_type", json!("tool_invocation"))
            .field("tool_name", json!(ctx.tool_name()))
            .field("request_id", json!(ctx.request_id()))
            .field("provider", json!(ctx.provider()))
            .field("user_id", json!(ctx.user_id()))
            .field("duration_ms", json!(duration_ms))
            .field("success", json!(result.is_ok()));
        if let Err(err) = &result {
            record = record.field("error_message", json!(err.to_string()));
        }
        self.sink.record(&record);
        result
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
