// crates/nimbus-core/src/error.rs
// ============================================================================
// Module: Error Taxonomy
// Description: Typed errors surfaced by the tool-execution pipeline.
// Purpose: Give every middleware and registry a stable error vocabulary.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Every failure that crosses a pipeline boundary is a [`ToolError`]. The
//! variant is the source of truth for behavior decisions (retry, metrics
//! labels, transport mapping); free-form message matching exists only as a
//! fallback for errors bubbled out of opaque provider SDK calls.
//!
//! ## Invariants
//! - Enrichment rewrites the message but never changes the variant.
//! - Classification helpers are pure and total.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Message fragments that mark an error as non-retryable.
const NON_RETRYABLE_FRAGMENTS: &[&str] = &[
    "authentication",
    "unauthorized",
    "forbidden",
    "not found",
    "bad request",
    "validation",
    "invalid",
    "rate limit",
];

/// Message fragments that mark an error as retryable.
const RETRYABLE_FRAGMENTS: &[&str] =
    &["timeout", "deadline", "network", "connection", "server error", "500", "502", "503"];

// ============================================================================
// SECTION: Tool Errors
// ============================================================================

/// Errors surfaced by tool execution and the surrounding pipeline.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Parameter validation rejected the request before execution.
    #[error("parameter validation failed: {0}")]
    ParamValidation(String),
    /// A rate limiter refused the invocation.
    #[error("rate limit exceeded for tool {tool}; retry after {retry_after:?}")]
    RateLimited {
        /// Tool that was throttled.
        tool: String,
        /// Time until the next permit becomes available.
        retry_after: Duration,
    },
    /// The adaptive limiter refused the invocation under load.
    #[error("system load too high: {0}")]
    SystemLoadHigh(String),
    /// The circuit breaker is open for the invocation scope.
    #[error("circuit open for scope {scope}")]
    CircuitOpen {
        /// Breaker scope that is open.
        scope: String,
    },
    /// A transient failure that the retry middleware may replay.
    #[error("retryable failure: {0}")]
    Retryable(String),
    /// A terminal failure surfaced after the first attempt.
    #[error("{0}")]
    NonRetryable(String),
    /// A panic captured by the recovery middleware.
    #[error("panic in tool {tool} (request {request_id}): {payload}")]
    Panic {
        /// Tool that panicked.
        tool: String,
        /// Request identifier of the invocation.
        request_id: String,
        /// Captured panic payload.
        payload: String,
    },
    /// The ambient context was cancelled mid-flight.
    #[error("cancelled: {0}")]
    Cancelled(String),
    /// A provider was used before initialization.
    #[error("provider not initialized: {0}")]
    NotInitialized(String),
    /// A provider was initialized twice.
    #[error("provider already initialized: {0}")]
    AlreadyInitialized(String),
    /// Provider configuration is missing required keys.
    #[error("provider {provider} missing required config keys: {keys:?}")]
    ConfigMissingKeys {
        /// Provider whose configuration is incomplete.
        provider: String,
        /// Keys that were absent.
        keys: Vec<String>,
    },
    /// No tool is registered under the requested name.
    #[error("unknown tool: {0}")]
    ToolNotFound(String),
    /// A tool name was registered twice.
    #[error("tool already registered: {0}")]
    DuplicateRegistration(String),
    /// A payload could not be serialized for transport.
    #[error("serialization failed")]
    Serialization,
    /// An internal invariant was violated (poisoned lock, broken state).
    #[error("internal error: {0}")]
    Internal(String),
}

impl ToolError {
    /// Returns the stable kind label for this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ParamValidation(_) => ErrorKind::ParamValidation,
            Self::RateLimited {
                ..
            } => ErrorKind::RateLimited,
            Self::SystemLoadHigh(_) => ErrorKind::SystemLoadHigh,
            Self::CircuitOpen {
                ..
            } => ErrorKind::CircuitOpen,
            Self::Retryable(_) => ErrorKind::Retryable,
            Self::NonRetryable(_) => ErrorKind::NonRetryable,
            Self::Panic {
                ..
            } => ErrorKind::Panic,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::NotInitialized(_) => ErrorKind::NotInitialized,
            Self::AlreadyInitialized(_) => ErrorKind::AlreadyInitialized,
            Self::ConfigMissingKeys {
                ..
            } => ErrorKind::ConfigMissingKeys,
            Self::ToolNotFound(_) => ErrorKind::ToolNotFound,
            Self::DuplicateRegistration(_) => ErrorKind::DuplicateRegistration,
            Self::Serialization => ErrorKind::Serialization,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns true when the retry middleware may replay this error.
    ///
    /// The structured variant decides first; the message fragments are the
    /// fallback for opaque [`ToolError::NonRetryable`] payloads carried out of
    /// provider SDK calls.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Retryable(_) => true,
            Self::NonRetryable(message) | Self::Internal(message) => {
                classify_message(message).unwrap_or(false)
            }
            _ => false,
        }
    }

    /// Rewrites the message with invocation metadata, preserving the variant.
    #[must_use]
    pub fn enrich(self, tool: &str, provider: Option<&str>, request_id: &str) -> Self {
        let tag = provider.map_or_else(
            || format!("tool={tool} request_id={request_id}"),
            |provider| format!("tool={tool} provider={provider} request_id={request_id}"),
        );
        match self {
            Self::ParamValidation(message) => Self::ParamValidation(format!("{tag}: {message}")),
            Self::SystemLoadHigh(message) => Self::SystemLoadHigh(format!("{tag}: {message}")),
            Self::Retryable(message) => Self::Retryable(format!("{tag}: {message}")),
            Self::NonRetryable(message) => Self::NonRetryable(format!("{tag}: {message}")),
            Self::Cancelled(message) => Self::Cancelled(format!("{tag}: {message}")),
            Self::Internal(message) => Self::Internal(format!("{tag}: {message}")),
            other => other,
        }
    }

    /// Returns the metrics label for the error, classified by kind first and
    /// by message fragments second.
    #[must_use]
    pub fn metrics_label(&self) -> &'static str {
        match self.kind() {
            ErrorKind::RateLimited | ErrorKind::SystemLoadHigh => "rate_limit",
            ErrorKind::ParamValidation => "validation",
            ErrorKind::ToolNotFound => "not_found",
            ErrorKind::Cancelled => "timeout",
            _ => label_from_message(&self.to_string()),
        }
    }
}

/// Stable error kind labels for metrics and transport mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Parameter validation failure.
    ParamValidation,
    /// Rate limiter rejection.
    RateLimited,
    /// Adaptive limiter rejection under load.
    SystemLoadHigh,
    /// Circuit breaker short-circuit.
    CircuitOpen,
    /// Transient, replayable failure.
    Retryable,
    /// Terminal failure.
    NonRetryable,
    /// Captured panic.
    Panic,
    /// Context cancellation.
    Cancelled,
    /// Provider used before initialization.
    NotInitialized,
    /// Provider initialized twice.
    AlreadyInitialized,
    /// Missing required provider configuration.
    ConfigMissingKeys,
    /// Unknown tool name.
    ToolNotFound,
    /// Duplicate tool registration.
    DuplicateRegistration,
    /// Serialization failure.
    Serialization,
    /// Internal invariant violation.
    Internal,
}

impl ErrorKind {
    /// Returns a stable label for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ParamValidation => "param_validation",
            Self::RateLimited => "rate_limited",
            Self::SystemLoadHigh => "system_load_high",
            Self::CircuitOpen => "circuit_open",
            Self::Retryable => "retryable",
            Self::NonRetryable => "non_retryable",
            Self::Panic => "panic",
            Self::Cancelled => "cancelled",
            Self::NotInitialized => "not_initialized",
            Self::AlreadyInitialized => "already_initialized",
            Self::ConfigMissingKeys => "config_missing_keys",
            Self::ToolNotFound => "tool_not_found",
            Self::DuplicateRegistration => "duplicate_registration",
            Self::Serialization => "serialization",
            Self::Internal => "internal",
        }
    }
}

// ============================================================================
// SECTION: Message Classification
// ============================================================================

/// Classifies a free-form error message as retryable.
///
/// Returns `Some(false)` for non-retryable fragments, `Some(true)` for
/// retryable fragments, and `None` when no fragment matches. Non-retryable
/// fragments win when both tables match.
#[must_use]
pub fn classify_message(message: &str) -> Option<bool> {
    let lowered = message.to_lowercase();
    if NON_RETRYABLE_FRAGMENTS.iter().any(|fragment| lowered.contains(fragment)) {
        return Some(false);
    }
    if RETRYABLE_FRAGMENTS.iter().any(|fragment| lowered.contains(fragment)) {
        return Some(true);
    }
    None
}

/// Maps a free-form error message onto the metrics error-type label set.
#[must_use]
pub fn label_from_message(message: &str) -> &'static str {
    let lowered = message.to_lowercase();
    if lowered.contains("timeout") || lowered.contains("deadline") {
        return "timeout";
    }
    if lowered.contains("authentication")
        || lowered.contains("unauthorized")
        || lowered.contains("forbidden")
    {
        return "auth";
    }
    if lowered.contains("not found") {
        return "not_found";
    }
    if lowered.contains("rate limit") {
        return "rate_limit";
    }
    if lowered.contains("validation") || lowered.contains("invalid") {
        return "validation";
    }
    if lowered.contains("network") || lowered.contains("connection") {
        return "network";
    }
    "unknown"
}

// ============================================================================
// SECTION: Tests
// ============================================================================
