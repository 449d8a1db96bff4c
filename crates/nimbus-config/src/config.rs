// crates/nimbus-config/src/config.rs
// ============================================================================
// Module: Nimbus Configuration
// Description: Configuration loading and validation for the Nimbus server.
// Purpose: Provide strict, fail-closed config parsing with typed defaults.
// Dependencies: serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with a size limit, overlaid with
//! well-known environment variables, and validated before the server starts.
//! Missing or invalid configuration fails closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::accessor::Config;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
pub const DEFAULT_CONFIG_NAME: &str = "nimbus.toml";
/// Maximum configuration file size in bytes.
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;
/// Minimum allowed rate limit window in milliseconds.
const MIN_RATE_LIMIT_WINDOW_MS: u64 = 100;
/// Maximum allowed rate limit window in milliseconds.
const MAX_RATE_LIMIT_WINDOW_MS: u64 = 60_000;
/// Environment variable carrying the minimum log level.
const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
/// Environment variable toggling the metrics listener.
const ENV_ENABLE_METRICS: &str = "ENABLE_METRICS";
/// Environment variable overriding the metrics port.
const ENV_METRICS_PORT: &str = "METRICS_PORT";
/// Environment variable overriding the advertised server name.
const ENV_SERVER_NAME: &str = "CLOUD_MCP_SERVER_NAME";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// Transport selection for the MCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerTransport {
    /// Newline-delimited JSON-RPC over stdin/stdout.
    #[default]
    Stdio,
    /// JSON-RPC over HTTP.
    Http,
}

/// MCP server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Advertised server name.
    pub name: String,
    /// Transport type for MCP.
    pub transport: ServerTransport,
    /// Bind address for the HTTP transport.
    pub bind: Option<String>,
    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "nimbus-mcp".to_string(),
            transport: ServerTransport::Stdio,
            bind: None,
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Default maximum request body size in bytes.
const fn default_max_body_bytes() -> usize {
    1024 * 1024
}

// ============================================================================
// SECTION: Logging and Metrics
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// Minimum severity emitted by the stderr sink.
    pub level: String,
    /// Log raw tool parameters on start records.
    pub log_parameters: bool,
    /// Log raw tool results on end records.
    pub log_results: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_parameters: false,
            log_results: false,
        }
    }
}

/// Metrics exposition configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsConfig {
    /// Whether the Prometheus listener is served.
    pub enabled: bool,
    /// Listener port.
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9419,
        }
    }
}

// ============================================================================
// SECTION: Pipeline Layers
// ============================================================================

/// Rate limiter strategy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimiterStrategy {
    /// Token bucket with proportional refill.
    #[default]
    TokenBucket,
    /// Sliding window over admission timestamps.
    SlidingWindow,
}

/// Rate limit layer configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Whether the layer is installed.
    pub enabled: bool,
    /// Limiter strategy.
    pub strategy: LimiterStrategy,
    /// Permits per window.
    pub rate: u64,
    /// Window length in milliseconds.
    pub window_ms: u64,
    /// Bucket capacity; defaults to `rate` when zero.
    pub capacity: u64,
    /// Key derivation strategy name.
    pub key_strategy: String,
    /// Install the load-adaptive layer in addition to the plain one.
    pub adaptive: bool,
    /// Load reading above which the adaptive layer sheds traffic.
    pub load_threshold: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: LimiterStrategy::TokenBucket,
            rate: 100,
            window_ms: 1_000,
            capacity: 0,
            key_strategy: "per_tool".to_string(),
            adaptive: false,
            load_threshold: 0.8,
        }
    }
}

/// Retry layer configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Whether the layer is installed.
    pub enabled: bool,
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// First backoff delay in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound on any single delay in milliseconds.
    pub max_delay_ms: u64,
    /// Multiplier applied per attempt.
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_factor: 2.0,
        }
    }
}

/// Circuit breaker layer configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CircuitConfig {
    /// Whether the layer is installed.
    pub enabled: bool,
    /// Consecutive failures that trip a closed circuit.
    pub failure_threshold: u32,
    /// Open-state hold time in milliseconds.
    pub recovery_timeout_ms: u64,
    /// Probe successes required to close a half-open circuit.
    pub success_threshold: u32,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            recovery_timeout_ms: 60_000,
            success_threshold: 3,
        }
    }
}

/// Gradual migration configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MigrationConfig {
    /// Master switch for migration routing.
    pub enabled: bool,
    /// Percentage assigned to newly registered tools.
    pub default_percentage: u8,
    /// Ceiling for any per-tool percentage.
    pub max_percentage: u8,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_percentage: 0,
            max_percentage: 100,
        }
    }
}

// ============================================================================
// SECTION: Providers
// ============================================================================

/// Per-provider configuration block.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    /// Whether the provider is initialized at startup.
    pub enabled: bool,
    /// Opaque provider settings handed over through the accessor.
    pub settings: BTreeMap<String, toml::Value>,
}

impl ProviderConfig {
    /// Returns the opaque accessor view over this provider's settings.
    #[must_use]
    pub fn accessor(&self) -> Config {
        Config::new(self.settings.clone())
    }
}

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// Root Nimbus configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NimbusConfig {
    /// MCP server configuration.
    pub server: ServerConfig,
    /// Logging configuration.
    pub log: LogConfig,
    /// Metrics exposition configuration.
    pub metrics: MetricsConfig,
    /// Rate limit layer configuration.
    pub rate_limit: RateLimitConfig,
    /// Retry layer configuration.
    pub retry: RetryConfig,
    /// Circuit breaker layer configuration.
    pub circuit_breaker: CircuitConfig,
    /// Gradual migration configuration.
    pub migration: MigrationConfig,
    /// Provider blocks keyed by provider name.
    pub providers: BTreeMap<String, ProviderConfig>,
}

impl NimbusConfig {
    /// Loads configuration from an optional path, overlaying the
    /// environment.
    ///
    /// A missing default file yields built-in defaults; an explicitly named
    /// missing file is an error.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on read, parse, or validation failure.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_NAME);
                if default.exists() { Self::from_file(default)? } else { Self::default() }
            }
        };
        config.apply_env_from(|key| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from one TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on read or parse failure.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let metadata =
            fs::metadata(path).map_err(|err| ConfigError::Io(format!("{}: {err}", path.display())))?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Io(format!("config file too large: {}", path.display())));
        }
        let raw = fs::read_to_string(path)
            .map_err(|err| ConfigError::Io(format!("{}: {err}", path.display())))?;
        Self::from_toml(&raw)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the document is malformed.
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Overlays well-known environment variables through a lookup function.
    ///
    /// The indirection keeps tests deterministic; production callers pass
    /// `std::env::var` via [`NimbusConfig::load`].
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log.level = level;
        }
        if let Some(enabled) = lookup(ENV_ENABLE_METRICS) {
            self.metrics.enabled = matches!(enabled.as_str(), "1" | "true" | "yes");
        }
        if let Some(port) = lookup(ENV_METRICS_PORT) {
            if let Ok(port) = port.parse() {
                self.metrics.port = port;
            }
        }
        if let Some(name) = lookup(ENV_SERVER_NAME) {
            self.server.name = name;
        }
    }

    /// Validates cross-field invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for the first violated invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.name.trim().is_empty() {
            return Err(ConfigError::Invalid("server.name must be non-empty".to_string()));
        }
        if self.server.transport == ServerTransport::Http && self.server.bind.is_none() {
            return Err(ConfigError::Invalid(
                "server.bind is required for the http transport".to_string(),
            ));
        }
        if self.server.max_body_bytes == 0 {
            return Err(ConfigError::Invalid("server.max_body_bytes must be > 0".to_string()));
        }
        if self.rate_limit.enabled {
            if self.rate_limit.rate == 0 {
                return Err(ConfigError::Invalid("rate_limit.rate must be > 0".to_string()));
            }
            if !(MIN_RATE_LIMIT_WINDOW_MS..=MAX_RATE_LIMIT_WINDOW_MS)
                .contains(&self.rate_limit.window_ms)
            {
                return Err(ConfigError::Invalid(format!(
                    "rate_limit.window_ms must be within [{MIN_RATE_LIMIT_WINDOW_MS}, \
                     {MAX_RATE_LIMIT_WINDOW_MS}]"
                )));
            }
        }
        if self.rate_limit.enabled
            && self.rate_limit.adaptive
            && !(0.0..=1.0).contains(&self.rate_limit.load_threshold)
        {
            return Err(ConfigError::Invalid(
                "rate_limit.load_threshold must be within [0.0, 1.0]".to_string(),
            ));
        }
        if self.retry.enabled && self.retry.backoff_factor < 1.0 {
            return Err(ConfigError::Invalid("retry.backoff_factor must be >= 1.0".to_string()));
        }
        if self.retry.enabled && self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::Invalid(
                "retry.base_delay_ms must not exceed retry.max_delay_ms".to_string(),
            ));
        }
        if self.circuit_breaker.enabled
            && (self.circuit_breaker.failure_threshold == 0
                || self.circuit_breaker.success_threshold == 0)
        {
            return Err(ConfigError::Invalid(
                "circuit_breaker thresholds must be > 0".to_string(),
            ));
        }
        if self.migration.max_percentage > 100 {
            return Err(ConfigError::Invalid(
                "migration.max_percentage must not exceed 100".to_string(),
            ));
        }
        if self.migration.default_percentage > self.migration.max_percentage {
            return Err(ConfigError::Invalid(
                "migration.default_percentage must not exceed migration.max_percentage"
                    .to_string(),
            ));
        }
        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(ConfigError::Invalid("metrics.port must be > 0".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only panic-based assertions."
    )]

    use super::LimiterStrategy;
    use super::NimbusConfig;
    use super::ServerTransport;

    #[test]
    fn defaults_validate() {
        let config = NimbusConfig::default();
        config.validate().unwrap();
        assert_eq!(config.server.name, "nimbus-mcp");
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
    }

    #[test]
    fn toml_round_trip_with_provider_block() {
        let raw = r#"
            [server]
            name = "nimbus-test"
            transport = "stdio"

            [rate_limit]
            strategy = "sliding_window"
            rate = 2
            window_ms = 1000

            [providers.linode]
            enabled = true

            [providers.linode.settings]
            api_token = "token-123"
            region = "us-east"
        "#;
        let config = NimbusConfig::from_toml(raw).unwrap();
        config.validate().unwrap();
        assert_eq!(config.server.name, "nimbus-test");
        assert_eq!(config.rate_limit.strategy, LimiterStrategy::SlidingWindow);
        let linode = config.providers.get("linode").unwrap();
        assert!(linode.enabled);
        assert_eq!(linode.accessor().get_string("api_token").as_deref(), Some("token-123"));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let raw = "[server]\nnmae = \"typo\"\n";
        assert!(NimbusConfig::from_toml(raw).is_err());
    }

    #[test]
    fn http_transport_requires_bind() {
        let mut config = NimbusConfig::default();
        config.server.transport = ServerTransport::Http;
        assert!(config.validate().is_err());
        config.server.bind = Some("127.0.0.1:8080".to_string());
        config.validate().unwrap();
    }

    #[test]
    fn env_overlay_wins_over_file_values() {
        let mut config = NimbusConfig::default();
        config.apply_env_from(|key| match key {
            "LOG_LEVEL" => Some("debug".to_string()),
            "ENABLE_METRICS" => Some("true".to_string()),
            "METRICS_PORT" => Some("9999".to_string()),
            "CLOUD_MCP_SERVER_NAME" => Some("nimbus-staging".to_string()),
            _ => None,
        });
        assert_eq!(config.log.level, "debug");
        assert!(config.metrics.enabled);
        assert_eq!(config.metrics.port, 9999);
        assert_eq!(config.server.name, "nimbus-staging");
    }

    #[test]
    fn migration_bounds_are_enforced() {
        let mut config = NimbusConfig::default();
        config.migration.default_percentage = 50;
        config.migration.max_percentage = 25;
        assert!(config.validate().is_err());
    }

    #[test]
    fn from_file_reads_and_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nimbus.toml");
        std::fs::write(&path, "[server]\nname = \"from-file\"\n").unwrap();
        let config = NimbusConfig::from_file(&path).unwrap();
        assert_eq!(config.server.name, "from-file");

        let missing = dir.path().join("absent.toml");
        assert!(NimbusConfig::from_file(&missing).is_err());
    }
}
