// crates/nimbus-core/src/migration.rs
// ============================================================================
// Module: Migration Router
// Description: Per-tool routing between service-backed and provider-native.
// Purpose: Drive gradual rollouts with percentages, force flags, rollback.
// Dependencies: nimbus-core::{tool, observe, error}, rand
// ============================================================================

//! ## Overview
//! During a gradual rollout two implementations of the same tool coexist.
//! The router decides per invocation which arm services the call: a global
//! kill-switch and maintenance mode dominate everything, per-tool force
//! flags dominate percentages, and the percentage draws from a
//! cryptographically secure source so observed decisions do not predict the
//! next one.
//!
//! ## Invariants
//! - A tool absent from the settings table routes service-backed regardless
//!   of global state.
//! - Force flags are mutually exclusive; setting one clears the other.
//! - `0 <= traffic_percentage <= global.max_percentage <= 100`.
//! - Latency buffers stay below the hard cap; overflow trims the oldest
//!   tenth.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::RwLock;
use std::time::Instant;

use rand::Rng;
use rand::rngs::OsRng;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::context::ExecutionContext;
use crate::context::epoch_millis;
use crate::error::ToolError;
use crate::observe::LogLevel;
use crate::observe::LogRecord;
use crate::observe::LogSink;
use crate::tool::Tool;
use crate::tool::ToolResult;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Hard cap on retained latency samples per arm.
const LATENCY_BUFFER_CAP: usize = 10_000;
/// Samples dropped from the front when the cap is exceeded.
const LATENCY_TRIM: usize = 1_000;

// ============================================================================
// SECTION: Backend Arms
// ============================================================================

/// The two coexisting implementations of a migrated tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendArm {
    /// Legacy service-backed implementation (the safe default).
    ServiceBacked,
    /// Direct provider-native implementation.
    ProviderNative,
}

impl BackendArm {
    /// Returns a stable label for the arm.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ServiceBacked => "service_backed",
            Self::ProviderNative => "provider_native",
        }
    }
}

/// Routing decision snapshotted at decision time.
///
/// Execution and metric recording run against the snapshot, so a force-flag
/// flip between decision and completion cannot misattribute metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDecision {
    /// Tool the decision applies to.
    pub tool: String,
    /// Arm chosen for this invocation.
    pub arm: BackendArm,
}

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Per-tool migration settings.
///
/// # Invariants
/// - `force_provider_native` and `force_service_backed` are never both set.
#[derive(Debug, Clone, Serialize)]
pub struct ToolMigrationSettings {
    /// Tool the settings apply to.
    pub tool_name: String,
    /// Whether migration is considered for this tool at all.
    pub migration_enabled: bool,
    /// Share of traffic routed provider-native, in `[0, 100]`.
    pub traffic_percentage: u8,
    /// Route every call provider-native.
    pub force_provider_native: bool,
    /// Route every call service-backed.
    pub force_service_backed: bool,
    /// Wall-clock of the last mutation in epoch milliseconds.
    pub last_updated_ms: u128,
    /// Operator that performed the last mutation.
    pub updated_by: String,
}

/// Global migration configuration.
#[derive(Debug, Clone, Serialize)]
pub struct GlobalMigrationConfig {
    /// Master switch for migration routing.
    pub migration_enabled: bool,
    /// Percentage assigned to newly registered tools.
    pub default_percentage: u8,
    /// Ceiling for any per-tool percentage.
    pub max_percentage: u8,
    /// Kill-switch routing every tool service-backed.
    pub rollback_mode: bool,
    /// Maintenance freeze routing every tool service-backed.
    pub maintenance_mode: bool,
    /// Wall-clock of the last mutation in epoch milliseconds.
    pub last_updated_ms: u128,
    /// Operator that performed the last mutation.
    pub updated_by: String,
}

impl Default for GlobalMigrationConfig {
    fn default() -> Self {
        Self {
            migration_enabled: true,
            default_percentage: 0,
            max_percentage: 100,
            rollback_mode: false,
            maintenance_mode: false,
            last_updated_ms: 0,
            updated_by: "bootstrap".to_string(),
        }
    }
}

// ============================================================================
// SECTION: Metrics
// ============================================================================

/// Execution counters and latency samples for one arm.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ArmMetrics {
    /// Calls routed to this arm.
    pub calls: u64,
    /// Calls that failed on this arm.
    pub errors: u64,
    /// Bounded latency samples in milliseconds, oldest first.
    pub latency_ms: Vec<u64>,
}

impl ArmMetrics {
    /// Records one call outcome, trimming the buffer at the cap.
    fn record(&mut self, success: bool, latency_ms: u64) {
        self.calls += 1;
        if !success {
            self.errors += 1;
        }
        self.latency_ms.push(latency_ms);
        if self.latency_ms.len() > LATENCY_BUFFER_CAP {
            self.latency_ms.drain(..LATENCY_TRIM);
        }
    }
}

/// Per-tool execution metrics for both arms.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolMigrationMetrics {
    /// Metrics for the provider-native arm.
    pub provider_native: ArmMetrics,
    /// Metrics for the service-backed arm.
    pub service_backed: ArmMetrics,
}

/// Deep snapshot of router state, safe to serialize without races.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationStatus {
    /// Per-tool settings at snapshot time.
    pub settings: BTreeMap<String, ToolMigrationSettings>,
    /// Global configuration at snapshot time.
    pub global: GlobalMigrationConfig,
    /// Per-tool metrics at snapshot time, latency arrays copied.
    pub metrics: BTreeMap<String, ToolMigrationMetrics>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Migration router mutation errors.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The tool is not registered with the router.
    #[error("tool not registered for migration: {0}")]
    UnknownTool(String),
    /// The requested percentage is outside `[0, 100]`.
    #[error("traffic percentage {0} out of range")]
    PercentageOutOfRange(u16),
    /// The requested percentage exceeds the global ceiling.
    #[error("traffic percentage {percentage} exceeds global maximum {max}")]
    AboveGlobalMax {
        /// Requested percentage.
        percentage: u8,
        /// Configured global ceiling.
        max: u8,
    },
    /// A router lock was poisoned.
    #[error("migration state lock poisoned")]
    LockPoisoned,
}

impl From<MigrationError> for ToolError {
    fn from(err: MigrationError) -> Self {
        match err {
            MigrationError::UnknownTool(_)
            | MigrationError::PercentageOutOfRange(_)
            | MigrationError::AboveGlobalMax {
                ..
            } => Self::ParamValidation(err.to_string()),
            MigrationError::LockPoisoned => Self::Internal(err.to_string()),
        }
    }
}

// ============================================================================
// SECTION: Router
// ============================================================================

/// Per-tool routing state, global config, and execution metrics.
pub struct MigrationRouter {
    /// Per-tool settings table.
    settings: RwLock<BTreeMap<String, ToolMigrationSettings>>,
    /// Global configuration.
    global: RwLock<GlobalMigrationConfig>,
    /// Execution metrics, guarded separately from the routing path.
    metrics: Mutex<BTreeMap<String, ToolMigrationMetrics>>,
    /// Sink for routing-change records.
    sink: Arc<dyn LogSink>,
}

impl MigrationRouter {
    /// Creates a router with the given global configuration.
    #[must_use]
    pub fn new(global: GlobalMigrationConfig, sink: Arc<dyn LogSink>) -> Self {
        Self {
            settings: RwLock::new(BTreeMap::new()),
            global: RwLock::new(global),
            metrics: Mutex::new(BTreeMap::new()),
            sink,
        }
    }

    /// Registers a tool with the global default percentage.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::LockPoisoned`] when router state is
    /// unavailable.
    pub fn register_tool(
        &self,
        tool_name: impl Into<String>,
        updated_by: &str,
    ) -> Result<(), MigrationError> {
        let tool_name = tool_name.into();
        let default_percentage =
            self.global.read().map_err(|_| MigrationError::LockPoisoned)?.default_percentage;
        let mut settings = self.settings.write().map_err(|_| MigrationError::LockPoisoned)?;
        settings.entry(tool_name.clone()).or_insert_with(|| ToolMigrationSettings {
            tool_name,
            migration_enabled: true,
            traffic_percentage: default_percentage,
            force_provider_native: false,
            force_service_backed: false,
            last_updated_ms: epoch_millis(),
            updated_by: updated_by.to_string(),
        });
        Ok(())
    }

    /// Returns true when the next call to `tool_name` should run
    /// provider-native.
    #[must_use]
    pub fn should_use_provider_native(&self, tool_name: &str) -> bool {
        let Ok(global) = self.global.read() else {
            return false;
        };
        if !global.migration_enabled || global.rollback_mode || global.maintenance_mode {
            return false;
        }
        drop(global);
        let Ok(settings) = self.settings.read() else {
            return false;
        };
        let Some(tool) = settings.get(tool_name) else {
            return false;
        };
        if !tool.migration_enabled || tool.force_service_backed {
            return false;
        }
        if tool.force_provider_native {
            return true;
        }
        let percentage = tool.traffic_percentage;
        drop(settings);
        if percentage == 0 {
            return false;
        }
        if percentage >= 100 {
            return true;
        }
        let draw: u8 = OsRng.gen_range(0..100);
        draw < percentage
    }

    /// Snapshots a routing decision for one invocation.
    #[must_use]
    pub fn decide(&self, tool_name: &str) -> RouteDecision {
        let arm = if self.should_use_provider_native(tool_name) {
            BackendArm::ProviderNative
        } else {
            BackendArm::ServiceBacked
        };
        RouteDecision {
            tool: tool_name.to_string(),
            arm,
        }
    }

    /// Sets the traffic percentage for a registered tool.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError`] when the percentage is out of range, above
    /// the global ceiling, or the tool is unknown.
    pub fn set_tool_migration_percentage(
        &self,
        tool_name: &str,
        percentage: u8,
        updated_by: &str,
    ) -> Result<(), MigrationError> {
        if percentage > 100 {
            return Err(MigrationError::PercentageOutOfRange(u16::from(percentage)));
        }
        let max = self.global.read().map_err(|_| MigrationError::LockPoisoned)?.max_percentage;
        if percentage > max {
            return Err(MigrationError::AboveGlobalMax {
                percentage,
                max,
            });
        }
        self.update_tool(tool_name, updated_by, |tool| {
            tool.traffic_percentage = percentage;
        })?;
        self.log_change("set_percentage", tool_name, updated_by, json!(percentage));
        Ok(())
    }

    /// Forces every call to the provider-native arm.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::UnknownTool`] when the tool is unknown.
    pub fn force_provider_native(
        &self,
        tool_name: &str,
        updated_by: &str,
    ) -> Result<(), MigrationError> {
        self.update_tool(tool_name, updated_by, |tool| {
            tool.force_provider_native = true;
            tool.force_service_backed = false;
        })?;
        self.log_change("force_provider_native", tool_name, updated_by, Value::Null);
        Ok(())
    }

    /// Forces every call to the service-backed arm.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::UnknownTool`] when the tool is unknown.
    pub fn force_service_backed(
        &self,
        tool_name: &str,
        updated_by: &str,
    ) -> Result<(), MigrationError> {
        self.update_tool(tool_name, updated_by, |tool| {
            tool.force_service_backed = true;
            tool.force_provider_native = false;
        })?;
        self.log_change("force_service_backed", tool_name, updated_by, Value::Null);
        Ok(())
    }

    /// Clears both force flags, restoring percentage routing.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::UnknownTool`] when the tool is unknown.
    pub fn clear_force_flags(
        &self,
        tool_name: &str,
        updated_by: &str,
    ) -> Result<(), MigrationError> {
        self.update_tool(tool_name, updated_by, |tool| {
            tool.force_provider_native = false;
            tool.force_service_backed = false;
        })?;
        self.log_change("clear_force_flags", tool_name, updated_by, Value::Null);
        Ok(())
    }

    /// Enables migration consideration for a tool.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::UnknownTool`] when the tool is unknown.
    pub fn enable_tool_migration(
        &self,
        tool_name: &str,
        updated_by: &str,
    ) -> Result<(), MigrationError> {
        self.update_tool(tool_name, updated_by, |tool| {
            tool.migration_enabled = true;
        })
    }

    /// Disables migration consideration for a tool.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::UnknownTool`] when the tool is unknown.
    pub fn disable_tool_migration(
        &self,
        tool_name: &str,
        updated_by: &str,
    ) -> Result<(), MigrationError> {
        self.update_tool(tool_name, updated_by, |tool| {
            tool.migration_enabled = false;
        })
    }

    /// Engages the global kill-switch.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::LockPoisoned`] when router state is
    /// unavailable.
    pub fn enable_global_rollback(&self, updated_by: &str) -> Result<(), MigrationError> {
        self.update_global(updated_by, |global| {
            global.rollback_mode = true;
        })?;
        self.log_change("enable_global_rollback", "*", updated_by, Value::Null);
        Ok(())
    }

    /// Releases the global kill-switch; per-tool state is untouched.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::LockPoisoned`] when router state is
    /// unavailable.
    pub fn disable_global_rollback(&self, updated_by: &str) -> Result<(), MigrationError> {
        self.update_global(updated_by, |global| {
            global.rollback_mode = false;
        })?;
        self.log_change("disable_global_rollback", "*", updated_by, Value::Null);
        Ok(())
    }

    /// Sets the maintenance freeze.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::LockPoisoned`] when router state is
    /// unavailable.
    pub fn set_maintenance_mode(
        &self,
        enabled: bool,
        updated_by: &str,
    ) -> Result<(), MigrationError> {
        self.update_global(updated_by, |global| {
            global.maintenance_mode = enabled;
        })
    }

    /// Records one execution outcome against the decision snapshot.
    pub fn record_execution(&self, decision: &RouteDecision, success: bool, latency_ms: u64) {
        let Ok(mut metrics) = self.metrics.lock() else {
            return;
        };
        let tool = metrics.entry(decision.tool.clone()).or_default();
        match decision.arm {
            BackendArm::ProviderNative => tool.provider_native.record(success, latency_ms),
            BackendArm::ServiceBacked => tool.service_backed.record(success, latency_ms),
        }
    }

    /// Clears every execution counter and latency buffer.
    pub fn reset_metrics(&self) {
        if let Ok(mut metrics) = self.metrics.lock() {
            metrics.clear();
        }
    }

    /// Returns a deep snapshot of settings, global config, and metrics.
    #[must_use]
    pub fn migration_status(&self) -> MigrationStatus {
        let settings =
            self.settings.read().map_or_else(|_| BTreeMap::new(), |settings| settings.clone());
        let global = self
            .global
            .read()
            .map_or_else(|_| GlobalMigrationConfig::default(), |global| global.clone());
        let metrics =
            self.metrics.lock().map_or_else(|_| BTreeMap::new(), |metrics| metrics.clone());
        MigrationStatus {
            settings,
            global,
            metrics,
        }
    }

    /// Applies a mutation to one tool's settings under the write lock.
    fn update_tool(
        &self,
        tool_name: &str,
        updated_by: &str,
        mutate: impl FnOnce(&mut ToolMigrationSettings),
    ) -> Result<(), MigrationError> {
        let mut settings = self.settings.write().map_err(|_| MigrationError::LockPoisoned)?;
        let Some(tool) = settings.get_mut(tool_name) else {
            return Err(MigrationError::UnknownTool(tool_name.to_string()));
        };
        mutate(tool);
        tool.last_updated_ms = epoch_millis();
        tool.updated_by = updated_by.to_string();
        Ok(())
    }

    /// Applies a mutation to the global config under the write lock.
    fn update_global(
        &self,
        updated_by: &str,
        mutate: impl FnOnce(&mut GlobalMigrationConfig),
    ) -> Result<(), MigrationError> {
        let mut global = self.global.write().map_err(|_| MigrationError::LockPoisoned)?;
        mutate(&mut global);
        global.last_updated_ms = epoch_millis();
        global.updated_by = updated_by.to_string();
        Ok(())
    }

    /// Emits one routing-change record.
    fn log_change(&self, action: &str, tool: &str, updated_by: &str, detail: Value) {
        let record = LogRecord::new(LogLevel::Warn, "migration_change")
            .field("action", json!(action))
            .field("tool", json!(tool))
            .field("updated_by", json!(updated_by))
            .field("detail", detail);
        self.sink.record(&record);
    }
}

// ============================================================================
// SECTION: Migrated Tool
// ============================================================================

/// Dispatcher joining the two arms of a migrated tool behind one name.
///
/// # Invariants
/// - Both arms expose the same name and schema; the provider-native arm is
///   authoritative for the definition.
pub struct MigratedTool {
    /// Legacy service-backed arm.
    service_backed: Arc<dyn Tool>,
    /// Provider-native arm.
    provider_native: Arc<dyn Tool>,
    /// Router consulted per invocation.
    router: Arc<MigrationRouter>,
}

impl MigratedTool {
    /// Builds the dispatcher for one tool name.
    #[must_use]
    pub fn new(
        service_backed: Arc<dyn Tool>,
        provider_native: Arc<dyn Tool>,
        router: Arc<MigrationRouter>,
    ) -> Self {
        Self {
            service_backed,
            provider_native,
            router,
        }
    }
}

impl Tool for MigratedTool {
    fn name(&self) -> &str {
        self.provider_native.name()
    }

    fn description(&self) -> &str {
        self.provider_native.description()
    }

    fn input_schema(&self) -> Value {
        self.provider_native.input_schema()
    }

    fn validate(&self, params: &Value) -> Result<(), ToolError> {
        self.provider_native.validate(params)
    }

    fn execute(&self, ctx: &ExecutionContext, params: &Value) -> ToolResult {
        let decision = self.router.decide(self.name());
        let arm = match decision.arm {
            BackendArm::ProviderNative => &self.provider_native,
            BackendArm::ServiceBacked => &self.service_backed,
        };
        let started = Instant::now();
        let result = arm.execute(ctx, params);
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.router.record_execution(&decision, result.is_ok(), latency_ms);
        result
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
