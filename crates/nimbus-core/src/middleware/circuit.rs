// crates/nimbus-core/src/middleware/circuit.rs
// ============================================================================
// Module: Circuit Breaker
// Description: Per-scope failure tracking with open/half-open/closed states.
// Purpose: Short-circuit calls into scopes that keep failing.
// Dependencies: nimbus-core::{chain, context, error}
// ============================================================================

//! ## Overview
//! One [`CircuitState`] per breaker scope. Closed circuits count consecutive
//! failures and trip open at the threshold; open circuits reject until the
//! recovery timeout elapses, then admit probes in half-open; enough probe
//! successes close the circuit again, and any probe failure reopens it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use serde_json::Value;

use crate::chain::Middleware;
use crate::chain::Next;
use crate::chain::PRIORITY_CIRCUIT;
use crate::context::ExecutionContext;
use crate::error::ToolError;
use crate::tool::Tool;
use crate::tool::ToolResult;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Circuit breaker tuning parameters.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip a closed circuit.
    pub failure_threshold: u32,
    /// Time an open circuit waits before admitting a probe.
    pub recovery_timeout: Duration,
    /// Probe successes required to close a half-open circuit.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 3,
        }
    }
}

// ============================================================================
// SECTION: Circuit State
// ============================================================================

/// Breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests flow; failures are counted.
    Closed,
    /// Requests are rejected until the recovery timeout elapses.
    Open,
    /// Probe requests are admitted; successes close the circuit.
    HalfOpen,
}

/// Per-scope breaker bookkeeping.
#[derive(Debug, Clone, Copy)]
struct ScopeState {
    /// Current state of the circuit.
    state: CircuitState,
    /// Consecutive failures observed in the closed state.
    failure_count: u32,
    /// Probe successes observed in the half-open state.
    success_count: u32,
    /// Instant of the most recent failure.
    last_failure: Option<Instant>,
}

impl ScopeState {
    /// Returns a fresh closed circuit.
    const fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure: None,
        }
    }
}

// ============================================================================
// SECTION: Circuit Breaker
// ============================================================================

/// Failure tracker holding one circuit per scope.
pub struct CircuitBreaker {
    /// Tuning parameters shared by every scope.
    config: CircuitBreakerConfig,
    /// Per-scope circuit states.
    scopes: Mutex<BTreeMap<String, ScopeState>>,
}

impl CircuitBreaker {
    /// Creates a breaker with the given configuration.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            scopes: Mutex::new(BTreeMap::new()),
        }
    }

    /// Admits or rejects a request for `scope`.
    ///
    /// Open circuits transition to half-open once the recovery timeout has
    /// elapsed since the last failure; the transitioning request is admitted
    /// as the probe.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::CircuitOpen`] while the circuit is open.
    pub fn check(&self, scope: &str) -> Result<(), ToolError> {
        let mut scopes = self
            .scopes
            .lock()
            .map_err(|_| ToolError::Internal("breaker lock poisoned".to_string()))?;
        let circuit = scopes.entry(scope.to_string()).or_insert_with(ScopeState::closed);
        match circuit.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let elapsed = circuit
                    .last_failure
                    .map_or(Duration::MAX, |instant| instant.elapsed());
                if elapsed >= self.config.recovery_timeout {
                    circuit.state = CircuitState::HalfOpen;
                    circuit.success_count = 0;
                    return Ok(());
                }
                Err(ToolError::CircuitOpen {
                    scope: scope.to_string(),
                })
            }
        }
    }

    /// Records a successful call for `scope`.
    pub fn record_success(&self, scope: &str) {
        let Ok(mut scopes) = self.scopes.lock() else {
            return;
        };
        let circuit = scopes.entry(scope.to_string()).or_insert_with(ScopeState::closed);
        match circuit.state {
            CircuitState::Closed => {
                circuit.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                circuit.success_count += 1;
                if circuit.success_count >= self.config.success_threshold {
                    *circuit = ScopeState::closed();
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Records a failed call for `scope`.
    pub fn record_failure(&self, scope: &str) {
        let Ok(mut scopes) = self.scopes.lock() else {
            return;
        };
        let circuit = scopes.entry(scope.to_string()).or_insert_with(ScopeState::closed);
        circuit.last_failure = Some(Instant::now());
        match circuit.state {
            CircuitState::Closed => {
                circuit.failure_count += 1;
                if circuit.failure_count >= self.config.failure_threshold {
                    circuit.state = CircuitState::Open;
                }
            }
            CircuitState::HalfOpen => {
                circuit.state = CircuitState::Open;
                circuit.success_count = 0;
            }
            CircuitState::Open => {}
        }
    }

    /// Returns the current state for `scope`, defaulting to closed.
    #[must_use]
    pub fn state(&self, scope: &str) -> CircuitState {
        self.scopes
            .lock()
            .ok()
            .and_then(|scopes| scopes.get(scope).map(|circuit| circuit.state))
            .unwrap_or(CircuitState::Closed)
    }
}

// ============================================================================
// SECTION: Middleware
// ============================================================================

/// Chain layer that guards the continuation with a circuit breaker.
pub struct CircuitBreakerMiddleware {
    /// Shared breaker state.
    breaker: CircuitBreaker,
}

impl CircuitBreakerMiddleware {
    /// Creates the layer with the given breaker configuration.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            breaker: CircuitBreaker::new(config),
        }
    }

    /// Returns the underlying breaker for inspection.
    #[must_use]
    pub const fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

impl Middleware for CircuitBreakerMiddleware {
    fn name(&self) -> &str {
        "circuit_breaker"
    }

    fn priority(&self) -> i32 {
        PRIORITY_CIRCUIT
    }

    fn execute(
        &self,
        ctx: &ExecutionContext,
        tool: &dyn Tool,
        params: &Value,
        next: Next<'_>,
    ) -> ToolResult {
        self.breaker.check(ctx.scope())?;
        let result = next(ctx, tool, params);
        match &result {
            Ok(_) => self.breaker.record_success(ctx.scope()),
            // Cancellation says nothing about scope health.
            Err(ToolError::Cancelled(_)) => {}
            Err(_) => self.breaker.record_failure(ctx.scope()),
        }
        result
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
