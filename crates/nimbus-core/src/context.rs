// crates/nimbus-core/src/context.rs
// ============================================================================
// Module: Execution Context
// Description: Per-invocation metadata and cancellation plumbing.
// Purpose: Carry request identity, scope, and deadlines through the chain.
// Dependencies: rand
// ============================================================================

//! ## Overview
//! An [`ExecutionContext`] is created at invocation entry, threaded through
//! every middleware layer by reference, and discarded at completion. Request
//! identifiers are unique per invocation: a boot-scoped random seed plus a
//! monotonic counter, so identifiers never collide within a process lifetime.
//!
//! Cancellation is cooperative. Waiting operations (retry backoff, rate-limit
//! probes) park on the context's [`CancelToken`] and wake within bounded time
//! when the token fires.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use rand::RngCore;
use rand::rngs::OsRng;
use serde_json::Value;

// ============================================================================
// SECTION: Request Identifiers
// ============================================================================

/// Boot-scoped request identifier generator.
///
/// # Invariants
/// - Issued identifiers are unique within the process lifetime.
#[derive(Debug)]
pub struct RequestIdGenerator {
    /// Prefix included in every generated identifier.
    prefix: &'static str,
    /// Boot-scoped random identifier for entropy.
    boot_id: u64,
    /// Monotonic counter for identifiers issued in this process.
    counter: AtomicU64,
}

impl RequestIdGenerator {
    /// Creates a new generator with the given prefix.
    #[must_use]
    pub fn new(prefix: &'static str) -> Self {
        let mut bytes = [0u8; 8];
        OsRng.fill_bytes(&mut bytes);
        Self {
            prefix,
            boot_id: u64::from_be_bytes(bytes),
            counter: AtomicU64::new(1),
        }
    }

    /// Issues a new request identifier.
    #[must_use]
    pub fn issue(&self) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{:016x}-{:08x}", self.prefix, self.boot_id, seq)
    }
}

impl Default for RequestIdGenerator {
    fn default() -> Self {
        Self::new("req")
    }
}

// ============================================================================
// SECTION: Cancellation
// ============================================================================

/// Shared cancellation state behind a [`CancelToken`].
#[derive(Debug, Default)]
struct CancelInner {
    /// Whether the token has fired.
    cancelled: Mutex<bool>,
    /// Wakes parked waiters when the token fires.
    condvar: Condvar,
}

/// Cooperative cancellation token carried by the execution context.
///
/// # Invariants
/// - Once fired, the token never resets.
/// - Parked waiters wake within their requested timeout.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    /// Shared flag and wake channel.
    inner: Arc<CancelInner>,
}

impl CancelToken {
    /// Creates a fresh, unfired token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the token, waking all parked waiters.
    pub fn cancel(&self) {
        if let Ok(mut cancelled) = self.inner.cancelled.lock() {
            *cancelled = true;
        }
        self.inner.condvar.notify_all();
    }

    /// Returns true when the token has fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.lock().map(|cancelled| *cancelled).unwrap_or(true)
    }

    /// Parks the caller for up to `timeout`.
    ///
    /// Returns true when the token fired before or during the wait, so the
    /// caller can abandon its pending work promptly.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        // Absurd timeouts clamp to a day rather than overflowing the clock.
        let deadline = Instant::now()
            .checked_add(timeout)
            .unwrap_or_else(|| Instant::now() + Duration::from_secs(86_400));
        let Ok(mut cancelled) = self.inner.cancelled.lock() else {
            return true;
        };
        loop {
            if *cancelled {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let Ok((guard, _timed_out)) =
                self.inner.condvar.wait_timeout(cancelled, deadline - now)
            else {
                return true;
            };
            cancelled = guard;
        }
    }
}

// ============================================================================
// SECTION: Execution Context
// ============================================================================

/// Per-invocation execution metadata.
///
/// # Invariants
/// - `request_id` is unique per invocation.
/// - Fixed fields are immutable once the context is installed; mutation goes
///   through the guarded metadata map.
#[derive(Debug)]
pub struct ExecutionContext {
    /// Unique identifier for this invocation.
    request_id: String,
    /// Tool being invoked.
    tool_name: String,
    /// Rate-limit and breaker scope identifier.
    scope: String,
    /// Caller identity when available.
    user_id: Option<String>,
    /// Provider that owns the tool when known.
    provider: Option<String>,
    /// Monotonic start instant for duration measurement.
    start_time: Instant,
    /// Wall-clock start in milliseconds since the epoch.
    started_at_ms: u128,
    /// User-defined metadata shared across layers.
    metadata: Mutex<BTreeMap<String, Value>>,
    /// Cooperative cancellation token.
    cancel: CancelToken,
}

impl ExecutionContext {
    /// Builds a context for a tool invocation.
    #[must_use]
    pub fn new(request_id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        let tool_name = tool_name.into();
        Self {
            request_id: request_id.into(),
            scope: tool_name.clone(),
            tool_name,
            user_id: None,
            provider: None,
            start_time: Instant::now(),
            started_at_ms: epoch_millis(),
            metadata: Mutex::new(BTreeMap::new()),
            cancel: CancelToken::new(),
        }
    }

    /// Returns a copy with the caller identity set.
    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Returns a copy with the provider set.
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Returns a copy with an explicit scope identifier.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Returns a copy with an externally supplied cancellation token.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns the unique request identifier.
    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Returns the tool name under invocation.
    #[must_use]
    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    /// Returns the breaker/limiter scope identifier.
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Returns the caller identity when available.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Returns the provider that owns the tool when known.
    #[must_use]
    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    /// Returns the wall-clock start in milliseconds since the epoch.
    #[must_use]
    pub const fn started_at_ms(&self) -> u128 {
        self.started_at_ms
    }

    /// Returns the elapsed time since invocation entry.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Returns the cancellation token for this invocation.
    #[must_use]
    pub const fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Stores a metadata value under the given key.
    pub fn set_metadata(&self, key: impl Into<String>, value: Value) {
        if let Ok(mut metadata) = self.metadata.lock() {
            metadata.insert(key.into(), value);
        }
    }

    /// Returns a copy of the metadata value under the given key.
    #[must_use]
    pub fn metadata(&self, key: &str) -> Option<Value> {
        self.metadata.lock().ok().and_then(|metadata| metadata.get(key).cloned())
    }
}

/// Returns the current wall clock in milliseconds since the Unix epoch.
#[must_use]
pub fn epoch_millis() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

// ============================================================================
// SECTION: Tests
// ============================================================================
