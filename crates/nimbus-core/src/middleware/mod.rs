// crates/nimbus-core/src/middleware/mod.rs
// ============================================================================
// Module: Middleware Layers
// Description: Concrete cross-cutting layers for the execution chain.
// Purpose: Group the built-in middleware implementations.
// Dependencies: nimbus-core::chain
// ============================================================================

//! ## Overview
//! Built-in [`crate::chain::Middleware`] implementations: panic recovery,
//! audit/request/structured logging, metrics, rate limiting (plain and
//! adaptive), circuit breaking, and retries with backoff.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod circuit;
pub mod logging;
pub mod metrics;
pub mod rate_limit;
pub mod recovery;
pub mod retry;
