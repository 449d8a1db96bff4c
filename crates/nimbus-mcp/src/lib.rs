// crates/nimbus-mcp/src/lib.rs
// ============================================================================
// Module: Nimbus MCP Library
// Description: MCP server surface over the Nimbus tool pipeline.
// Purpose: Expose the server, pipeline front, and bootstrap wiring.
// Dependencies: nimbus-core, nimbus-config, nimbus-providers
// ============================================================================

//! ## Overview
//! Nimbus MCP exposes the tool-execution pipeline through JSON-RPC 2.0 over
//! stdio and HTTP, assembles the production middleware chain from
//! configuration, and serves the optional Prometheus metrics listener.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod bootstrap;
pub mod front;
pub mod metrics_http;
pub mod server;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use bootstrap::Bootstrap;
pub use bootstrap::build;
pub use bootstrap::build_with_providers;
pub use front::PipelineFront;
pub use front::ToolCallEnvelope;
pub use front::ToolContent;
pub use metrics_http::serve_metrics;
pub use server::McpServer;
pub use server::McpServerError;
pub use server::PROTOCOL_VERSION;
pub use server::ServerSettings;
