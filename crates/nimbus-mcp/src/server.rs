// crates/nimbus-mcp/src/server.rs
// ============================================================================
// Module: MCP Server
// Description: JSON-RPC 2.0 server over stdio and HTTP transports.
// Purpose: Expose the Nimbus tool pipeline via the Model Context Protocol.
// Dependencies: nimbus-core, axum, tokio
// ============================================================================

//! ## Overview
//! The server speaks JSON-RPC 2.0 with the `initialize`, `tools/list`, and
//! `tools/call` methods. Stdio framing is one JSON object per line; the HTTP
//! transport serves the same dispatch on `/rpc`. Inputs are untrusted and
//! bounded by the configured body limit. Requests without an `id` are
//! notifications and receive no response.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::BufRead;
use std::io::BufReader;
use std::io::Read;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use nimbus_core::ErrorKind;
use nimbus_core::InvocationOptions;
use nimbus_core::ToolDefinition;
use nimbus_core::ToolError;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use crate::front::PipelineFront;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Protocol version literal agreed with MCP clients.
pub const PROTOCOL_VERSION: &str = "2024-11-05";
/// Server version advertised in the initialize response.
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// SECTION: Server
// ============================================================================

/// Transport settings for the MCP server.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Advertised server name.
    pub name: String,
    /// Maximum accepted request size in bytes.
    pub max_body_bytes: usize,
    /// Bind address for the HTTP transport.
    pub bind: Option<String>,
}

/// MCP server instance.
pub struct McpServer {
    /// Transport settings.
    settings: ServerSettings,
    /// Pipeline front for request dispatch.
    front: PipelineFront,
}

impl McpServer {
    /// Builds a server over the given front.
    #[must_use]
    pub fn new(settings: ServerSettings, front: PipelineFront) -> Self {
        Self {
            settings,
            front,
        }
    }

    /// Serves newline-framed JSON-RPC over stdin/stdout until EOF.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError`] on transport failures; a closed stdin is a
    /// normal shutdown.
    pub fn serve_stdio(&self) -> Result<(), McpServerError> {
        let reader = BufReader::new(std::io::stdin());
        let mut writer = std::io::stdout();
        self.serve_lines(reader, &mut writer)
    }

    /// Serves newline-framed JSON-RPC over arbitrary byte streams.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError`] on read or write failures.
    pub fn serve_lines(
        &self,
        reader: BufReader<impl Read>,
        writer: &mut impl Write,
    ) -> Result<(), McpServerError> {
        for line in reader.lines() {
            let line =
                line.map_err(|_| McpServerError::Transport("stdio read failed".to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            if let Some(response) = self.handle_line(&line) {
                let payload = serde_json::to_string(&response).map_err(|_| {
                    McpServerError::Transport("json-rpc serialization failed".to_string())
                })?;
                writeln!(writer, "{payload}")
                    .map_err(|_| McpServerError::Transport("stdio write failed".to_string()))?;
                writer
                    .flush()
                    .map_err(|_| McpServerError::Transport("stdio write failed".to_string()))?;
            }
        }
        Ok(())
    }

    /// Returns the pipeline front serving this instance.
    #[must_use]
    pub const fn front(&self) -> &PipelineFront {
        &self.front
    }

    /// Serves JSON-RPC over HTTP.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError`] on bind or serve failures.
    pub async fn serve_http(self: Arc<Self>) -> Result<(), McpServerError> {
        let bind = self
            .settings
            .bind
            .clone()
            .ok_or_else(|| McpServerError::Config("bind address required".to_string()))?;
        let addr: SocketAddr =
            bind.parse().map_err(|_| McpServerError::Config("invalid bind address".to_string()))?;
        let app = Router::new().route("/rpc", post(handle_http)).with_state(self);
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|_| McpServerError::Transport("http bind failed".to_string()))?;
        axum::serve(listener, app)
            .await
            .map_err(|_| McpServerError::Transport("http server failed".to_string()))
    }

    /// Parses one framed line and dispatches it.
    ///
    /// Returns `None` for notifications and oversized or malformed
    /// notifications-by-default input that carries no `id`.
    #[must_use]
    pub fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        if line.len() > self.settings.max_body_bytes {
            return Some(error_response(Value::Null, -32600, "request body too large"));
        }
        let Ok(request) = serde_json::from_str::<JsonRpcRequest>(line) else {
            return Some(error_response(Value::Null, -32700, "parse error"));
        };
        self.handle_request(request)
    }

    /// Dispatches one JSON-RPC request.
    ///
    /// Returns `None` for notifications (requests without an `id`).
    #[must_use]
    pub fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let id = request.id?;
        if request.jsonrpc != "2.0" {
            return Some(error_response(id, -32600, "invalid json-rpc version"));
        }
        let response = match request.method.as_str() {
            "initialize" => success_response(id, self.initialize_result()),
            "tools/list" => {
                let tools: Vec<ToolDefinition> = self.front.list_tools();
                success_response(id, json!({"tools": tools}))
            }
            "tools/call" => {
                let params = request.params.unwrap_or(Value::Null);
                match serde_json::from_value::<ToolCallParams>(params) {
                    Ok(call) => self.dispatch_call(id, &call),
                    Err(_) => error_response(id, -32602, "invalid tool params"),
                }
            }
            _ => error_response(id, -32601, "method not found"),
        };
        Some(response)
    }

    /// Executes one tool call and wraps the envelope.
    fn dispatch_call(&self, id: Value, call: &ToolCallParams) -> JsonRpcResponse {
        let arguments = call.arguments.clone().unwrap_or_else(|| json!({}));
        match self.front.call_tool(&call.name, &arguments, InvocationOptions::default()) {
            Ok(envelope) => match serde_json::to_value(&envelope) {
                Ok(value) => success_response(id, value),
                Err(_) => error_response(id, -32603, "serialization failed"),
            },
            Err(err) if err.kind() == ErrorKind::ToolNotFound => {
                error_response(id, -32601, &err.to_string())
            }
            Err(err) => error_response(id, -32603, &err.to_string()),
        }
    }

    /// Builds the initialize result payload.
    fn initialize_result(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {"tools": {}},
            "serverInfo": {
                "name": self.settings.name,
                "version": SERVER_VERSION,
            },
        })
    }
}

/// Handles HTTP JSON-RPC requests.
async fn handle_http(
    State(server): State<Arc<McpServer>>,
    bytes: Bytes,
) -> impl IntoResponse {
    if bytes.len() > server.settings.max_body_bytes {
        let response = error_response(Value::Null, -32600, "request body too large");
        return (StatusCode::PAYLOAD_TOO_LARGE, axum::Json(response));
    }
    let line = String::from_utf8_lossy(bytes.as_ref());
    let response = server
        .handle_line(&line)
        .unwrap_or_else(|| error_response(Value::Null, -32600, "notifications are not answered"));
    (StatusCode::OK, axum::Json(response))
}

// ============================================================================
// SECTION: JSON-RPC Payloads
// ============================================================================

/// Incoming JSON-RPC request payload.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC protocol version.
    pub jsonrpc: String,
    /// Request identifier; absent for notifications.
    #[serde(default)]
    pub id: Option<Value>,
    /// Method name.
    pub method: String,
    /// Optional parameters payload.
    #[serde(default)]
    pub params: Option<Value>,
}

/// JSON-RPC response envelope.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC protocol version.
    pub jsonrpc: &'static str,
    /// Request identifier.
    pub id: Value,
    /// Successful result payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload when the request fails.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC error payload.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    /// Error code.
    pub code: i64,
    /// Human-readable error message.
    pub message: String,
}

/// Tool call parameters for JSON-RPC requests.
#[derive(Debug, Deserialize)]
struct ToolCallParams {
    /// Tool name.
    name: String,
    /// Raw JSON arguments.
    #[serde(default)]
    arguments: Option<Value>,
}

/// Builds a success response.
fn success_response(id: Value, result: Value) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0",
        id,
        result: Some(result),
        error: None,
    }
}

/// Builds an error response.
fn error_response(id: Value, code: i64, message: &str) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0",
        id,
        result: None,
        error: Some(JsonRpcError {
            code,
            message: message.to_string(),
        }),
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// MCP server errors.
#[derive(Debug, thiserror::Error)]
pub enum McpServerError {
    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
    /// Initialization errors.
    #[error("init error: {0}")]
    Init(String),
    /// Transport errors.
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<ToolError> for McpServerError {
    fn from(err: ToolError) -> Self {
        Self::Init(err.to_string())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
