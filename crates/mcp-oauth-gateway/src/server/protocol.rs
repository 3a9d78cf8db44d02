//! Default protocol handler mounted by the binary.
//!
//! A minimal JSON-RPC 2.0 MCP endpoint: enough for a client to complete the
//! `initialize` handshake through the gateway. Library users mount their own
//! [`Router`] instead.

use std::borrow::Cow;
use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use serde::{Deserialize, Serialize};

use crate::server::oauth::AccessTokenClaims;

/// JSON-RPC 2.0 request.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub id: Option<serde_json::Value>,
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: Cow<'static, str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Option<serde_json::Value>,
}

/// JSON-RPC 2.0 error.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

impl JsonRpcResponse {
    const VERSION: &'static str = "2.0";

    #[must_use]
    pub fn success(id: Option<serde_json::Value>, result: serde_json::Value) -> Self {
        Self { jsonrpc: Cow::Borrowed(Self::VERSION), result: Some(result), error: None, id }
    }

    #[must_use]
    pub fn error(id: Option<serde_json::Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(Self::VERSION),
            result: None,
            error: Some(JsonRpcError { code, message: message.into() }),
            id,
        }
    }
}

/// JSON-RPC error codes.
pub mod codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const METHOD_NOT_FOUND: i32 = -32601;
}

struct ProtocolState {
    server_name: String,
}

/// Build the protocol router. Its root route is the MCP endpoint.
pub fn router<S>(server_name: &str) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let state = Arc::new(ProtocolState { server_name: server_name.to_string() });
    Router::new().route("/", post(handle_rpc)).with_state(state)
}

async fn handle_rpc(
    State(state): State<Arc<ProtocolState>>,
    claims: Option<Extension<AccessTokenClaims>>,
    body: Result<Json<JsonRpcRequest>, JsonRejection>,
) -> Response {
    let req = match body {
        Ok(Json(req)) => req,
        Err(e) => {
            return Json(JsonRpcResponse::error(None, codes::PARSE_ERROR, e.body_text())).into_response();
        }
    };

    tracing::debug!(
        method = %req.method,
        client_id = claims.as_ref().map(|Extension(c)| c.client_id.as_str()),
        "Handling MCP request"
    );

    // Notifications (no id) get no body.
    if req.id.is_none() {
        return StatusCode::ACCEPTED.into_response();
    }

    let response = match req.method.as_str() {
        "initialize" => JsonRpcResponse::success(req.id, initialize_result(&req.params, &state.server_name)),
        "ping" => JsonRpcResponse::success(req.id, serde_json::json!({})),
        "tools/list" => JsonRpcResponse::success(req.id, serde_json::json!({ "tools": [] })),
        _ => JsonRpcResponse::error(
            req.id,
            codes::METHOD_NOT_FOUND,
            format!("Method not found: {}", req.method),
        ),
    };

    Json(response).into_response()
}

fn initialize_result(params: &serde_json::Value, server_name: &str) -> serde_json::Value {
    let protocol_version =
        params.get("protocolVersion").and_then(|v| v.as_str()).unwrap_or("2024-11-05");

    tracing::info!("MCP initialize: protocol version {}", protocol_version);

    serde_json::json!({
        "protocolVersion": protocol_version,
        "capabilities": {
            "tools": {
                "listChanged": false
            }
        },
        "serverInfo": {
            "name": server_name,
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}
