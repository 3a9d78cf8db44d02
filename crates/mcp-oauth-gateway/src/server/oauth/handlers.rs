//! OAuth 2.1 endpoint handlers.
//!
//! Implements:
//! - RFC 9728: OAuth Protected Resource Metadata
//! - RFC 8414: OAuth Authorization Server Metadata
//! - RFC 7591: Dynamic Client Registration
//! - RFC 6749 / RFC 7636: Authorization Code Grant with PKCE
//! - RFC 7662: Token Introspection
//! - RFC 7009: Token Revocation
//!
//! Handlers only translate HTTP into the typed requests of [`super::types`]
//! and back; all decisions are made by [`super::AuthorizationServer`].

use std::sync::Arc;

use axum::{
    Form, Json,
    extract::{FromRequest, Query, Request, State, rejection::JsonRejection, rejection::QueryRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;

use super::types::{AuthorizationRequest, ClientMetadata, TokenParam, TokenRequest};
use crate::error::{OAuthError, OAuthResult};
use crate::server::gateway::GatewayState;

// ─── Body extraction ─────────────────────────────────────────────────────────

/// Request body accepted as either `application/json` or
/// `application/x-www-form-urlencoded`.
///
/// Rejections become `invalid_request` so clients always see an OAuth error
/// body.
#[derive(Debug, Clone)]
pub struct OAuthBody<T>(pub T);

impl<S, T> FromRequest<S> for OAuthBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = OAuthError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if is_json(req.headers()) {
            let Json(value) = Json::<T>::from_request(req, state)
                .await
                .map_err(|e| OAuthError::invalid_request(e.body_text()))?;
            Ok(Self(value))
        } else {
            let Form(value) = Form::<T>::from_request(req, state)
                .await
                .map_err(|e| OAuthError::invalid_request(e.body_text()))?;
            Ok(Self(value))
        }
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.trim_start().to_ascii_lowercase().starts_with("application/json"))
}

fn accepts_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.to_ascii_lowercase().contains("application/json"))
}

// ─── RFC 9728 / RFC 8414: Metadata ───────────────────────────────────────────

/// `GET /.well-known/oauth-protected-resource[/{*suffix}]`
pub async fn handle_protected_resource(State(state): State<Arc<GatewayState>>) -> Response {
    json_bytes(state.metadata.protected_resource.clone())
}

/// `GET /.well-known/oauth-authorization-server[/{*suffix}]`
pub async fn handle_auth_server_metadata(State(state): State<Arc<GatewayState>>) -> Response {
    json_bytes(state.metadata.authorization_server.clone())
}

fn json_bytes(body: Vec<u8>) -> Response {
    ([(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))], body).into_response()
}

// ─── RFC 7591: Dynamic Client Registration ───────────────────────────────────

/// `POST /register`
pub async fn handle_register(
    State(state): State<Arc<GatewayState>>,
    body: Result<Json<ClientMetadata>, JsonRejection>,
) -> OAuthResult<Response> {
    let Json(metadata) = body.map_err(|e| OAuthError::invalid_request(e.body_text()))?;
    let client = state.auth.register_client(metadata).await?;
    Ok((StatusCode::OK, Json(client)).into_response())
}

// ─── Authorization Endpoint ──────────────────────────────────────────────────

/// `GET /authorize`
///
/// Auto-approves. Answers `302 Found` with the redirect in `Location`, or
/// `200 {"redirect_url": ...}` when the caller accepts JSON.
pub async fn handle_authorize(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    query: Result<Query<AuthorizationRequest>, QueryRejection>,
) -> OAuthResult<Response> {
    let Query(request) = query.map_err(|e| OAuthError::invalid_request(e.body_text()))?;
    let redirect = state.auth.authorize(request).await?;

    if accepts_json(&headers) {
        return Ok(Json(serde_json::json!({ "redirect_url": redirect.redirect_url })).into_response());
    }

    let location = HeaderValue::from_str(&redirect.redirect_url)
        .map_err(|_| OAuthError::InvalidRedirectUri("redirect URL is not a valid header value".into()))?;
    Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
}

// ─── Token Endpoint ──────────────────────────────────────────────────────────

/// `POST /token`
pub async fn handle_token(
    State(state): State<Arc<GatewayState>>,
    OAuthBody(request): OAuthBody<TokenRequest>,
) -> OAuthResult<Response> {
    let token = state.auth.exchange_code(request).await?;

    // RFC 6749 §5.1
    let mut response = Json(token).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    Ok(response)
}

// ─── RFC 7662 / RFC 7009 ─────────────────────────────────────────────────────

/// `POST /introspect`
pub async fn handle_introspect(
    State(state): State<Arc<GatewayState>>,
    OAuthBody(param): OAuthBody<TokenParam>,
) -> OAuthResult<Response> {
    let token = require_token(param)?;
    Ok(Json(state.auth.introspect(&token).await).into_response())
}

/// `POST /revoke`
///
/// Always acknowledges, whether or not the token existed.
pub async fn handle_revoke(
    State(state): State<Arc<GatewayState>>,
    OAuthBody(param): OAuthBody<TokenParam>,
) -> OAuthResult<Response> {
    let token = require_token(param)?;
    state.auth.revoke(&token).await;
    Ok(Json(serde_json::json!({ "revoked": true })).into_response())
}

fn require_token(param: TokenParam) -> OAuthResult<String> {
    param.token.ok_or_else(|| OAuthError::invalid_request("token is required"))
}
