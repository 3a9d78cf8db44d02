//! HTTP surface of the gateway.
//!
//! Composes the OAuth endpoints, the discovery documents, `/health`, and the
//! protocol handler mounted at the private path. Everything except the mount
//! is unauthenticated; the mount sits behind [`require_bearer`] unless bearer
//! enforcement is switched off.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Request, State},
    http::{HeaderValue, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::oauth::handlers::{
    handle_auth_server_metadata, handle_authorize, handle_introspect, handle_protected_resource,
    handle_register, handle_revoke, handle_token,
};
use super::oauth::{AuthorizationServer, MetadataDocuments};
use crate::config::Config;
use crate::error::OAuthError;

/// Discovery path of the protected resource document.
pub const PROTECTED_RESOURCE_PATH: &str = "/.well-known/oauth-protected-resource";

/// Discovery path of the authorization server document.
pub const AUTH_SERVER_METADATA_PATH: &str = "/.well-known/oauth-authorization-server";

/// Shared state for gateway handlers.
pub struct GatewayState {
    pub auth: Arc<AuthorizationServer>,
    pub metadata: MetadataDocuments,
    pub server_name: String,
    /// `WWW-Authenticate` value sent with every bearer rejection.
    pub bearer_challenge: HeaderValue,
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState").field("server_name", &self.server_name).finish()
    }
}

/// Build the gateway router with `protocol` mounted at the configured private
/// path.
///
/// # Errors
///
/// Returns error if the discovery documents cannot be serialized.
pub fn build_router(
    config: &Config,
    auth: Arc<AuthorizationServer>,
    protocol: Router,
) -> serde_json::Result<Router> {
    let challenge = format!(
        "Bearer error=\"invalid_token\", resource_metadata=\"{}\"",
        config.endpoint(PROTECTED_RESOURCE_PATH)
    );
    let state = Arc::new(GatewayState {
        auth,
        metadata: MetadataDocuments::from_config(config)?,
        server_name: config.server_name.clone(),
        bearer_challenge: HeaderValue::from_str(&challenge)
            .unwrap_or_else(|_| HeaderValue::from_static("Bearer")),
    });

    let protocol = if config.require_bearer {
        protocol.layer(middleware::from_fn_with_state(Arc::clone(&state), require_bearer))
    } else {
        tracing::warn!("Bearer enforcement disabled: the mount path is the only access control");
        protocol
    };

    let router = Router::new()
        .route(PROTECTED_RESOURCE_PATH, get(handle_protected_resource))
        .route(&format!("{PROTECTED_RESOURCE_PATH}/{{*suffix}}"), get(handle_protected_resource))
        .route(AUTH_SERVER_METADATA_PATH, get(handle_auth_server_metadata))
        .route(&format!("{AUTH_SERVER_METADATA_PATH}/{{*suffix}}"), get(handle_auth_server_metadata))
        .route("/register", post(handle_register))
        .route("/authorize", get(handle_authorize))
        .route("/token", post(handle_token))
        .route("/introspect", post(handle_introspect))
        .route("/revoke", post(handle_revoke))
        .route("/health", get(health_check))
        .with_state(state)
        .nest(&config.mount_route(), protocol)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    Ok(router)
}

async fn health_check(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "server": state.server_name,
        "oauth_enabled": true
    }))
}

/// Reject requests without a valid access token.
///
/// Runs the same validation as introspection. On success the token's claims
/// are added to the request extensions.
pub async fn require_bearer(
    State(state): State<Arc<GatewayState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(&req) else {
        tracing::warn!(path = %req.uri().path(), "Rejected request without bearer token");
        return unauthorized(&state, OAuthError::invalid_token("missing bearer token"));
    };

    match state.auth.validate_token(&token).await {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(e) => {
            tracing::warn!(reason = %e, "Rejected bearer token");
            unauthorized(&state, e)
        }
    }
}

fn bearer_token(req: &Request) -> Option<String> {
    let value = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}

fn unauthorized(state: &GatewayState, err: OAuthError) -> Response {
    let mut response = err.into_response();
    response.headers_mut().insert(header::WWW_AUTHENTICATE, state.bearer_challenge.clone());
    response
}
