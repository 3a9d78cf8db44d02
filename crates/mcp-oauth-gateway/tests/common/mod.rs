//! Shared helpers for HTTP-level tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use mcp_oauth_gateway::config::Config;
use mcp_oauth_gateway::server::gateway::build_router;
use mcp_oauth_gateway::server::oauth::pkce::s256_challenge;
use mcp_oauth_gateway::server::oauth::{AuthorizationServer, OAuthStores};
use mcp_oauth_gateway::server::protocol;

pub const BASE_URL: &str = "https://gateway.example";
pub const REDIRECT_URI: &str = "https://example.com/cb";
pub const CODE_VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";

pub struct TestApp {
    pub router: Router,
    pub auth: Arc<AuthorizationServer>,
    pub stores: OAuthStores,
    pub config: Config,
}

pub fn test_app() -> TestApp {
    test_app_with(Config::for_testing(BASE_URL))
}

pub fn test_app_with(config: Config) -> TestApp {
    let stores = OAuthStores::in_memory();
    let auth = Arc::new(AuthorizationServer::with_stores(&config, stores.clone()));
    let router = build_router(&config, Arc::clone(&auth), protocol::router(&config.server_name)).unwrap();
    TestApp { router, auth, stores, config }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

pub async fn send(app: &TestApp, request: Request<Body>) -> TestResponse {
    send_to(app.router.clone(), request).await
}

/// Send through an owned router, for use inside spawned tasks.
pub async fn send_to(router: Router, request: Request<Body>) -> TestResponse {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec();
    TestResponse { status, headers, body }
}

pub async fn get(app: &TestApp, uri: &str) -> TestResponse {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

pub async fn post_json(app: &TestApp, uri: &str, body: &serde_json::Value) -> TestResponse {
    send(app, json_request(uri, body)).await
}

pub async fn post_form(app: &TestApp, uri: &str, params: &[(&str, &str)]) -> TestResponse {
    send(app, form_request(uri, params)).await
}

fn json_request(uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::post(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn form_request(uri: &str, params: &[(&str, &str)]) -> Request<Body> {
    Request::post(uri)
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body(Body::from(serde_urlencoded::to_string(params).unwrap()))
        .unwrap()
}

/// `/register` request for a client redirecting to [`REDIRECT_URI`].
pub fn register_request() -> Request<Body> {
    json_request("/register", &json!({ "client_name": "Test Client", "redirect_uris": [REDIRECT_URI] }))
}

/// Register a client for [`REDIRECT_URI`] and return its id.
pub async fn register(app: &TestApp) -> String {
    let response = send(app, register_request()).await;
    assert_eq!(response.status, StatusCode::OK);
    response.json()["client_id"].as_str().unwrap().to_string()
}

/// `/authorize` query string for an S256 request.
pub fn authorize_uri(client_id: &str, state: &str) -> String {
    let challenge = s256_challenge(CODE_VERIFIER);
    let query = serde_urlencoded::to_string([
        ("response_type", "code"),
        ("client_id", client_id),
        ("redirect_uri", REDIRECT_URI),
        ("scope", "read write"),
        ("state", state),
        ("code_challenge", challenge.as_str()),
        ("code_challenge_method", "S256"),
    ])
    .unwrap();
    format!("/authorize?{query}")
}

/// Authorize and return the code from the `Location` header.
pub async fn authorize(app: &TestApp, client_id: &str) -> String {
    let response = get(app, &authorize_uri(client_id, "xyz")).await;
    assert_eq!(response.status, StatusCode::FOUND);
    let location = response.headers.get("Location").unwrap().to_str().unwrap();
    query_param(location, "code").unwrap()
}

pub fn query_param(url: &str, name: &str) -> Option<String> {
    url::Url::parse(url)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

/// Form-encoded `/token` request for `code` with the matching verifier.
pub fn exchange_request(client_id: &str, code: &str) -> Request<Body> {
    form_request(
        "/token",
        &[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", REDIRECT_URI),
            ("client_id", client_id),
            ("code_verifier", CODE_VERIFIER),
        ],
    )
}

/// Exchange `code` with the matching verifier using a form body.
pub async fn exchange(app: &TestApp, client_id: &str, code: &str) -> TestResponse {
    send(app, exchange_request(client_id, code)).await
}

/// Full flow; returns `(client_id, access_token)`.
pub async fn obtain_token(app: &TestApp) -> (String, String) {
    let client_id = register(app).await;
    let code = authorize(app, &client_id).await;
    let response = exchange(app, &client_id, &code).await;
    assert_eq!(response.status, StatusCode::OK);
    let token = response.json()["access_token"].as_str().unwrap().to_string();
    (client_id, token)
}
