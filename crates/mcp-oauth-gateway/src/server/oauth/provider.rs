//! The authorization server.
//!
//! Transport-agnostic OAuth 2.1 logic: handlers normalize each HTTP request
//! into a typed request struct and call one method here.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};

use super::jwt::{AccessTokenClaims, TokenSigner};
use super::pkce;
use super::registry;
use super::store::OAuthStores;
use super::types::{
    AccessTokenRecord, AuthorizationCode, AuthorizationRedirect, AuthorizationRequest,
    ClientMetadata, CodeChallengeMethod, IntrospectionResponse, RegisteredClient, TokenRequest,
    TokenResponse,
};
use crate::config::Config;
use crate::error::{OAuthError, OAuthResult};

/// OAuth 2.1 authorization server backed by injected stores.
pub struct AuthorizationServer {
    stores: OAuthStores,
    signer: TokenSigner,
    auth_code_ttl: Duration,
    access_token_ttl: Duration,
    default_client_scope: String,
    register_limiter: Option<DefaultDirectRateLimiter>,
}

impl AuthorizationServer {
    /// Create a server with fresh in-memory stores.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self::with_stores(config, OAuthStores::in_memory())
    }

    /// Create a server on the given stores.
    #[must_use]
    pub fn with_stores(config: &Config, stores: OAuthStores) -> Self {
        let signer =
            TokenSigner::new(config.signing_secret.as_bytes(), &config.base_url, &config.base_url);
        Self {
            stores,
            signer,
            auth_code_ttl: config.auth_code_ttl,
            access_token_ttl: config.access_token_ttl,
            default_client_scope: config.default_client_scope.clone(),
            register_limiter: config
                .register_rate_per_minute
                .and_then(NonZeroU32::new)
                .map(|rate| RateLimiter::direct(Quota::per_minute(rate))),
        }
    }

    /// The stores this server runs on.
    #[must_use]
    pub const fn stores(&self) -> &OAuthStores {
        &self.stores
    }

    /// The token signer.
    #[must_use]
    pub const fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    /// Register a new public client (RFC 7591).
    pub async fn register_client(&self, metadata: ClientMetadata) -> OAuthResult<RegisteredClient> {
        if let Some(limiter) = &self.register_limiter {
            if limiter.check().is_err() {
                tracing::warn!("Client registration throttled");
                return Err(OAuthError::RateLimited("too many registrations, retry later".into()));
            }
        }

        let client = registry::new_client(metadata, &self.default_client_scope, Utc::now().timestamp())?;

        if !self.stores.clients.insert(client.clone()).await {
            // 64 random bits collided; nothing was stored.
            return Err(OAuthError::ServerError("client id collision, retry registration".into()));
        }

        tracing::info!(
            client_id = %client.client_id,
            client_name = ?client.client_name,
            redirect_uris = client.redirect_uris.len(),
            "Registered OAuth client"
        );

        Ok(client)
    }

    /// Handle an authorization request and issue a code.
    ///
    /// Approval is automatic: a registered client presenting an exact
    /// redirect URI and a PKCE challenge gets a code.
    pub async fn authorize(&self, req: AuthorizationRequest) -> OAuthResult<AuthorizationRedirect> {
        let response_type = req.response_type.as_deref().unwrap_or_default();
        if response_type != "code" {
            return Err(OAuthError::UnsupportedResponseType(format!(
                "response_type must be 'code', got '{response_type}'"
            )));
        }

        let client_id =
            req.client_id.ok_or_else(|| OAuthError::invalid_request("client_id is required"))?;
        let client = self
            .stores
            .clients
            .get(&client_id)
            .await
            .ok_or_else(|| OAuthError::InvalidClient(format!("unknown client_id '{client_id}'")))?;

        let redirect_uri =
            req.redirect_uri.ok_or_else(|| OAuthError::invalid_request("redirect_uri is required"))?;
        if !client.redirect_uris.iter().any(|u| *u == redirect_uri) {
            return Err(OAuthError::InvalidRedirectUri(
                "redirect_uri is not registered for this client".into(),
            ));
        }

        let code_challenge = req
            .code_challenge
            .filter(|c| !c.is_empty())
            .ok_or_else(|| OAuthError::invalid_request("PKCE required: code_challenge is missing"))?;
        let method = req
            .code_challenge_method
            .as_deref()
            .and_then(CodeChallengeMethod::parse)
            .ok_or_else(|| {
                OAuthError::invalid_request("PKCE required: code_challenge_method must be S256 or plain")
            })?;

        let scope = req.scope.filter(|s| !s.trim().is_empty()).unwrap_or_else(|| client.scope.clone());
        let code = generate_code();
        let redirect_url = build_redirect(&redirect_uri, &code, req.state.as_deref());

        self.stores
            .codes
            .insert(
                code.clone(),
                AuthorizationCode {
                    client_id: client_id.clone(),
                    redirect_uri,
                    scope,
                    state: req.state,
                    code_challenge,
                    code_challenge_method: method,
                    expires_at: expires_after(Utc::now(), self.auth_code_ttl),
                },
            )
            .await;

        tracing::info!(client_id = %client_id, method = method.as_str(), "Issued authorization code");

        Ok(AuthorizationRedirect { code, redirect_url })
    }

    /// Exchange an authorization code for an access token.
    pub async fn exchange_code(&self, req: TokenRequest) -> OAuthResult<TokenResponse> {
        let grant_type = req.grant_type.as_deref().unwrap_or_default();
        if grant_type != "authorization_code" {
            return Err(OAuthError::UnsupportedGrantType(format!(
                "grant_type must be 'authorization_code', got '{grant_type}'"
            )));
        }

        let code = req.code.ok_or_else(|| OAuthError::invalid_request("code is required"))?;
        let code_verifier = req
            .code_verifier
            .filter(|v| !v.is_empty())
            .ok_or_else(|| OAuthError::invalid_request("code_verifier is required"))?;
        let client_id =
            req.client_id.ok_or_else(|| OAuthError::invalid_request("client_id is required"))?;
        let redirect_uri =
            req.redirect_uri.ok_or_else(|| OAuthError::invalid_request("redirect_uri is required"))?;

        // Binding checks run under the store lock; a failed check leaves the
        // code redeemable by the legitimate client.
        let check = |grant: &AuthorizationCode| -> OAuthResult<()> {
            if client_id != grant.client_id {
                tracing::warn!(client_id = %grant.client_id, "Authorization code presented by another client");
                return Err(OAuthError::invalid_grant("client_id does not match the authorization code"));
            }
            if redirect_uri != grant.redirect_uri {
                tracing::warn!(client_id = %grant.client_id, "Authorization code presented with another redirect_uri");
                return Err(OAuthError::invalid_grant("redirect_uri does not match the authorization request"));
            }
            if !pkce::verify(grant.code_challenge_method, &code_verifier, &grant.code_challenge) {
                tracing::warn!(client_id = %grant.client_id, "PKCE verification failed");
                return Err(OAuthError::invalid_grant("PKCE verification failed"));
            }
            Ok(())
        };
        let grant = self.stores.codes.redeem(&code, Utc::now(), &check).await?;

        let issued_at = Utc::now();
        let (access_token, claims) =
            self.signer.mint(&grant.client_id, &grant.scope, issued_at, self.access_token_ttl)?;

        self.stores
            .tokens
            .insert(
                access_token.clone(),
                AccessTokenRecord {
                    client_id: grant.client_id.clone(),
                    scope: grant.scope.clone(),
                    expires_at: expires_after(issued_at, self.access_token_ttl),
                },
            )
            .await;

        tracing::info!(client_id = %claims.client_id, scope = %claims.scope, "Issued access token");

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer",
            expires_in: self.access_token_ttl.as_secs(),
            scope: grant.scope,
        })
    }

    /// Fully validate an access token.
    ///
    /// A token is valid iff its signature verifies, its `exp` claim has not
    /// passed, and a live store record still exists for it.
    pub async fn validate_token(&self, token: &str) -> OAuthResult<AccessTokenClaims> {
        let claims = self.signer.verify(token)?;

        let record = self
            .stores
            .tokens
            .get(token, Utc::now())
            .await
            .ok_or_else(|| OAuthError::invalid_token("token revoked or expired"))?;

        if record.client_id != claims.client_id {
            return Err(OAuthError::invalid_token("token record does not match its claims"));
        }

        Ok(claims)
    }

    /// Token introspection (RFC 7662). Never fails: bad tokens are inactive.
    pub async fn introspect(&self, token: &str) -> IntrospectionResponse {
        match self.validate_token(token).await {
            Ok(claims) => IntrospectionResponse {
                active: true,
                scope: Some(claims.scope),
                token_type: Some("Bearer".to_string()),
                client_id: Some(claims.client_id),
                sub: Some(claims.sub),
                exp: Some(claims.exp),
                iat: Some(claims.iat),
            },
            Err(e) => {
                tracing::debug!(reason = %e, "Introspected inactive token");
                IntrospectionResponse::inactive()
            }
        }
    }

    /// Token revocation (RFC 7009). Idempotent and silent about whether the
    /// token existed.
    pub async fn revoke(&self, token: &str) {
        if self.stores.tokens.remove(token).await {
            tracing::info!("Revoked access token");
        }
    }

    /// Delete expired codes and tokens now.
    pub async fn purge_expired(&self) -> (usize, usize) {
        self.stores.purge_expired(Utc::now()).await
    }

    /// Start a background task that sweeps expired records every `interval`.
    pub fn start_cleanup_task(self: Arc<Self>, interval: Duration) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.purge_expired().await;
            }
        });
    }
}

impl std::fmt::Debug for AuthorizationServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationServer")
            .field("signer", &self.signer)
            .field("auth_code_ttl", &self.auth_code_ttl)
            .field("access_token_ttl", &self.access_token_ttl)
            .field("register_throttle", &self.register_limiter.is_some())
            .finish()
    }
}

/// Append `code` and, when present, `state` to the redirect URI exactly as
/// registered. The URI itself is never re-serialized, so an existing query is
/// kept and no path is added.
fn build_redirect(redirect_uri: &str, code: &str, state: Option<&str>) -> String {
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    query.append_pair("code", code);
    if let Some(state) = state {
        query.append_pair("state", state);
    }

    let separator = if !redirect_uri.contains('?') {
        "?"
    } else if redirect_uri.ends_with('?') || redirect_uri.ends_with('&') {
        ""
    } else {
        "&"
    };
    format!("{redirect_uri}{separator}{}", query.finish())
}

fn expires_after(from: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    from + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365))
}

/// 256 random bits, hex encoded.
fn generate_code() -> String {
    format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::*;
    use crate::server::oauth::pkce::s256_challenge;

    const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    const REDIRECT: &str = "https://example.com/cb";

    fn server() -> AuthorizationServer {
        AuthorizationServer::new(&Config::for_testing("https://gateway.example"))
    }

    async fn register(server: &AuthorizationServer) -> RegisteredClient {
        server
            .register_client(ClientMetadata {
                redirect_uris: vec![REDIRECT.into()],
                client_name: Some("Test".into()),
                ..ClientMetadata::default()
            })
            .await
            .unwrap()
    }

    fn authorize_request(client_id: &str) -> AuthorizationRequest {
        AuthorizationRequest {
            response_type: Some("code".into()),
            client_id: Some(client_id.into()),
            redirect_uri: Some(REDIRECT.into()),
            scope: Some("read write".into()),
            state: Some("xyz".into()),
            code_challenge: Some(s256_challenge(VERIFIER)),
            code_challenge_method: Some("S256".into()),
        }
    }

    fn token_request(client_id: &str, code: &str) -> TokenRequest {
        TokenRequest {
            grant_type: Some("authorization_code".into()),
            code: Some(code.into()),
            redirect_uri: Some(REDIRECT.into()),
            client_id: Some(client_id.into()),
            code_verifier: Some(VERIFIER.into()),
        }
    }

    #[tokio::test]
    async fn test_round_trip() {
        let server = server();
        let client = register(&server).await;

        let redirect = server.authorize(authorize_request(&client.client_id)).await.unwrap();
        assert_eq!(
            redirect.redirect_url,
            format!("{REDIRECT}?code={}&state=xyz", redirect.code)
        );

        let token = server.exchange_code(token_request(&client.client_id, &redirect.code)).await.unwrap();
        assert_eq!(token.token_type, "Bearer");
        assert_eq!(token.expires_in, 3600);
        assert_eq!(token.scope, "read write");

        let introspection = server.introspect(&token.access_token).await;
        assert!(introspection.active);
        assert_eq!(introspection.scope.as_deref(), Some("read write"));
        assert_eq!(introspection.client_id.as_deref(), Some(client.client_id.as_str()));
    }

    #[tokio::test]
    async fn test_scope_defaults_to_client_scope() {
        let server = server();
        let client = register(&server).await;

        let mut req = authorize_request(&client.client_id);
        req.scope = None;
        let redirect = server.authorize(req).await.unwrap();
        let token = server.exchange_code(token_request(&client.client_id, &redirect.code)).await.unwrap();
        assert_eq!(token.scope, "read");
    }

    #[tokio::test]
    async fn test_authorize_validation_order() {
        let server = server();
        let client = register(&server).await;

        let mut req = authorize_request("nobody");
        req.response_type = Some("token".into());
        assert!(matches!(server.authorize(req).await, Err(OAuthError::UnsupportedResponseType(_))));

        let req = authorize_request("nobody");
        assert!(matches!(server.authorize(req).await, Err(OAuthError::InvalidClient(_))));

        let mut req = authorize_request(&client.client_id);
        req.redirect_uri = Some("https://example.com/cb/extra".into());
        assert!(matches!(server.authorize(req).await, Err(OAuthError::InvalidRedirectUri(_))));

        let mut req = authorize_request(&client.client_id);
        req.code_challenge = None;
        assert!(matches!(server.authorize(req).await, Err(OAuthError::InvalidRequest(_))));

        let mut req = authorize_request(&client.client_id);
        req.code_challenge_method = Some("MD5".into());
        assert!(matches!(server.authorize(req).await, Err(OAuthError::InvalidRequest(_))));

        let mut req = authorize_request(&client.client_id);
        req.code_challenge_method = None;
        assert!(matches!(server.authorize(req).await, Err(OAuthError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_state_is_encoded_and_existing_query_kept() {
        let server = server();
        let client = server
            .register_client(ClientMetadata {
                redirect_uris: vec!["http://localhost:3000/cb?app=1".into()],
                ..ClientMetadata::default()
            })
            .await
            .unwrap();

        let req = AuthorizationRequest {
            redirect_uri: Some("http://localhost:3000/cb?app=1".into()),
            state: Some("a b&c".into()),
            ..authorize_request(&client.client_id)
        };
        let redirect = server.authorize(req).await.unwrap();

        let url = Url::parse(&redirect.redirect_url).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("app".to_string(), "1".to_string()),
                ("code".to_string(), redirect.code.clone()),
                ("state".to_string(), "a b&c".to_string()),
            ]
        );
    }

    #[test]
    fn test_redirect_appends_to_uri_as_registered() {
        assert_eq!(build_redirect("https://example.com", "c1", None), "https://example.com?code=c1");
        assert_eq!(
            build_redirect("https://example.com/cb?app=1", "c1", Some("s")),
            "https://example.com/cb?app=1&code=c1&state=s"
        );
        assert_eq!(build_redirect("http://127.0.0.1:9000/cb?", "c1", None), "http://127.0.0.1:9000/cb?code=c1");
        assert_eq!(
            build_redirect("https://example.com/cb", "c1", Some("a b&c")),
            "https://example.com/cb?code=c1&state=a+b%26c"
        );
    }

    #[tokio::test]
    async fn test_code_single_use() {
        let server = server();
        let client = register(&server).await;
        let redirect = server.authorize(authorize_request(&client.client_id)).await.unwrap();

        assert!(server.exchange_code(token_request(&client.client_id, &redirect.code)).await.is_ok());
        let err = server.exchange_code(token_request(&client.client_id, &redirect.code)).await.unwrap_err();
        assert!(matches!(err, OAuthError::InvalidGrant(_)));
    }

    #[tokio::test]
    async fn test_expired_code_rejected_and_deleted() {
        let server = server();
        let client = register(&server).await;
        server
            .stores()
            .codes
            .insert(
                "stale".into(),
                AuthorizationCode {
                    client_id: client.client_id.clone(),
                    redirect_uri: REDIRECT.into(),
                    scope: "read".into(),
                    state: None,
                    code_challenge: s256_challenge(VERIFIER),
                    code_challenge_method: CodeChallengeMethod::S256,
                    expires_at: Utc::now() - chrono::Duration::seconds(1),
                },
            )
            .await;

        let err = server.exchange_code(token_request(&client.client_id, "stale")).await.unwrap_err();
        assert_eq!(err, OAuthError::invalid_grant("authorization code expired"));
        assert_eq!(server.stores().codes.len().await, 0);
    }

    #[tokio::test]
    async fn test_mismatched_exchange_keeps_code_for_retry() {
        let server = server();
        let client = register(&server).await;
        let redirect = server.authorize(authorize_request(&client.client_id)).await.unwrap();

        let err = server.exchange_code(token_request("someone-else", &redirect.code)).await.unwrap_err();
        assert_eq!(err, OAuthError::invalid_grant("client_id does not match the authorization code"));

        let mut req = token_request(&client.client_id, &redirect.code);
        req.redirect_uri = Some("https://example.com/other".into());
        assert_eq!(
            server.exchange_code(req).await.unwrap_err(),
            OAuthError::invalid_grant("redirect_uri does not match the authorization request")
        );

        let mut req = token_request(&client.client_id, &redirect.code);
        req.code_verifier = Some("wrong-verifier".into());
        assert_eq!(
            server.exchange_code(req).await.unwrap_err(),
            OAuthError::invalid_grant("PKCE verification failed")
        );

        assert_eq!(server.stores().codes.len().await, 1);
        let token = server.exchange_code(token_request(&client.client_id, &redirect.code)).await.unwrap();
        assert!(server.introspect(&token.access_token).await.active);
        assert_eq!(server.stores().codes.len().await, 0);
    }

    #[tokio::test]
    async fn test_missing_parameters_do_not_burn_code() {
        let server = server();
        let client = register(&server).await;
        let redirect = server.authorize(authorize_request(&client.client_id)).await.unwrap();

        let mut req = token_request(&client.client_id, &redirect.code);
        req.code_verifier = None;
        assert!(matches!(server.exchange_code(req).await, Err(OAuthError::InvalidRequest(_))));

        let mut req = token_request(&client.client_id, &redirect.code);
        req.client_id = None;
        assert!(matches!(server.exchange_code(req).await, Err(OAuthError::InvalidRequest(_))));

        let mut req = token_request(&client.client_id, &redirect.code);
        req.redirect_uri = None;
        assert!(matches!(server.exchange_code(req).await, Err(OAuthError::InvalidRequest(_))));

        let mut req = token_request(&client.client_id, &redirect.code);
        req.grant_type = Some("refresh_token".into());
        assert!(matches!(server.exchange_code(req).await, Err(OAuthError::UnsupportedGrantType(_))));

        assert!(server.exchange_code(token_request(&client.client_id, &redirect.code)).await.is_ok());
    }

    #[tokio::test]
    async fn test_plain_pkce() {
        let server = server();
        let client = register(&server).await;

        let mut req = authorize_request(&client.client_id);
        req.code_challenge = Some("plain-verifier-value".into());
        req.code_challenge_method = Some("plain".into());
        let redirect = server.authorize(req).await.unwrap();

        let mut req = token_request(&client.client_id, &redirect.code);
        req.code_verifier = Some("plain-verifier-value".into());
        assert!(server.exchange_code(req).await.is_ok());
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let server = server();
        let client = register(&server).await;
        let redirect = server.authorize(authorize_request(&client.client_id)).await.unwrap();
        let token = server.exchange_code(token_request(&client.client_id, &redirect.code)).await.unwrap();

        server.revoke(&token.access_token).await;
        server.revoke(&token.access_token).await;
        server.revoke("never-existed").await;

        assert!(!server.introspect(&token.access_token).await.active);
    }

    #[tokio::test]
    async fn test_expired_store_record_fails_validation() {
        let server = server();
        let (token, _) = server
            .signer()
            .mint("client1", "read", Utc::now(), Duration::from_secs(3600))
            .unwrap();
        server
            .stores()
            .tokens
            .insert(
                token.clone(),
                AccessTokenRecord {
                    client_id: "client1".into(),
                    scope: "read".into(),
                    expires_at: Utc::now() - chrono::Duration::seconds(1),
                },
            )
            .await;

        assert!(server.validate_token(&token).await.is_err());
        assert!(!server.introspect(&token).await.active);
    }

    #[tokio::test]
    async fn test_expired_claim_fails_even_with_live_record() {
        let server = server();
        let issued = Utc::now() - chrono::Duration::hours(2);
        let (token, _) =
            server.signer().mint("client1", "read", issued, Duration::from_secs(3600)).unwrap();
        server
            .stores()
            .tokens
            .insert(
                token.clone(),
                AccessTokenRecord {
                    client_id: "client1".into(),
                    scope: "read".into(),
                    expires_at: Utc::now() + chrono::Duration::hours(1),
                },
            )
            .await;

        assert!(!server.introspect(&token).await.active);
    }

    #[tokio::test]
    async fn test_signed_token_without_record_fails() {
        let server = server();
        let (token, _) =
            server.signer().mint("client1", "read", Utc::now(), Duration::from_secs(3600)).unwrap();
        assert_eq!(
            server.validate_token(&token).await.unwrap_err(),
            OAuthError::invalid_token("token revoked or expired")
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_exchange_single_winner() {
        let server = Arc::new(server());
        let client = register(&server).await;
        let redirect = server.authorize(authorize_request(&client.client_id)).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let server = Arc::clone(&server);
                let req = token_request(&client.client_id, &redirect.code);
                tokio::spawn(async move { server.exchange_code(req).await.is_ok() })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_registration_throttle() {
        let mut config = Config::for_testing("https://gateway.example");
        config.register_rate_per_minute = Some(2);
        let server = AuthorizationServer::new(&config);

        assert!(register_checked(&server).await.is_ok());
        assert!(register_checked(&server).await.is_ok());
        assert!(matches!(register_checked(&server).await, Err(OAuthError::RateLimited(_))));
        assert_eq!(server.stores().clients.len().await, 2);
    }

    async fn register_checked(server: &AuthorizationServer) -> OAuthResult<RegisteredClient> {
        server
            .register_client(ClientMetadata {
                redirect_uris: vec![REDIRECT.into()],
                ..ClientMetadata::default()
            })
            .await
    }
}
