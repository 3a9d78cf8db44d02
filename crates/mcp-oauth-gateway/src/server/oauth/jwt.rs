//! HS256 access token signing.
//!
//! Access tokens are self-describing JWTs. Validation here covers the
//! signature and the token's own claims only; the store check lives in the
//! authorization server.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{OAuthError, OAuthResult};

/// Access token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
    pub scope: String,
    pub client_id: String,
}

/// Signs and verifies access tokens with a single symmetric secret.
#[derive(Clone)]
pub struct TokenSigner {
    encoding_key: Arc<EncodingKey>,
    decoding_key: Arc<DecodingKey>,
    validation: Arc<Validation>,
    issuer: String,
    audience: String,
}

impl TokenSigner {
    /// Create a signer for the given issuer and audience.
    pub fn new(secret: &[u8], issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        let issuer = issuer.into();
        let audience = audience.into();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[&issuer]);
        validation.set_audience(&[&audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        Self {
            encoding_key: Arc::new(EncodingKey::from_secret(secret)),
            decoding_key: Arc::new(DecodingKey::from_secret(secret)),
            validation: Arc::new(validation),
            issuer,
            audience,
        }
    }

    /// Mint a token for `client_id` issued at `issued_at`, valid for `lifetime`.
    ///
    /// Returns the serialized token and its claims.
    pub fn mint(
        &self,
        client_id: &str,
        scope: &str,
        issued_at: DateTime<Utc>,
        lifetime: Duration,
    ) -> OAuthResult<(String, AccessTokenClaims)> {
        let iat = issued_at.timestamp();
        let claims = AccessTokenClaims {
            iss: self.issuer.clone(),
            sub: client_id.to_string(),
            aud: self.audience.clone(),
            exp: iat + lifetime.as_secs() as i64,
            iat,
            jti: uuid::Uuid::new_v4().simple().to_string(),
            scope: scope.to_string(),
            client_id: client_id.to_string(),
        };

        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| OAuthError::ServerError(format!("failed to sign access token: {e}")))?;

        Ok((token, claims))
    }

    /// Verify signature, issuer, audience and expiry.
    pub fn verify(&self, token: &str) -> OAuthResult<AccessTokenClaims> {
        jsonwebtoken::decode::<AccessTokenClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    OAuthError::invalid_token("token expired")
                }
                _ => OAuthError::invalid_token(format!("token rejected: {e}")),
            })
    }
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish()
    }
}
