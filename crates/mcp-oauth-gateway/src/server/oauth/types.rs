//! OAuth 2.1 records and wire types.
//!
//! Request structs are the single typed form each endpoint body or query is
//! normalized into before any business logic runs. Every field is optional
//! so that a missing parameter becomes an OAuth error instead of an extractor
//! rejection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// PKCE code challenge method (RFC 7636 §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeChallengeMethod {
    /// Verifier is compared as-is.
    #[serde(rename = "plain")]
    Plain,
    /// Challenge is `BASE64URL(SHA256(verifier))`.
    S256,
}

impl CodeChallengeMethod {
    /// Parse a method name. Names are case-sensitive.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "plain" => Some(Self::Plain),
            "S256" => Some(Self::S256),
            _ => None,
        }
    }

    /// The wire name of this method.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::S256 => "S256",
        }
    }
}

/// A dynamically registered public client.
///
/// Serializes as the RFC 7591 registration response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisteredClient {
    pub client_id: String,
    /// Always `None`: clients are public and authenticate with PKCE.
    pub client_secret: Option<String>,
    pub redirect_uris: Vec<String>,
    pub client_name: Option<String>,
    pub client_uri: Option<String>,
    pub logo_uri: Option<String>,
    pub scope: String,
    pub contacts: Option<Vec<String>>,
    pub tos_uri: Option<String>,
    pub policy_uri: Option<String>,
    pub token_endpoint_auth_method: String,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    /// Seconds since the epoch.
    pub client_id_issued_at: i64,
    /// `0` means the (absent) secret never expires.
    pub client_secret_expires_at: i64,
}

/// An issued, not yet exchanged, authorization code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationCode {
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub state: Option<String>,
    pub code_challenge: String,
    pub code_challenge_method: CodeChallengeMethod,
    pub expires_at: DateTime<Utc>,
}

impl AuthorizationCode {
    /// Check if the code has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Server-side record kept for every live access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessTokenRecord {
    pub client_id: String,
    pub scope: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessTokenRecord {
    /// Check if the record has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

// ─── Requests ────────────────────────────────────────────────────────────────

/// `POST /register` body (RFC 7591 §2).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientMetadata {
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    pub client_name: Option<String>,
    pub client_uri: Option<String>,
    pub logo_uri: Option<String>,
    pub scope: Option<String>,
    pub contacts: Option<Vec<String>>,
    pub tos_uri: Option<String>,
    pub policy_uri: Option<String>,
    pub token_endpoint_auth_method: Option<String>,
    pub grant_types: Option<Vec<String>>,
    pub response_types: Option<Vec<String>>,
}

/// `GET /authorize` query.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorizationRequest {
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

/// `POST /token` body, JSON or form encoded.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub client_id: Option<String>,
    pub code_verifier: Option<String>,
}

/// `POST /introspect` and `POST /revoke` body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenParam {
    pub token: Option<String>,
    /// Accepted and ignored (RFC 7009 §2.1).
    pub token_type_hint: Option<String>,
}

// ─── Responses ───────────────────────────────────────────────────────────────

/// Result of a successful authorization request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRedirect {
    /// The issued code.
    pub code: String,
    /// Where the user agent goes next: `redirect_uri?code=..[&state=..]`.
    pub redirect_url: String,
}

/// `POST /token` success body (RFC 6749 §5.1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
    pub scope: String,
}

/// `POST /introspect` body (RFC 7662 §2.2).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct IntrospectionResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

impl IntrospectionResponse {
    /// The response for any token that fails validation.
    #[must_use]
    pub fn inactive() -> Self {
        Self::default()
    }
}
