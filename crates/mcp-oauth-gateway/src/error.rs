//! Error types for the OAuth gateway.
//!
//! Uses `thiserror` for structured error handling. [`OAuthError`] covers every
//! client-visible failure of the OAuth endpoints and the bearer guard;
//! [`ConfigError`] covers misconfiguration, which is rejected at startup.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

/// Errors surfaced by the authorization server and the bearer guard.
///
/// All variants except [`OAuthError::ServerError`] are client errors. None of
/// them are retried by the server.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OAuthError {
    /// Unknown or mismatched `client_id`.
    #[error("invalid client: {0}")]
    InvalidClient(String),

    /// Redirect URI rejected by registration policy or not registered.
    #[error("invalid redirect URI: {0}")]
    InvalidRedirectUri(String),

    /// `response_type` other than `code`.
    #[error("unsupported response type: {0}")]
    UnsupportedResponseType(String),

    /// Missing or malformed parameter (including missing PKCE parameters).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Unknown, expired, already used, or mismatched authorization code.
    #[error("invalid grant: {0}")]
    InvalidGrant(String),

    /// `grant_type` other than `authorization_code`.
    #[error("unsupported grant type: {0}")]
    UnsupportedGrantType(String),

    /// Access token failed the signature, expiry, or store check.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// Registration throttle tripped.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Token could not be signed.
    #[error("server error: {0}")]
    ServerError(String),
}

impl OAuthError {
    /// Create an invalid request error.
    #[must_use]
    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::InvalidRequest(description.into())
    }

    /// Create an invalid grant error.
    #[must_use]
    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self::InvalidGrant(description.into())
    }

    /// Create an invalid token error.
    #[must_use]
    pub fn invalid_token(description: impl Into<String>) -> Self {
        Self::InvalidToken(description.into())
    }

    /// Machine-readable error code for the `error` member of the response body.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidClient(_) => "invalid_client",
            Self::InvalidRedirectUri(_) => "invalid_redirect_uri",
            Self::UnsupportedResponseType(_) => "unsupported_response_type",
            Self::InvalidRequest(_) => "invalid_request",
            Self::InvalidGrant(_) => "invalid_grant",
            Self::UnsupportedGrantType(_) => "unsupported_grant_type",
            Self::InvalidToken(_) => "invalid_token",
            Self::RateLimited(_) => "temporarily_unavailable",
            Self::ServerError(_) => "server_error",
        }
    }

    /// Human-readable detail for the `error_description` member.
    #[must_use]
    pub fn description(&self) -> &str {
        match self {
            Self::InvalidClient(d)
            | Self::InvalidRedirectUri(d)
            | Self::UnsupportedResponseType(d)
            | Self::InvalidRequest(d)
            | Self::InvalidGrant(d)
            | Self::UnsupportedGrantType(d)
            | Self::InvalidToken(d)
            | Self::RateLimited(d)
            | Self::ServerError(d) => d,
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "error": self.error_code(),
            "error_description": self.description(),
        }));

        let mut response = (self.status(), body).into_response();
        response.headers_mut().insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        response
    }
}

/// Startup configuration errors.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// Signing secret shorter than the minimum length.
    #[error("signing secret must be at least {min} bytes, got {actual}")]
    WeakSecret {
        /// Required minimum length in bytes
        min: usize,
        /// Length of the configured secret
        actual: usize,
    },

    /// Base URL is not an absolute http(s) URL.
    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl {
        /// The rejected URL
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// Mount path is empty, contains characters outside `[A-Za-z0-9_-]`, or
    /// collides with a gateway endpoint.
    #[error(
        "invalid mount path '{0}': use a single segment of letters, digits, '-' or '_' that is not a gateway endpoint"
    )]
    InvalidMountPath(String),

    /// An environment or command-line value could not be parsed.
    #[error("invalid value '{value}' for {var}")]
    InvalidEnv {
        /// Variable name
        var: &'static str,
        /// The rejected value
        value: String,
    },

    /// A lifetime or interval was configured as zero.
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
}

/// Result type alias for OAuth operations.
pub type OAuthResult<T> = Result<T, OAuthError>;
