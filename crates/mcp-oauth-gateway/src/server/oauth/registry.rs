//! Dynamic Client Registration policy (RFC 7591).
//!
//! Registration is open: anyone who can reach the gateway can obtain a client
//! id. What is enforced is where codes may be delivered, so every redirect
//! URI must be HTTPS or point at the loopback host.

use url::{Host, Url};

use super::types::{ClientMetadata, RegisteredClient};
use crate::error::{OAuthError, OAuthResult};

/// Prefix of every generated client id.
pub const CLIENT_ID_PREFIX: &str = "mcp_client_";

/// Check a single redirect URI against the registration policy.
///
/// Accepts `https` URIs and any scheme whose host is `localhost` or
/// `127.0.0.1`. Fragments are rejected (RFC 6749 §3.1.2).
pub fn validate_redirect_uri(uri: &str) -> OAuthResult<()> {
    let parsed = Url::parse(uri)
        .map_err(|e| OAuthError::InvalidRedirectUri(format!("'{uri}' is not a valid URL: {e}")))?;

    if parsed.fragment().is_some() {
        return Err(OAuthError::InvalidRedirectUri(format!(
            "'{uri}' must not contain a fragment"
        )));
    }

    let loopback = match parsed.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(addr)) => addr.octets() == [127, 0, 0, 1],
        _ => false,
    };

    if parsed.scheme() == "https" || loopback {
        Ok(())
    } else {
        Err(OAuthError::InvalidRedirectUri(format!(
            "'{uri}' must use https or a localhost host"
        )))
    }
}

/// Build a client record from registration metadata.
///
/// Validates every redirect URI and allocates a fresh client id.
pub fn new_client(
    metadata: ClientMetadata,
    default_scope: &str,
    issued_at: i64,
) -> OAuthResult<RegisteredClient> {
    if metadata.redirect_uris.is_empty() {
        return Err(OAuthError::InvalidRedirectUri(
            "at least one redirect URI is required".to_string(),
        ));
    }
    for uri in &metadata.redirect_uris {
        validate_redirect_uri(uri)?;
    }

    Ok(RegisteredClient {
        client_id: generate_client_id(),
        client_secret: None,
        redirect_uris: metadata.redirect_uris,
        client_name: metadata.client_name,
        client_uri: metadata.client_uri,
        logo_uri: metadata.logo_uri,
        scope: metadata.scope.filter(|s| !s.trim().is_empty()).unwrap_or_else(|| default_scope.to_string()),
        contacts: metadata.contacts,
        tos_uri: metadata.tos_uri,
        policy_uri: metadata.policy_uri,
        // Public clients only; any requested method is replaced.
        token_endpoint_auth_method: "none".to_string(),
        grant_types: metadata.grant_types.unwrap_or_else(|| vec!["authorization_code".to_string()]),
        response_types: metadata.response_types.unwrap_or_else(|| vec!["code".to_string()]),
        client_id_issued_at: issued_at,
        client_secret_expires_at: 0,
    })
}

/// `mcp_client_` followed by 16 random hex characters.
pub fn generate_client_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("{CLIENT_ID_PREFIX}{}", &hex[..16])
}
