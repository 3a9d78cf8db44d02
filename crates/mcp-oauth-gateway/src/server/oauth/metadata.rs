//! Discovery documents.
//!
//! - RFC 8414: OAuth Authorization Server Metadata
//! - RFC 9728: OAuth Protected Resource Metadata
//!
//! Both are computed once from [`Config`] and served as pre-serialized bytes,
//! so every route that publishes a document returns the same body.

use serde::Serialize;

use crate::config::Config;

/// RFC 8414 authorization server metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizationServerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub registration_endpoint: String,
    pub introspection_endpoint: String,
    pub revocation_endpoint: String,
    pub scopes_supported: Vec<String>,
    pub response_types_supported: Vec<&'static str>,
    pub grant_types_supported: Vec<&'static str>,
    pub token_endpoint_auth_methods_supported: Vec<&'static str>,
    pub registration_endpoint_auth_methods_supported: Vec<&'static str>,
    pub code_challenge_methods_supported: Vec<&'static str>,
}

impl AuthorizationServerMetadata {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            issuer: config.base_url.clone(),
            authorization_endpoint: config.endpoint("/authorize"),
            token_endpoint: config.endpoint("/token"),
            registration_endpoint: config.endpoint("/register"),
            introspection_endpoint: config.endpoint("/introspect"),
            revocation_endpoint: config.endpoint("/revoke"),
            scopes_supported: config.scopes_supported.clone(),
            response_types_supported: vec!["code"],
            grant_types_supported: vec!["authorization_code"],
            token_endpoint_auth_methods_supported: vec!["none"],
            registration_endpoint_auth_methods_supported: vec!["none"],
            code_challenge_methods_supported: vec!["S256", "plain"],
        }
    }
}

/// RFC 9728 protected resource metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProtectedResourceMetadata {
    pub resource: String,
    pub authorization_servers: Vec<String>,
    pub scopes_supported: Vec<String>,
    pub bearer_methods_supported: Vec<&'static str>,
}

impl ProtectedResourceMetadata {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            resource: config.base_url.clone(),
            authorization_servers: vec![config.base_url.clone()],
            scopes_supported: config.resource_scopes.clone(),
            bearer_methods_supported: vec!["header"],
        }
    }
}

/// Both documents, serialized.
#[derive(Debug, Clone)]
pub struct MetadataDocuments {
    pub authorization_server: Vec<u8>,
    pub protected_resource: Vec<u8>,
}

impl MetadataDocuments {
    /// Serialize both documents for `config`.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn from_config(config: &Config) -> serde_json::Result<Self> {
        Ok(Self {
            authorization_server: serde_json::to_vec(&AuthorizationServerMetadata::from_config(config))?,
            protected_resource: serde_json::to_vec(&ProtectedResourceMetadata::from_config(config))?,
        })
    }
}
