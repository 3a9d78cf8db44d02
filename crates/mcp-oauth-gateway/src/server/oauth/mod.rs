//! OAuth 2.1 authorization server for MCP authentication.
//!
//! Self-contained: clients register dynamically, obtain a code through an
//! auto-approved PKCE authorization request, and exchange it for an HS256
//! access token that the gateway then accepts as a bearer credential.
//!
//! ## Supported Standards
//! - RFC 9728: OAuth Protected Resource Metadata
//! - RFC 8414: OAuth Authorization Server Metadata
//! - RFC 7591: Dynamic Client Registration
//! - RFC 7636: PKCE (S256 and plain)
//! - RFC 6749: Authorization Code Grant
//! - RFC 7662: Token Introspection
//! - RFC 7009: Token Revocation

pub mod handlers;
pub mod jwt;
pub mod metadata;
pub mod pkce;
pub mod provider;
pub mod registry;
pub mod store;
pub mod types;

pub use jwt::{AccessTokenClaims, TokenSigner};
pub use metadata::{AuthorizationServerMetadata, MetadataDocuments, ProtectedResourceMetadata};
pub use provider::AuthorizationServer;
pub use store::{AccessTokenStore, AuthorizationCodeStore, ClientRegistry, OAuthStores};
