//! MCP OAuth Gateway
//!
//! An OAuth 2.1 authorization server and bearer-gated gateway for an MCP
//! endpoint exposed over a public tunnel.
//!
//! # Features
//!
//! - **Dynamic Client Registration** (RFC 7591) for public clients
//! - **Authorization Code + PKCE** (RFC 6749, RFC 7636), auto-approved
//! - **HS256 access tokens**, revocable through a server-side record
//! - **Introspection and revocation** (RFC 7662, RFC 7009)
//! - **Discovery** (RFC 8414, RFC 9728), lenient about trailing path segments
//! - **Private mount**: the protocol handler lives at a random path, behind
//!   bearer enforcement
//!
//! # Example
//!
//! ```no_run
//! use mcp_oauth_gateway::{config::Config, server::{GatewayServer, protocol}};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let protocol = protocol::router(&config.server_name);
//!     let server = GatewayServer::new(config);
//!
//!     server.run_http("0.0.0.0:8300".parse()?, protocol).await
//! }
//! ```

pub mod config;
pub mod error;
pub mod server;

pub use config::Config;
pub use error::{ConfigError, OAuthError, OAuthResult};
pub use server::GatewayServer;
pub use server::oauth::AuthorizationServer;
