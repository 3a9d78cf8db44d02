//! Gateway server.
//!
//! Binds the HTTP listener, serves the gateway router, and owns the optional
//! background sweep of expired OAuth records.

pub mod gateway;
pub mod oauth;
pub mod protocol;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;

use crate::config::Config;
use oauth::AuthorizationServer;

/// OAuth gateway in front of a mounted protocol handler.
pub struct GatewayServer {
    config: Config,
    auth: Arc<AuthorizationServer>,
}

impl GatewayServer {
    /// Create a server with in-memory stores.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let auth = Arc::new(AuthorizationServer::new(&config));
        Self { config, auth }
    }

    /// Create a server around an existing authorization server.
    #[must_use]
    pub fn with_auth(config: Config, auth: Arc<AuthorizationServer>) -> Self {
        Self { config, auth }
    }

    /// The authorization server.
    #[must_use]
    pub fn auth(&self) -> &Arc<AuthorizationServer> {
        &self.auth
    }

    /// The configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Build the router with `protocol` mounted at the private path.
    ///
    /// # Errors
    ///
    /// Returns error if the discovery documents cannot be serialized.
    pub fn router(&self, protocol: Router) -> anyhow::Result<Router> {
        Ok(gateway::build_router(&self.config, Arc::clone(&self.auth), protocol)?)
    }

    /// Serve HTTP on `addr` until Ctrl+C.
    ///
    /// # Errors
    ///
    /// Returns error on bind or server failure.
    pub async fn run_http(self, addr: SocketAddr, protocol: Router) -> anyhow::Result<()> {
        let router = self.router(protocol)?;

        if let Some(interval) = self.config.cleanup_interval {
            Arc::clone(&self.auth).start_cleanup_task(interval);
            tracing::debug!(interval_secs = interval.as_secs(), "Started expired-record sweep");
        }

        let listener = tokio::net::TcpListener::bind(addr).await?;

        tracing::info!("HTTP server listening on http://{}", addr);
        tracing::info!(issuer = %self.config.base_url, "OAuth authorization server ready");
        tracing::info!(url = %self.config.protocol_url(), "Protocol endpoint mounted");

        axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;

        tracing::info!("HTTP server shut down");
        Ok(())
    }
}

impl std::fmt::Debug for GatewayServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayServer").field("config", &self.config).finish()
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received shutdown signal");
}
