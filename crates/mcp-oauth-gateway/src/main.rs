//! MCP OAuth Gateway - Entry Point
//!
//! Serves the OAuth endpoints and a default MCP handler at a private path.

use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use mcp_oauth_gateway::{
    config::{Config, defaults},
    error::ConfigError,
    server::{GatewayServer, protocol},
};

#[derive(Parser, Debug)]
#[command(name = "mcp-oauth-gateway")]
#[command(about = "OAuth 2.1 authorization server and gateway for a tunneled MCP endpoint")]
#[command(version)]
struct Cli {
    /// HTTP server port
    #[arg(long, default_value_t = defaults::PORT, env = "PORT")]
    port: u16,

    /// Bind address
    #[arg(long, default_value = defaults::HOST, env = "HOST")]
    host: String,

    /// Public base URL, e.g. the tunnel URL [env: GATEWAY_BASE_URL] (defaults to http://localhost:<port>)
    #[arg(long)]
    base_url: Option<String>,

    /// HS256 signing secret, at least 32 bytes [env: GATEWAY_JWT_SECRET] (random per process if unset)
    #[arg(long)]
    jwt_secret: Option<String>,

    /// Private mount path segment [env: GATEWAY_MOUNT_PATH] (random 32 hex characters if unset)
    #[arg(long)]
    mount_path: Option<String>,

    /// Do not require a bearer token on the mounted path [env: GATEWAY_REQUIRE_BEARER=false]
    #[arg(long)]
    no_bearer_auth: bool,

    /// Maximum client registrations per minute [env: GATEWAY_REGISTER_RATE_PER_MINUTE]
    #[arg(long)]
    register_rate: Option<String>,

    /// Server name reported by /health and initialize [env: GATEWAY_SERVER_NAME]
    #[arg(long)]
    name: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    /// Command-line value for a configuration key, falling back to the
    /// environment. Both go through [`Config::from_lookup`].
    fn lookup(&self, key: &str) -> Option<String> {
        let flag = match key {
            "PORT" => Some(self.port.to_string()),
            "GATEWAY_BASE_URL" => self.base_url.clone(),
            "GATEWAY_SERVER_NAME" => self.name.clone(),
            "GATEWAY_JWT_SECRET" => self.jwt_secret.clone(),
            "GATEWAY_MOUNT_PATH" => self.mount_path.clone(),
            "GATEWAY_REQUIRE_BEARER" => self.no_bearer_auth.then(|| "false".to_string()),
            "GATEWAY_REGISTER_RATE_PER_MINUTE" => self.register_rate.clone(),
            _ => None,
        };
        flag.or_else(|| std::env::var(key).ok())
    }

    fn load_config(&self) -> Result<Config, ConfigError> {
        let config = Config::from_lookup(|key| self.lookup(key))?;
        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        subscriber.with(tracing_subscriber::fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.json_logs);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting MCP OAuth gateway");

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", cli.host, cli.port))?;

    let config = cli.load_config().context("invalid configuration")?;

    let protocol = protocol::router(&config.server_name);
    GatewayServer::new(config).run_http(addr, protocol).await
}
