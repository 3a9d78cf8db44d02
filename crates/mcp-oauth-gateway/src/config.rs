//! Configuration for the OAuth gateway.

use std::time::Duration;

use url::Url;

use crate::error::ConfigError;

/// Default values.
pub mod defaults {
    use std::time::Duration;

    /// HTTP listen port.
    pub const PORT: u16 = 8300;

    /// Bind address.
    pub const HOST: &str = "0.0.0.0";

    /// Server name reported by `/health` and `initialize`.
    pub const SERVER_NAME: &str = "mcp-oauth-gateway";

    /// Authorization code lifetime (10 minutes).
    pub const AUTH_CODE_TTL: Duration = Duration::from_secs(600);

    /// Access token lifetime (1 hour).
    pub const ACCESS_TOKEN_TTL: Duration = Duration::from_secs(3600);

    /// Expired-record sweep interval (5 minutes).
    pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

    /// Scope given to clients that register without one.
    pub const CLIENT_SCOPE: &str = "read";

    /// Scopes advertised by the authorization server.
    pub const SCOPES_SUPPORTED: &[&str] = &["read", "write", "admin"];

    /// Scopes advertised by the protected resource.
    pub const RESOURCE_SCOPES: &[&str] = &["read", "write"];

    /// Minimum HS256 secret length in bytes.
    pub const MIN_SECRET_LEN: usize = 32;
}

/// Gateway configuration.
#[derive(Clone)]
pub struct Config {
    /// Name reported by `/health`.
    pub server_name: String,

    /// Public base URL (the tunnel URL). Used as issuer and resource identifier.
    pub base_url: String,

    /// HS256 signing secret for access tokens.
    pub signing_secret: String,

    /// Private path segment the protocol handler is mounted under.
    pub mount_path: String,

    /// Require a valid bearer token on the mounted path.
    pub require_bearer: bool,

    /// Authorization code lifetime.
    pub auth_code_ttl: Duration,

    /// Access token lifetime.
    pub access_token_ttl: Duration,

    /// Background sweep interval. `None` disables the sweep.
    pub cleanup_interval: Option<Duration>,

    /// Maximum `/register` calls per minute. `None` disables the throttle.
    pub register_rate_per_minute: Option<u32>,

    /// Scope given to clients that register without one.
    pub default_client_scope: String,

    /// Scopes advertised in the authorization server metadata.
    pub scopes_supported: Vec<String>,

    /// Scopes advertised in the protected resource metadata.
    pub resource_scopes: Vec<String>,
}

impl Config {
    /// Create a configuration for the given public base URL.
    ///
    /// A fresh signing secret and mount path are generated, so tokens and the
    /// private path only live as long as the process.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            server_name: defaults::SERVER_NAME.to_string(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            signing_secret: generate_secret(),
            mount_path: generate_mount_path(),
            require_bearer: true,
            auth_code_ttl: defaults::AUTH_CODE_TTL,
            access_token_ttl: defaults::ACCESS_TOKEN_TTL,
            cleanup_interval: Some(defaults::CLEANUP_INTERVAL),
            register_rate_per_minute: None,
            default_client_scope: defaults::CLIENT_SCOPE.to_string(),
            scopes_supported: defaults::SCOPES_SUPPORTED.iter().map(|s| (*s).to_string()).collect(),
            resource_scopes: defaults::RESOURCE_SCOPES.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Create a deterministic test configuration.
    ///
    /// Fixed secret and mount path, no background sweep.
    #[must_use]
    pub fn for_testing(base_url: &str) -> Self {
        Self {
            signing_secret: "test-signing-secret-0123456789abcdef".to_string(),
            mount_path: "0123456789abcdef0123456789abcdef".to_string(),
            cleanup_interval: None,
            ..Self::new(base_url)
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns error if a variable cannot be parsed or the resulting
    /// configuration fails [`Config::validate`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from a key lookup.
    ///
    /// Keys: `PORT` (only for the default base URL), `GATEWAY_BASE_URL`,
    /// `GATEWAY_SERVER_NAME`, `GATEWAY_JWT_SECRET`, `GATEWAY_MOUNT_PATH`,
    /// `GATEWAY_REQUIRE_BEARER` and `GATEWAY_REGISTER_RATE_PER_MINUTE`.
    /// Empty values count as unset. The result is not validated.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] for a value that does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = get("PORT").map_or(Ok(defaults::PORT), |v| parse_number("PORT", &v))?;
        let base_url = get("GATEWAY_BASE_URL").unwrap_or_else(|| format!("http://localhost:{port}"));
        let mut config = Self::new(base_url);

        if let Some(name) = get("GATEWAY_SERVER_NAME") {
            config.server_name = name;
        }
        if let Some(secret) = get("GATEWAY_JWT_SECRET") {
            config.signing_secret = secret;
        }
        if let Some(path) = get("GATEWAY_MOUNT_PATH") {
            config.mount_path = path.trim_matches('/').to_string();
        }
        if let Some(flag) = get("GATEWAY_REQUIRE_BEARER") {
            config.require_bearer = parse_flag("GATEWAY_REQUIRE_BEARER", &flag)?;
        }
        if let Some(rate) = get("GATEWAY_REGISTER_RATE_PER_MINUTE") {
            config.register_rate_per_minute = Some(parse_number("GATEWAY_REGISTER_RATE_PER_MINUTE", &rate)?);
        }

        Ok(config)
    }

    /// Check the configuration for startup errors.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.signing_secret.len() < defaults::MIN_SECRET_LEN {
            return Err(ConfigError::WeakSecret {
                min: defaults::MIN_SECRET_LEN,
                actual: self.signing_secret.len(),
            });
        }

        match Url::parse(&self.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => {}
            Ok(url) => {
                return Err(ConfigError::InvalidBaseUrl {
                    url: self.base_url.clone(),
                    reason: format!("unsupported scheme '{}'", url.scheme()),
                });
            }
            Err(e) => {
                return Err(ConfigError::InvalidBaseUrl {
                    url: self.base_url.clone(),
                    reason: e.to_string(),
                });
            }
        }

        let path_ok = !self.mount_path.is_empty()
            && self.mount_path.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            && !RESERVED_PATHS.iter().any(|r| r.eq_ignore_ascii_case(&self.mount_path));
        if !path_ok {
            return Err(ConfigError::InvalidMountPath(self.mount_path.clone()));
        }

        if self.auth_code_ttl.is_zero() {
            return Err(ConfigError::ZeroDuration("auth_code_ttl"));
        }
        if self.access_token_ttl.is_zero() {
            return Err(ConfigError::ZeroDuration("access_token_ttl"));
        }
        if self.cleanup_interval.is_some_and(|d| d.is_zero()) {
            return Err(ConfigError::ZeroDuration("cleanup_interval"));
        }
        if self.register_rate_per_minute == Some(0) {
            return Err(ConfigError::ZeroDuration("register_rate_per_minute"));
        }

        Ok(())
    }

    /// URL path the protocol handler is mounted under, e.g. `/3f2a...`.
    #[must_use]
    pub fn mount_route(&self) -> String {
        format!("/{}", self.mount_path)
    }

    /// Public URL of the mounted protocol endpoint.
    #[must_use]
    pub fn protocol_url(&self) -> String {
        format!("{}/{}", self.base_url, self.mount_path)
    }

    /// Public URL of an endpoint relative to the base URL.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("server_name", &self.server_name)
            .field("base_url", &self.base_url)
            .field("require_bearer", &self.require_bearer)
            .field("auth_code_ttl", &self.auth_code_ttl)
            .field("access_token_ttl", &self.access_token_ttl)
            .field("cleanup_interval", &self.cleanup_interval)
            .field("register_rate_per_minute", &self.register_rate_per_minute)
            .finish()
    }
}

/// First path segments owned by the gateway itself.
const RESERVED_PATHS: &[&str] = &["register", "authorize", "token", "introspect", "revoke", "health"];

fn parse_flag(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnv { var, value: value.to_string() }),
    }
}

fn parse_number<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv { var, value: value.to_string() })
}

/// Random 256-bit secret, hex encoded.
fn generate_secret() -> String {
    format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple())
}

/// Random 32-hex-character path segment.
fn generate_mount_path() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
