use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the portal service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub portal: PortalConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let admin_tokens = match env::var("PORTAL_ADMIN_TOKENS") {
            Ok(raw) => parse_admin_tokens(&raw)?,
            Err(_) => BTreeMap::new(),
        };
        let feed_capacity = parse_positive("PORTAL_FEED_CAPACITY", DEFAULT_FEED_CAPACITY)?;
        let recent_limit = parse_positive("PORTAL_RECENT_LIMIT", DEFAULT_RECENT_LIMIT)?;
        let max_upload_bytes =
            parse_positive("PORTAL_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?;
        let proof_bucket =
            env::var("PORTAL_PROOF_BUCKET").unwrap_or_else(|_| DEFAULT_PROOF_BUCKET.to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            portal: PortalConfig {
                admin_tokens,
                feed_capacity,
                recent_limit,
                proof_bucket,
                max_upload_bytes,
            },
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

pub const DEFAULT_FEED_CAPACITY: usize = 64;
pub const DEFAULT_RECENT_LIMIT: usize = 3;
pub const DEFAULT_PROOF_BUCKET: &str = "payment-proofs";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// Portal-specific knobs: admin sessions, change feed sizing and upload limits.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    /// Bearer token to principal id; every listed principal holds the admin capability.
    pub admin_tokens: BTreeMap<String, String>,
    pub feed_capacity: usize,
    /// Row limit used by "recent listings" widgets.
    pub recent_limit: usize,
    pub proof_bucket: String,
    pub max_upload_bytes: usize,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            admin_tokens: BTreeMap::new(),
            feed_capacity: DEFAULT_FEED_CAPACITY,
            recent_limit: DEFAULT_RECENT_LIMIT,
            proof_bucket: DEFAULT_PROOF_BUCKET.to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

fn parse_admin_tokens(raw: &str) -> Result<BTreeMap<String, String>, ConfigError> {
    let mut tokens = BTreeMap::new();
    for pair in raw.split(',').map(str::trim).filter(|pair| !pair.is_empty()) {
        let (token, principal) = pair
            .split_once('=')
            .ok_or_else(|| ConfigError::InvalidAdminToken(pair.to_string()))?;
        let (token, principal) = (token.trim(), principal.trim());
        if token.is_empty() || principal.is_empty() {
            return Err(ConfigError::InvalidAdminToken(pair.to_string()));
        }
        tokens.insert(token.to_string(), principal.to_string());
    }
    Ok(tokens)
}

fn parse_positive(key: &'static str, default: usize) -> Result<usize, ConfigError> {
    match env::var(key) {
        Ok(raw) => match raw.trim().parse::<usize>() {
            Ok(value) if value > 0 => Ok(value),
            _ => Err(ConfigError::InvalidNumber { key }),
        },
        Err(_) => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str },
    InvalidAdminToken(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key } => {
                write!(f, "{key} must be a positive integer")
            }
            ConfigError::InvalidAdminToken(pair) => write!(
                f,
                "PORTAL_ADMIN_TOKENS entry '{pair}' must look like token=principal-id"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::InvalidAdminToken(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "PORTAL_ADMIN_TOKENS",
            "PORTAL_FEED_CAPACITY",
            "PORTAL_RECENT_LIMIT",
            "PORTAL_PROOF_BUCKET",
            "PORTAL_MAX_UPLOAD_BYTES",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert!(config.portal.admin_tokens.is_empty());
        assert_eq!(config.portal.feed_capacity, DEFAULT_FEED_CAPACITY);
        assert_eq!(config.portal.recent_limit, 3);
        assert_eq!(config.portal.proof_bucket, "payment-proofs");
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn parses_admin_token_pairs() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("PORTAL_ADMIN_TOKENS", "alpha=admin-1, beta = admin-2");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(
            config.portal.admin_tokens.get("alpha").map(String::as_str),
            Some("admin-1")
        );
        assert_eq!(
            config.portal.admin_tokens.get("beta").map(String::as_str),
            Some("admin-2")
        );
        reset_env();
    }

    #[test]
    fn rejects_malformed_admin_tokens_and_zero_capacity() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("PORTAL_ADMIN_TOKENS", "missing-separator");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidAdminToken(_))
        ));

        reset_env();
        env::set_var("PORTAL_FEED_CAPACITY", "0");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidNumber {
                key: "PORTAL_FEED_CAPACITY"
            })
        ));
        reset_env();
    }
}
