use std::env;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Clone)]
pub struct Config {
    // Challenge binding
    pub chain_id: u64,
    pub domain: String,
    pub login_uri: String,
    pub login_statement: Option<String>,

    // Redis (in-memory stores when unset)
    pub redis_url: Option<String>,

    // Server
    pub bind_addr: SocketAddr,
    pub enforce_host_match: bool,

    // TTLs and limits (in seconds)
    pub nonce_ttl_secs: u64,
    pub max_clock_skew_secs: u64,
    pub session_ttl_secs: u64,
    pub verify_timeout_secs: u64,
    pub cleanup_interval_secs: u64,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("chain_id", &self.chain_id)
            .field("domain", &self.domain)
            .field("login_uri", &self.login_uri)
            .field("login_statement", &self.login_statement)
            .field("redis_url", &self.redis_url.as_ref().map(|_| "[REDACTED]"))
            .field("bind_addr", &self.bind_addr)
            .field("enforce_host_match", &self.enforce_host_match)
            .field("nonce_ttl_secs", &self.nonce_ttl_secs)
            .field("max_clock_skew_secs", &self.max_clock_skew_secs)
            .field("session_ttl_secs", &self.session_ttl_secs)
            .field("verify_timeout_secs", &self.verify_timeout_secs)
            .field("cleanup_interval_secs", &self.cleanup_interval_secs)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Failed to parse {0}: {1}")]
    ParseError(String, String),
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is fine, production sets vars directly
        let _ = dotenvy::dotenv();

        let chain_id_str =
            env::var("CHAIN_ID").map_err(|_| ConfigError::MissingVar("CHAIN_ID".to_string()))?;
        let chain_id = chain_id_str
            .parse::<u64>()
            .map_err(|e| ConfigError::ParseError("CHAIN_ID".to_string(), e.to_string()))?;
        if chain_id == 0 {
            return Err(ConfigError::InvalidValue(
                "CHAIN_ID".to_string(),
                "must be a positive integer".to_string(),
            ));
        }

        let domain =
            env::var("DOMAIN").map_err(|_| ConfigError::MissingVar("DOMAIN".to_string()))?;
        validate_domain(&domain)?;

        let login_uri = env::var("LOGIN_URI").unwrap_or_else(|_| format!("https://{}", domain));
        if login_uri.trim().is_empty() || login_uri.contains('\n') {
            return Err(ConfigError::InvalidValue(
                "LOGIN_URI".to_string(),
                "must be a single non-empty line".to_string(),
            ));
        }

        // An explicitly empty statement disables the statement line
        let login_statement = match env::var("LOGIN_STATEMENT") {
            Ok(s) if s.is_empty() => None,
            Ok(s) => Some(s),
            Err(_) => Some("Sign in with Ethereum.".to_string()),
        };
        if let Some(statement) = &login_statement {
            if statement.contains('\n') {
                return Err(ConfigError::InvalidValue(
                    "LOGIN_STATEMENT".to_string(),
                    "must not contain line breaks".to_string(),
                ));
            }
        }

        let redis_url = env::var("REDIS_URL").ok().filter(|s| !s.is_empty());

        let bind_addr_str = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_addr = bind_addr_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::ParseError("BIND_ADDR".to_string(), e.to_string()))?;
        let enforce_host_match = parse_env_or_default("ENFORCE_HOST_MATCH", true)?;

        let nonce_ttl_secs = parse_env_or_default("NONCE_TTL_SECS", 300)?;
        let max_clock_skew_secs = parse_env_or_default("MAX_CLOCK_SKEW_SECS", 60)?;
        let session_ttl_secs = parse_env_or_default("SESSION_TTL_SECS", 86_400)?;
        let verify_timeout_secs = parse_env_or_default("VERIFY_TIMEOUT_SECS", 10)?;
        let cleanup_interval_secs = parse_env_or_default("CLEANUP_INTERVAL_SECS", 60)?;

        for (key, value) in [
            ("NONCE_TTL_SECS", nonce_ttl_secs),
            ("SESSION_TTL_SECS", session_ttl_secs),
            ("VERIFY_TIMEOUT_SECS", verify_timeout_secs),
            ("CLEANUP_INTERVAL_SECS", cleanup_interval_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue(
                    key.to_string(),
                    "must be greater than zero".to_string(),
                ));
            }
        }

        Ok(Config {
            chain_id,
            domain,
            login_uri,
            login_statement,
            redis_url,
            bind_addr,
            enforce_host_match,
            nonce_ttl_secs,
            max_clock_skew_secs,
            session_ttl_secs,
            verify_timeout_secs,
            cleanup_interval_secs,
        })
    }

    pub fn nonce_ttl(&self) -> Duration {
        Duration::from_secs(self.nonce_ttl_secs)
    }

    pub fn max_clock_skew(&self) -> Duration {
        Duration::from_secs(self.max_clock_skew_secs)
    }

    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.verify_timeout_secs)
    }
}

/// DOMAIN is an authority (host with optional port), never a URL.
fn validate_domain(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidValue(
            "DOMAIN".to_string(),
            "cannot be empty".to_string(),
        ));
    }
    if domain.contains("://") || domain.contains('/') {
        return Err(ConfigError::InvalidValue(
            "DOMAIN".to_string(),
            "must be a host (and optional port), not a URL".to_string(),
        ));
    }
    if domain.chars().any(char::is_whitespace) {
        return Err(ConfigError::InvalidValue(
            "DOMAIN".to_string(),
            "must not contain whitespace".to_string(),
        ));
    }
    Ok(())
}

/// Helper function to parse environment variable with a default value
fn parse_env_or_default<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| ConfigError::ParseError(key.to_string(), format!("{}: {}", e, val))),
        Err(_) => Ok(default),
    }
}
