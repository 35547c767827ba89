//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `LOTWISE_DATABASE_URL` - `PostgreSQL` connection string (falls back to
//!   `DATABASE_URL`)
//! - `RESOLVER_ENDPOINT` - Base URL of the product metadata resolver
//!
//! ## Optional
//! - `LOTWISE_HOST` - Bind address (default: 127.0.0.1)
//! - `LOTWISE_PORT` - Listen port (default: 8080)
//! - `RESOLVER_TIMEOUT_SECS` - Per-call resolver timeout (default: 10)
//! - `RESOLVER_CACHE_TTL_SECS` - Hint cache TTL (default: 300)
//! - `RESOLVER_MAX_RETRIES` - Retries on transient resolver failures (default: 2)
//! - `RESOLVER_TOKEN_<TENANT>` - Bearer token for one tenant; the suffix
//!   (lowercased) is the tenant name. One variable per tenant.
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Sentry error sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Sentry traces sample rate (default: 1.0)

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

/// Env var prefix for per-tenant resolver credentials.
const RESOLVER_TOKEN_PREFIX: &str = "RESOLVER_TOKEN_";
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Server application configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Metadata resolver configuration
    pub resolver: ResolverConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "staging", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate for performance monitoring (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
}

/// Metadata resolver configuration.
///
/// Implements `Debug` manually to redact the per-tenant bearer tokens.
#[derive(Clone)]
pub struct ResolverConfig {
    /// Base URL of the resolver.
    pub endpoint: Url,
    /// Per-call timeout.
    pub timeout: Duration,
    /// TTL for cached hints.
    pub cache_ttl: Duration,
    /// Retries on transient failures.
    pub max_retries: u32,
    /// Tenant name -> bearer token.
    pub tokens: HashMap<String, SecretString>,
}

impl std::fmt::Debug for ResolverConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tenants: Vec<&str> = self.tokens.keys().map(String::as_str).collect();
        tenants.sort_unstable();
        f.debug_struct("ResolverConfig")
            .field("endpoint", &self.endpoint.as_str())
            .field("timeout", &self.timeout)
            .field("cache_ttl", &self.cache_ttl)
            .field("max_retries", &self.max_retries)
            .field("tenants", &tenants)
            .field("tokens", &"[REDACTED]")
            .finish()
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("LOTWISE_DATABASE_URL")?;
        let host = get_env_or_default("LOTWISE_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("LOTWISE_HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("LOTWISE_PORT", "8080")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("LOTWISE_PORT".to_string(), e.to_string()))?;

        let resolver = ResolverConfig::from_env()?;
        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = get_optional_env("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = get_optional_env("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);

        Ok(Self {
            database_url,
            host,
            port,
            resolver,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            sentry_traces_sample_rate,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Returns a reference to the resolver configuration.
    #[must_use]
    pub const fn resolver(&self) -> &ResolverConfig {
        &self.resolver
    }
}

impl ResolverConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let endpoint = get_required_env("RESOLVER_ENDPOINT")?;
        let endpoint = Url::parse(&endpoint).map_err(|e| {
            ConfigError::InvalidEnvVar("RESOLVER_ENDPOINT".to_string(), e.to_string())
        })?;

        let timeout = parse_secs("RESOLVER_TIMEOUT_SECS", "10")?;
        let cache_ttl = parse_secs("RESOLVER_CACHE_TTL_SECS", "300")?;
        let max_retries = get_env_or_default("RESOLVER_MAX_RETRIES", "2")
            .parse::<u32>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("RESOLVER_MAX_RETRIES".to_string(), e.to_string())
            })?;

        Ok(Self {
            endpoint,
            timeout,
            cache_ttl,
            max_retries,
            tokens: parse_tenant_tokens(std::env::vars()),
        })
    }
}

/// Collect `RESOLVER_TOKEN_<TENANT>` variables into a tenant -> token map.
///
/// The suffix is lowercased: `RESOLVER_TOKEN_ACME` configures tenant `acme`.
/// Weak-looking tokens are accepted with a warning, matching how optional
/// credentials behave elsewhere.
fn parse_tenant_tokens(
    vars: impl Iterator<Item = (String, String)>,
) -> HashMap<String, SecretString> {
    let mut tokens = HashMap::new();
    for (key, value) in vars {
        let Some(suffix) = key.strip_prefix(RESOLVER_TOKEN_PREFIX) else {
            continue;
        };
        if suffix.is_empty() || value.is_empty() {
            continue;
        }
        if let Err(e) = validate_secret_strength(&value, &key) {
            tracing::warn!("{key} validation warning: {e}");
        }
        tokens.insert(suffix.to_lowercase(), SecretString::from(value));
    }
    tokens
}

/// Parse a whole-seconds duration env var with a default.
fn parse_secs(key: &str, default: &str) -> Result<Duration, ConfigError> {
    get_env_or_default(key, default)
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL` (used by Fly.io postgres attach).
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    // Try primary key first (e.g., LOTWISE_DATABASE_URL)
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    // Fallback to generic DATABASE_URL (set by Fly.io postgres attach)
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    // Check blocklist
    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    // Check entropy (real secrets like API keys have high entropy)
    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_single_char() {
        // All same character = 0 entropy
        assert!((shannon_entropy("aaaaaaa") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        // "ab" has entropy of 1 bit per char (50% a, 50% b)
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_shannon_entropy_high() {
        // Random-looking string should have high entropy
        let entropy = shannon_entropy("aB3$xY9!mK2@nL5#");
        assert!(entropy > 3.3);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-api-key-here", "TEST_VAR");
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        // High-entropy random string
        let result = validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "TEST_VAR");
        assert!(result.is_ok());
    }

    #[test]
    fn test_parse_tenant_tokens() {
        let vars = vec![
            (
                "RESOLVER_TOKEN_ACME".to_string(),
                "aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6".to_string(),
            ),
            ("RESOLVER_TOKEN_".to_string(), "ignored".to_string()),
            ("UNRELATED_VAR".to_string(), "ignored".to_string()),
        ];

        let tokens = parse_tenant_tokens(vars.into_iter());
        assert_eq!(tokens.len(), 1);
        assert!(tokens.contains_key("acme"));
    }

    #[test]
    fn test_parse_tenant_tokens_accepts_weak_token_with_warning() {
        // Weak tokens warn but are not rejected - matches optional-credential
        // behavior elsewhere.
        let vars = vec![("RESOLVER_TOKEN_DEV".to_string(), "devtoken".to_string())];
        let tokens = parse_tenant_tokens(vars.into_iter());
        assert!(tokens.contains_key("dev"));
    }

    #[test]
    fn test_socket_addr() {
        let config = ServerConfig {
            database_url: SecretString::from("postgres://localhost/test"),
            host: "127.0.0.1".parse().unwrap(),
            port: 8080,
            resolver: ResolverConfig {
                endpoint: Url::parse("https://resolver.example.com").unwrap(),
                timeout: Duration::from_secs(10),
                cache_ttl: Duration::from_secs(300),
                max_retries: 2,
                tokens: HashMap::new(),
            },
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 1.0,
        };

        let addr = config.socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 8080);
    }

    #[test]
    fn test_resolver_config_debug_redacts_tokens() {
        let mut tokens = HashMap::new();
        tokens.insert(
            "acme".to_string(),
            SecretString::from("super_secret_bearer_token"),
        );
        let config = ResolverConfig {
            endpoint: Url::parse("https://resolver.example.com").unwrap(),
            timeout: Duration::from_secs(10),
            cache_ttl: Duration::from_secs(300),
            max_retries: 2,
            tokens,
        };

        let debug_output = format!("{config:?}");

        // Public fields should be visible
        assert!(debug_output.contains("resolver.example.com"));
        assert!(debug_output.contains("acme"));

        // Secret fields should be redacted
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_bearer_token"));
    }
}
