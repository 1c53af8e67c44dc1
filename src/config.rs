//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;

/// Minimum JWT secret length accepted in production
const MIN_PRODUCTION_SECRET_LEN: usize = 32;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// HMAC secret for access tokens
    pub jwt_secret: String,

    /// `iss` claim written into and required from access tokens
    pub jwt_issuer: String,

    /// `aud` claim written into and required from access tokens
    pub jwt_audience: String,

    /// Access token lifetime in seconds
    pub access_token_ttl_secs: i64,

    /// Refresh token lifetime in days
    pub refresh_token_ttl_days: i64,

    /// Rate limit: requests per minute per client
    pub rate_limit_per_minute: i32,

    /// Allowed CORS origins (empty = any origin, development only)
    pub cors_allowed_origins: Vec<String>,

    /// Number of un-snapshotted transactions that triggers a balance snapshot
    pub snapshot_threshold: i64,

    /// Apply embedded migrations on startup
    pub run_migrations: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_max_connections = parse_or("DATABASE_MAX_CONNECTIONS", 10)?;

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = parse_or("PORT", 4000)?;

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let jwt_secret =
            env::var("JWT_SECRET").map_err(|_| ConfigError::MissingEnv("JWT_SECRET"))?;
        if environment == "production" && jwt_secret.len() < MIN_PRODUCTION_SECRET_LEN {
            return Err(ConfigError::InvalidValue("JWT_SECRET"));
        }

        let jwt_issuer =
            env::var("JWT_ISSUER").unwrap_or_else(|_| "urn:jambo:issuer".to_string());
        let jwt_audience =
            env::var("JWT_AUDIENCE").unwrap_or_else(|_| "urn:jambo:audience".to_string());

        let access_token_ttl_secs = parse_or("ACCESS_TOKEN_TTL_SECS", 900)?;
        let refresh_token_ttl_days = parse_or("REFRESH_TOKEN_TTL_DAYS", 7)?;
        let rate_limit_per_minute = parse_or("RATE_LIMIT_PER_MINUTE", 100)?;
        let snapshot_threshold = parse_or("SNAPSHOT_THRESHOLD", 50)?;
        let run_migrations = parse_or("RUN_MIGRATIONS", false)?;

        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .map(|raw| parse_origins(&raw))
            .unwrap_or_default();

        Ok(Self {
            database_url,
            database_max_connections,
            host,
            port,
            environment,
            jwt_secret,
            jwt_issuer,
            jwt_audience,
            access_token_ttl_secs,
            refresh_token_ttl_days,
            rate_limit_per_minute,
            cors_allowed_origins,
            snapshot_threshold,
            run_migrations,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Configuration suitable for tests: no database URL lookups, fixed secret.
    pub fn for_tests(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            database_max_connections: 5,
            host: "127.0.0.1".to_string(),
            port: 0,
            environment: "test".to_string(),
            jwt_secret: "test-secret-test-secret-test-secret".to_string(),
            jwt_issuer: "urn:jambo:issuer".to_string(),
            jwt_audience: "urn:jambo:audience".to_string(),
            access_token_ttl_secs: 900,
            refresh_token_ttl_days: 7,
            rate_limit_per_minute: 1000,
            cors_allowed_origins: Vec::new(),
            snapshot_threshold: 3,
            run_migrations: false,
        }
    }
}

/// Read `name` and parse it, falling back to `default` when unset
fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue(name)),
        Err(_) => Ok(default),
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.trim_end_matches('/').to_string())
        .collect()
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_origins() {
        let origins = parse_origins("http://localhost:3001/, https://app.example.com ,,");
        assert_eq!(
            origins,
            vec!["http://localhost:3001".to_string(), "https://app.example.com".to_string()]
        );
    }

    #[test]
    fn test_parse_or_default_when_unset() {
        let value: i64 = parse_or("JAMBO_TEST_SURELY_UNSET_VARIABLE", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_for_tests_is_not_production() {
        let config = Config::for_tests("postgres://localhost/test");
        assert!(!config.is_production());
        assert!(config.jwt_secret.len() >= MIN_PRODUCTION_SECRET_LEN);
    }
}
