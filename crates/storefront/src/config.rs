//! Storefront client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `REBOUL_API_BASE_URL` - Base URL of the remote storefront API
//!
//! ## Optional
//! - `REBOUL_STATE_PATH` - File holding the persisted session and cart
//!   (default: `.reboul/state.json`)
//! - `REBOUL_HTTP_TIMEOUT_SECS` - Timeout for API requests (default: 10)
//! - `REBOUL_NOTIFICATION_CAPACITY` - Buffered notifications per subscriber
//!   (default: 64)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Sentry error sample rate (default: 1.0)

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

const DEFAULT_STATE_PATH: &str = ".reboul/state.json";
const DEFAULT_TIMEOUT_SECS: &str = "10";
const DEFAULT_NOTIFICATION_CAPACITY: &str = "64";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront client configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// Remote API configuration
    pub api: ApiConfig,
    /// Where the session and cart are persisted
    pub state_path: PathBuf,
    /// Buffered notifications per subscriber before the oldest are dropped
    pub notification_capacity: usize,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate
    pub sentry_sample_rate: f32,
}

/// Remote API configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL; endpoint paths are appended to it
    pub base_url: Url,
    /// Per-request timeout
    pub timeout: Duration,
}

impl StorefrontConfig {
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

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let vars = Vars { lookup: &lookup };

        let base_url = parse_base_url(&vars.required("REBOUL_API_BASE_URL")?)
            .map_err(|e| ConfigError::InvalidEnvVar("REBOUL_API_BASE_URL".to_string(), e))?;
        let timeout_secs = vars
            .or_default("REBOUL_HTTP_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)
            .parse::<u64>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("REBOUL_HTTP_TIMEOUT_SECS".to_string(), e.to_string())
            })?;
        let notification_capacity = vars
            .or_default("REBOUL_NOTIFICATION_CAPACITY", DEFAULT_NOTIFICATION_CAPACITY)
            .parse::<usize>()
            .ok()
            .filter(|&n| n > 0)
            .ok_or_else(|| {
                ConfigError::InvalidEnvVar(
                    "REBOUL_NOTIFICATION_CAPACITY".to_string(),
                    "must be a positive integer".to_string(),
                )
            })?;
        let sentry_sample_rate = vars
            .or_default("SENTRY_SAMPLE_RATE", "1.0")
            .parse::<f32>()
            .ok()
            .filter(|rate| (0.0..=1.0).contains(rate))
            .ok_or_else(|| {
                ConfigError::InvalidEnvVar(
                    "SENTRY_SAMPLE_RATE".to_string(),
                    "must be between 0.0 and 1.0".to_string(),
                )
            })?;

        Ok(Self {
            api: ApiConfig {
                base_url,
                timeout: Duration::from_secs(timeout_secs),
            },
            state_path: PathBuf::from(vars.or_default("REBOUL_STATE_PATH", DEFAULT_STATE_PATH)),
            notification_capacity,
            sentry_dsn: vars.optional("SENTRY_DSN"),
            sentry_environment: vars.optional("SENTRY_ENVIRONMENT"),
            sentry_sample_rate,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

struct Vars<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl Vars<'_> {
    /// Get a required variable.
    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    /// Get an optional variable. Blank values count as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|value| !value.trim().is_empty())
    }

    /// Get a variable with a default value.
    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }
}

/// Parse and validate the API base URL.
fn parse_base_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw.trim()).map_err(|e| e.to_string())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme '{}'", url.scheme()));
    }
    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err("must be an absolute http(s) URL with a host".to_string());
    }
    Ok(url)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config =
            StorefrontConfig::from_lookup(lookup(&[("REBOUL_API_BASE_URL", "https://api.reboul.test/v1/")]))
                .unwrap();
        assert_eq!(config.api.base_url.as_str(), "https://api.reboul.test/v1/");
        assert_eq!(config.api.timeout, Duration::from_secs(10));
        assert_eq!(config.state_path, PathBuf::from(".reboul/state.json"));
        assert_eq!(config.notification_capacity, 64);
        assert!(config.sentry_dsn.is_none());
        assert!((config.sentry_sample_rate - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_missing_base_url() {
        let err = StorefrontConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref key) if key == "REBOUL_API_BASE_URL"));
    }

    #[test]
    fn test_blank_counts_as_missing() {
        let err = StorefrontConfig::from_lookup(lookup(&[("REBOUL_API_BASE_URL", "  ")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(_)));
    }

    #[test]
    fn test_rejects_non_http_scheme() {
        let err =
            StorefrontConfig::from_lookup(lookup(&[("REBOUL_API_BASE_URL", "ftp://api.reboul.test")]))
                .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(_, _)));
    }

    #[test]
    fn test_invalid_timeout() {
        let err = StorefrontConfig::from_lookup(lookup(&[
            ("REBOUL_API_BASE_URL", "http://localhost:4000"),
            ("REBOUL_HTTP_TIMEOUT_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(ref key, _) if key == "REBOUL_HTTP_TIMEOUT_SECS"));
    }

    #[test]
    fn test_zero_notification_capacity_rejected() {
        let err = StorefrontConfig::from_lookup(lookup(&[
            ("REBOUL_API_BASE_URL", "http://localhost:4000"),
            ("REBOUL_NOTIFICATION_CAPACITY", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(_, _)));
    }

    #[test]
    fn test_overrides() {
        let config = StorefrontConfig::from_lookup(lookup(&[
            ("REBOUL_API_BASE_URL", "http://localhost:4000"),
            ("REBOUL_STATE_PATH", "/tmp/reboul.json"),
            ("REBOUL_HTTP_TIMEOUT_SECS", "3"),
            ("SENTRY_DSN", "https://key@sentry.example/1"),
            ("SENTRY_SAMPLE_RATE", "0.25"),
        ]))
        .unwrap();
        assert_eq!(config.state_path, PathBuf::from("/tmp/reboul.json"));
        assert_eq!(config.api.timeout, Duration::from_secs(3));
        assert_eq!(
            config.sentry_dsn.as_deref(),
            Some("https://key@sentry.example/1")
        );
        assert!((config.sentry_sample_rate - 0.25).abs() < f32::EPSILON);
    }
}
