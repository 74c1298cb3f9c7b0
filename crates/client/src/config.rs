//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Optional
//! - `STAXTRADE_API_URL` - Base URL of the API (default: `http://localhost:8000/api/`).
//!   Falls back to `REACT_APP_API_URL` so an existing frontend `.env` can be reused.
//! - `STAXTRADE_STATE_DIR` - Directory holding the persisted client state
//!   (default: `<local data dir>/staxtrade`)
//! - `STAXTRADE_POLL_INTERVAL_SECS` - Dashboard refresh interval (default: 10)
//! - `STAXTRADE_HTTP_TIMEOUT_SECS` - Per-request timeout (default: 30)
//! - `STAXTRADE_CACHE_TTL_SECS` - Brand and catalog cache lifetime (default: 300)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

const DEFAULT_API_URL: &str = "http://localhost:8000/api/";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const STATE_DIR_NAME: &str = "staxtrade";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// StaxTrade client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL every endpoint path is joined onto. Always ends with `/`.
    pub api_url: Url,
    /// Directory for the persisted key/value file
    pub state_dir: PathBuf,
    /// Interval between timer-driven dashboard refreshes
    pub poll_interval: Duration,
    /// Timeout applied to each HTTP request
    pub http_timeout: Duration,
    /// Lifetime of cached brand and catalog responses
    pub cache_ttl: Duration,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

impl ClientConfig {
    /// Configuration with defaults for everything except the API URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if `api_url` is not an absolute URL.
    pub fn new(api_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            api_url: parse_base_url("STAXTRADE_API_URL", api_url)?,
            state_dir: default_state_dir(),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            sentry_dsn: None,
        })
    }

    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_url = lookup("STAXTRADE_API_URL")
            .or_else(|| lookup("REACT_APP_API_URL"))
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let mut config = Self::new(&api_url)?;

        if let Some(dir) = lookup("STAXTRADE_STATE_DIR") {
            config.state_dir = PathBuf::from(dir);
        }
        config.poll_interval = parse_secs(
            "STAXTRADE_POLL_INTERVAL_SECS",
            lookup("STAXTRADE_POLL_INTERVAL_SECS"),
            DEFAULT_POLL_INTERVAL_SECS,
        )?;
        config.http_timeout = parse_secs(
            "STAXTRADE_HTTP_TIMEOUT_SECS",
            lookup("STAXTRADE_HTTP_TIMEOUT_SECS"),
            DEFAULT_HTTP_TIMEOUT_SECS,
        )?;
        config.cache_ttl = parse_secs(
            "STAXTRADE_CACHE_TTL_SECS",
            lookup("STAXTRADE_CACHE_TTL_SECS"),
            DEFAULT_CACHE_TTL_SECS,
        )?;
        config.sentry_dsn = lookup("SENTRY_DSN").filter(|dsn| !dsn.is_empty());

        Ok(config)
    }

    /// Path of the persisted key/value file.
    #[must_use]
    pub fn state_file(&self) -> PathBuf {
        self.state_dir.join("state.json")
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Parse a base URL, forcing a trailing slash so relative joins keep the path.
fn parse_base_url(key: &str, raw: &str) -> Result<Url, ConfigError> {
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    let url = Url::parse(&with_slash)
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must be an absolute http(s) URL".to_string(),
        ));
    }
    Ok(url)
}

/// Parse a positive number of seconds, falling back to `default` when unset.
fn parse_secs(key: &str, value: Option<String>, default: u64) -> Result<Duration, ConfigError> {
    let Some(value) = value else {
        return Ok(Duration::from_secs(default));
    };
    let secs = value
        .trim()
        .parse::<u64>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if secs == 0 {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must be greater than zero".to_string(),
        ));
    }
    Ok(Duration::from_secs(secs))
}

fn default_state_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(STATE_DIR_NAME)
}
