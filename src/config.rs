//! Configuration management with environment variable support.
//!
//! This module provides centralized configuration for the UXRay client, supporting:
//! - Environment variables for all configurable values
//! - Defaults that match the service's local development setup
//! - Builder pattern for programmatic configuration
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `UXRAY_API_BASE_URL` | Analysis service base URL | `http://localhost:3000` |
//! | `UXRAY_ANALYZE_PATH` | Analysis endpoint path | `/analyze` |
//! | `UXRAY_CONNECT_TIMEOUT` | Connection timeout in seconds | `10` |
//! | `UXRAY_DEADLINE` | Whole-run deadline in seconds (unset = none) | unset |
//!
//! # Example
//!
//! ```bash
//! # Point the client at a staging service
//! export UXRAY_API_BASE_URL="https://uxray.staging.internal"
//!
//! # Give up on runs that take longer than five minutes
//! export UXRAY_DEADLINE=300
//! ```

use std::env;
use std::sync::OnceLock;
use std::time::Duration;

// ============================================================================
// Default Values
// ============================================================================

/// Default analysis service base URL
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000";

/// Default analysis endpoint path
pub const DEFAULT_ANALYZE_PATH: &str = "/analyze";

/// Default connection timeout (seconds)
pub const DEFAULT_CONNECT_TIMEOUT: u64 = 10;

/// Content type that selects the streaming branch
pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";

// ============================================================================
// Environment Variable Names
// ============================================================================

/// Environment variable for the service base URL
pub const ENV_API_BASE_URL: &str = "UXRAY_API_BASE_URL";

/// Environment variable for the analysis endpoint path
pub const ENV_ANALYZE_PATH: &str = "UXRAY_ANALYZE_PATH";

/// Environment variable for the connection timeout
pub const ENV_CONNECT_TIMEOUT: &str = "UXRAY_CONNECT_TIMEOUT";

/// Environment variable for the run deadline
pub const ENV_DEADLINE: &str = "UXRAY_DEADLINE";

/// Legacy environment variable shared with the web front end
pub const ENV_API_BASE_URL_LEGACY: &str = "VITE_API_BASE_URL";

// ============================================================================
// Configuration Getters (with caching)
// ============================================================================

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration (initialized from environment on first access)
pub fn get() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Centralized configuration for the client
#[derive(Debug, Clone)]
pub struct Config {
    /// Service connection settings
    pub api: ApiSettings,
}

/// Analysis service settings
#[derive(Debug, Clone)]
pub struct ApiSettings {
    /// Base URL of the analysis service
    pub base_url: String,
    /// Path of the analysis endpoint
    pub analyze_path: String,
    /// Connection timeout (seconds)
    pub connect_timeout: u64,
    /// Whole-run deadline (seconds)
    pub deadline: Option<u64>,
}

impl Config {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            api: ApiSettings::from_env(),
        }
    }

    /// Create configuration with all defaults (ignoring environment)
    pub fn defaults() -> Self {
        Self {
            api: ApiSettings::defaults(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

impl ApiSettings {
    /// Create API settings from environment variables
    pub fn from_env() -> Self {
        Self {
            base_url: env::var(ENV_API_BASE_URL)
                .or_else(|_| env::var(ENV_API_BASE_URL_LEGACY))
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            analyze_path: env::var(ENV_ANALYZE_PATH)
                .unwrap_or_else(|_| DEFAULT_ANALYZE_PATH.to_string()),
            connect_timeout: env::var(ENV_CONNECT_TIMEOUT)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            deadline: env::var(ENV_DEADLINE)
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|secs| *secs > 0),
        }
    }

    /// Create API settings with defaults
    pub fn defaults() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            analyze_path: DEFAULT_ANALYZE_PATH.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            deadline: None,
        }
    }
}

/// Settings for one [`AnalysisSession`](crate::session::AnalysisSession)
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the analysis service
    pub base_url: String,
    /// Path of the analysis endpoint
    pub analyze_path: String,
    /// Timeout for establishing the connection
    pub connect_timeout: Duration,
    /// Optional deadline for a whole run; expiry aborts the transport read
    pub deadline: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let cfg = get();
        Self {
            base_url: cfg.api.base_url.clone(),
            analyze_path: cfg.api.analyze_path.clone(),
            connect_timeout: Duration::from_secs(cfg.api.connect_timeout),
            deadline: cfg.api.deadline.map(Duration::from_secs),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn analyze_path(mut self, path: impl Into<String>) -> Self {
        self.analyze_path = path.into();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Full URL of the analysis endpoint
    pub fn analyze_url(&self) -> String {
        join_url(&self.base_url, &self.analyze_path)
    }
}

/// Join a base URL and a path with exactly one `/` between them
fn join_url(base: &str, path: &str) -> String {
    let base = base.trim().trim_end_matches('/');
    let path = path.trim().trim_start_matches('/');
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, path)
    }
}
