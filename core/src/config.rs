//! Client configuration.
//!
//! Values come from the environment (`BACKOFFICE_API_URL`,
//! `BACKOFFICE_API_TIMEOUT_MS`) with local-development defaults.

use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000/api";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

pub const ENV_BASE_URL: &str = "BACKOFFICE_API_URL";
pub const ENV_TIMEOUT_MS: &str = "BACKOFFICE_API_TIMEOUT_MS";

/// Transport configuration shared by every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Root for all request paths, without a trailing slash.
    pub base_url: String,
    /// Client-side deadline for one round-trip.
    pub timeout_ms: u64,
    /// Keep cookies set by the server and send them back.
    pub with_credentials: bool,
    /// Headers attached to every request unless overridden per call.
    pub default_headers: Vec<(String, String)>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            with_credentials: true,
            default_headers: vec![("content-type".to_string(), "application/json".to_string())],
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Self {
        Self::default().with_base_url(base_url)
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Missing, empty, or
    /// unparsable values keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            config = config.with_base_url(url.trim());
        }
        if let Some(timeout) = lookup(ENV_TIMEOUT_MS).and_then(|v| v.trim().parse::<u64>().ok()) {
            config.timeout_ms = timeout;
        }
        config
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_credentials(mut self, enabled: bool) -> Self {
        self.with_credentials = enabled;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Join `path` onto the base URL with exactly one slash between them.
    pub fn url_for(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            return self.base_url.clone();
        }
        format!("{}/{}", self.base_url, path)
    }
}
