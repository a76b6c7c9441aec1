//! Application configuration with layered loading.
//!
//! Sources, highest precedence first:
//!
//! 1. Environment variables (SIFT_*)
//! 2. TOML config file (if SIFT_CONFIG_FILE set)
//! 3. Built-in defaults

use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of the remote collection.
    ///
    /// Set via SIFT_ENDPOINT environment variable.
    /// Required only when an HTTP transport is built from this config.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// API key sent with every page request.
    ///
    /// Set via SIFT_API_KEY environment variable.
    #[serde(default)]
    pub api_key: Option<String>,

    /// User-Agent string for HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Number of items the remote returns per page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Concurrent page fetches used by `load_all_pages`.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Buffer size of the session notification channels.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Lifetime of raw pages held by the transport cache, in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: i64,

    /// Minimum spacing between two HTTP requests, in milliseconds.
    #[serde(default)]
    pub min_request_interval_ms: u64,
}

fn default_user_agent() -> String {
    "sift/0.1".into()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_page_size() -> usize {
    20
}

fn default_max_parallel() -> usize {
    5
}

fn default_event_capacity() -> usize {
    64
}

fn default_cache_ttl_secs() -> i64 {
    300
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            page_size: default_page_size(),
            max_parallel: default_max_parallel(),
            event_capacity: default_event_capacity(),
            cache_ttl_secs: default_cache_ttl_secs(),
            min_request_interval_ms: 0,
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Minimum request interval as Duration.
    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("SIFT_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("SIFT_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Endpoint, required once an HTTP transport is built.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if the endpoint is not set.
    pub fn require_endpoint(&self) -> Result<&str, ConfigError> {
        self.endpoint.as_deref().ok_or_else(|| ConfigError::Missing {
            field: "endpoint".into(),
            hint: "Set SIFT_ENDPOINT environment variable".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.endpoint.is_none());
        assert!(config.api_key.is_none());
        assert_eq!(config.user_agent, "sift/0.1");
        assert_eq!(config.timeout_ms, 10_000);
        assert_eq!(config.page_size, 20);
        assert_eq!(config.max_parallel, 5);
        assert_eq!(config.event_capacity, 64);
        assert_eq!(config.cache_ttl_secs, 300);
        assert_eq!(config.min_request_interval(), Duration::ZERO);
    }

    #[test]
    fn test_timeout_duration() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(10_000));
    }

    #[test]
    fn test_require_endpoint() {
        let config = AppConfig::default();
        assert!(matches!(config.require_endpoint(), Err(ConfigError::Missing { .. })));

        let config = AppConfig { endpoint: Some("https://api.example.com/items".into()), ..Default::default() };
        assert_eq!(config.require_endpoint().unwrap(), "https://api.example.com/items");
    }

    #[test]
    fn test_load_layers_env_over_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("sift.toml", "page_size = 50\nmax_parallel = 3\nuser_agent = \"from-file\"")?;
            jail.set_env("SIFT_CONFIG_FILE", "sift.toml");
            jail.set_env("SIFT_PAGE_SIZE", "25");
            jail.set_env("SIFT_ENDPOINT", "https://api.example.com/items");

            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.page_size, 25);
            assert_eq!(config.max_parallel, 3);
            assert_eq!(config.user_agent, "from-file");
            assert_eq!(config.endpoint.as_deref(), Some("https://api.example.com/items"));
            Ok(())
        });
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("SIFT_PAGE_SIZE", "0");
            assert!(matches!(AppConfig::load(), Err(ConfigError::Invalid { field, .. }) if field == "page_size"));
            Ok(())
        });
    }
}
