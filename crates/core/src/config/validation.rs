//! Configuration validation rules.
//!
//! Checks `AppConfig` values after they have been loaded from environment,
//! files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Longest accepted cache lifetime: one year.
const MAX_CACHE_TTL_SECS: i64 = 365 * 24 * 60 * 60;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `page_size` is 0 or exceeds 1000
    /// - `max_parallel` is 0 or exceeds 64
    /// - `event_capacity` is 0
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `cache_ttl_secs` is negative or exceeds one year
    /// - `user_agent` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::Invalid { field: "page_size".into(), reason: "must be greater than 0".into() });
        }
        if self.page_size > 1000 {
            return Err(ConfigError::Invalid { field: "page_size".into(), reason: "must not exceed 1000".into() });
        }

        if self.max_parallel == 0 || self.max_parallel > 64 {
            return Err(ConfigError::Invalid { field: "max_parallel".into(), reason: "must be between 1 and 64".into() });
        }

        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "event_capacity".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.cache_ttl_secs < 0 {
            return Err(ConfigError::Invalid { field: "cache_ttl_secs".into(), reason: "must not be negative".into() });
        }
        if self.cache_ttl_secs > MAX_CACHE_TTL_SECS {
            return Err(ConfigError::Invalid {
                field: "cache_ttl_secs".into(),
                reason: format!("must not exceed one year ({MAX_CACHE_TTL_SECS}s)"),
            });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        if self.api_key.is_some() && self.endpoint.is_none() {
            tracing::warn!("api_key is set but endpoint is not; the key will be unused until an endpoint is configured");
        }

        Ok(())
    }
}
