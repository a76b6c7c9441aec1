//! Unified error types for sift.

use crate::config::ConfigError;

/// Boxed error used at the transport and decoder seams.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Unified error types for the sift core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unknown parameter name or invalid argument. A programmer error.
    #[error("CONFIGURATION_ERROR: {0}")]
    Configuration(String),

    /// A snapshot was used to refine something it does not refine.
    #[error("REFINEMENT_VIOLATION: [{candidate}] is not a refinement of [{target}]")]
    RefinementViolation { target: String, candidate: String },

    /// Raw page is missing its items, page id or last-page flag.
    #[error("DECODE_PAYLOAD_ERROR: {0}")]
    DecodePayload(String),

    /// The item decoder rejected a raw item.
    #[error("DECODE_PAYLOAD_ERROR: item decode failed: {0}")]
    ItemDecode(#[source] BoxError),

    /// Error returned by the transport, kept as-is.
    #[error("TRANSPORT_ERROR: {0}")]
    Transport(#[source] BoxError),

    /// The session was disposed.
    #[error("SESSION_DISPOSED")]
    Disposed,

    /// Configuration failed to load or validate.
    #[error("CONFIG_ERROR: {0}")]
    Config(#[from] ConfigError),
}

impl Error {
    pub(crate) fn unknown_param(name: &str) -> Self {
        Error::Configuration(format!("unknown parameter: {name}"))
    }

    /// Whether retrying the same load call may succeed.
    ///
    /// Only transport failures qualify; everything else is deterministic.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let err = Error::unknown_param("colour");
        assert!(err.to_string().contains("CONFIGURATION_ERROR"));
        assert!(err.to_string().contains("colour"));
    }

    #[test]
    fn test_transport_source_preserved() {
        let inner: BoxError = "connection reset".into();
        let err = Error::Transport(inner);
        assert_eq!(err.source().map(|s| s.to_string()).as_deref(), Some("connection reset"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_refinement_violation_display() {
        let err = Error::RefinementViolation { target: "a=abc".into(), candidate: "a=x".into() };
        assert_eq!(err.to_string(), "REFINEMENT_VIOLATION: [a=x] is not a refinement of [a=abc]");
        assert!(!err.is_retryable());
    }
}
