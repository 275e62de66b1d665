//! Error types for the plugin runtime
//!
//! This module defines all error types used throughout the IO server,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for plugin runtime operations.
///
/// Variants map onto the error taxonomy of the IO server: decode errors,
/// dispatch errors, validation errors, handler errors, backwards-invocation
/// errors, timeouts, and transport errors, plus the ambient config/io/serde
/// conversions every crate needs.
#[derive(Error, Debug)]
pub enum PluginRuntimeError {
    /// Configuration error (missing/invalid option, failed validation)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed inbound record; the raw line is retained for diagnostics
    #[error("Decode error: {0}")]
    Decode(String),

    /// No dispatcher route matched the incoming envelope
    #[error("Dispatch error: {message}")]
    Dispatch {
        /// Human-readable description
        message: String,
    },

    /// The handler's declared input type could not be constructed from `data`
    #[error("Validation error: {message}")]
    Validation {
        /// Human-readable description
        message: String,
    },

    /// An exception/error surfaced by user handler code
    #[error("Handler error ({error_type}): {message}")]
    Handler {
        /// Declared error type/category from the handler's contract
        error_type: String,
        /// Error message
        message: String,
        /// Optional extra context (e.g. a `description` field for invoke errors)
        args: Option<serde_json::Value>,
    },

    /// A `backwards_response` envelope carried `event: error`
    #[error("Backwards invocation error: {0}")]
    BackwardsInvocation(String),

    /// 250 consecutive empty ticks elapsed with no terminal event
    #[error("Backwards invocation {backwards_request_id} exited without response")]
    BackwardsTimeout {
        /// The correlation id of the timed-out invocation
        backwards_request_id: String,
    },

    /// Transport-level failure (connect, read, write, handshake)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Registry lookup failure (tool/model/route not found)
    #[error("Registry lookup failed: {kind} not found for provider {provider}")]
    Registry {
        /// Provider name
        provider: String,
        /// What was being looked up (e.g. "tool", "model", "route")
        kind: String,
    },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors (backwards-invocation HTTP transport)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal invariant violation
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for plugin runtime operations.
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation. Call sites
/// that need to match on a specific variant use
/// `Result<T, PluginRuntimeError>` directly instead.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let error = PluginRuntimeError::Config("invalid format".to_string());
        assert_eq!(error.to_string(), "Configuration error: invalid format");
    }

    #[test]
    fn test_decode_error_display() {
        let error = PluginRuntimeError::Decode("not valid json".to_string());
        assert_eq!(error.to_string(), "Decode error: not valid json");
    }

    #[test]
    fn test_dispatch_error_display() {
        let error = PluginRuntimeError::Dispatch {
            message: "unroutable".to_string(),
        };
        assert_eq!(error.to_string(), "Dispatch error: unroutable");
    }

    #[test]
    fn test_validation_error_display() {
        let error = PluginRuntimeError::Validation {
            message: "missing field `a`".to_string(),
        };
        assert!(error.to_string().contains("missing field"));
    }

    #[test]
    fn test_handler_error_display() {
        let error = PluginRuntimeError::Handler {
            error_type: "ValueError".to_string(),
            message: "bad input".to_string(),
            args: None,
        };
        let s = error.to_string();
        assert!(s.contains("ValueError"));
        assert!(s.contains("bad input"));
    }

    #[test]
    fn test_backwards_invocation_error_display() {
        let error = PluginRuntimeError::BackwardsInvocation("moderation rejected".to_string());
        assert!(error.to_string().contains("moderation rejected"));
    }

    #[test]
    fn test_backwards_timeout_error_display() {
        let error = PluginRuntimeError::BackwardsTimeout {
            backwards_request_id: "abc123".to_string(),
        };
        let s = error.to_string();
        assert!(s.contains("abc123"));
        assert!(s.contains("exited without response"));
    }

    #[test]
    fn test_transport_error_display() {
        let error = PluginRuntimeError::Transport("connection reset".to_string());
        assert_eq!(error.to_string(), "Transport error: connection reset");
    }

    #[test]
    fn test_registry_error_display() {
        let error = PluginRuntimeError::Registry {
            provider: "basic_math".to_string(),
            kind: "tool".to_string(),
        };
        let s = error.to_string();
        assert!(s.contains("basic_math"));
        assert!(s.contains("tool"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: PluginRuntimeError = io_error.into();
        assert!(matches!(error, PluginRuntimeError::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_str = "{invalid json}";
        let json_error = serde_json::from_str::<serde_json::Value>(json_str).unwrap_err();
        let error: PluginRuntimeError = json_error.into();
        assert!(matches!(error, PluginRuntimeError::Serialization(_)));
    }

    #[test]
    fn test_yaml_error_conversion() {
        let yaml_str = "invalid: : yaml";
        let yaml_error = serde_yaml::from_str::<serde_yaml::Value>(yaml_str).unwrap_err();
        let error: PluginRuntimeError = yaml_error.into();
        assert!(matches!(error, PluginRuntimeError::Yaml(_)));
    }

    #[test]
    fn test_internal_error_display() {
        let error = PluginRuntimeError::Internal("poisoned lock".to_string());
        assert_eq!(error.to_string(), "Internal error: poisoned lock");
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PluginRuntimeError>();
    }

    #[test]
    fn test_error_propagation() {
        fn failing_function() -> crate::error::Result<()> {
            Err(anyhow::anyhow!(PluginRuntimeError::Decode(
                "Test error".to_string()
            )))
        }

        let result = failing_function();
        assert!(result.is_err());
    }
}
