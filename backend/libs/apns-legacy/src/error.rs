//! Error types for the legacy APNs gateway client
//!
//! Every failure surfaces synchronously at the point of misuse. Transport
//! errors keep the underlying OS error and the gateway address so operators
//! can see exactly which endpoint refused the connection.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while building payloads or talking to a gateway
#[derive(Error, Debug)]
pub enum ApnsError {
    /// Malformed caller input (non-scalar values, bad hex, empty body, oversized payload)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Render attempted before a required field was set
    #[error("Missing required field '{0}': it must be set before rendering the payload")]
    MissingField(&'static str),

    /// Operation attempted in the wrong connection state
    #[error("Invalid connection state: {0}")]
    InvalidState(String),

    /// TCP/TLS establishment failed
    #[error("Unable to connect to the push gateway: {source} (gateway address: {address})")]
    Connection {
        address: String,
        source: std::io::Error,
    },

    /// Client certificate or private key could not be loaded
    #[error("Failed to load certificate '{path}': {reason}")]
    Certificate { path: PathBuf, reason: String },

    /// Socket rejected outbound data
    #[error("Failed to write to the push gateway: {0}")]
    Write(#[source] std::io::Error),

    /// Read side of the socket failed
    #[error("Push gateway I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The message gateway could not take the notification
    #[error("Push gateway is not available: {0}")]
    ServiceUnavailable(String),

    /// Malformed or truncated acknowledgment/feedback frame
    #[error("Malformed gateway frame: {0}")]
    Decode(String),

    /// JSON encoding of the payload failed
    #[error("Failed to serialize payload: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Missing required environment variable
    #[error("Required environment variable '{var_name}' not set: {hint}")]
    MissingEnvVar { var_name: String, hint: String },
}

/// Result type alias for gateway operations
pub type ApnsResult<T> = Result<T, ApnsError>;

impl ApnsError {
    /// Errors caused by how the caller used the API rather than by the network
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            ApnsError::InvalidArgument(_)
                | ApnsError::MissingField(_)
                | ApnsError::InvalidState(_)
                | ApnsError::MissingEnvVar { .. }
        )
    }

    /// OS-level error code of a connection failure, when the OS reported one
    pub fn errno(&self) -> Option<i32> {
        match self {
            ApnsError::Connection { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_caller_errors() {
        assert!(ApnsError::MissingField("device_token").is_caller_error());
        assert!(ApnsError::InvalidState("already connected".to_string()).is_caller_error());

        let err = ApnsError::ServiceUnavailable("broken pipe".to_string());
        assert!(!err.is_caller_error());
    }

    #[test]
    fn test_connection_error_display() {
        let err = ApnsError::Connection {
            address: "gateway.push.apple.com:2195".to_string(),
            source: io::Error::from_raw_os_error(111),
        };

        let text = err.to_string();
        assert!(text.contains("gateway.push.apple.com:2195"));
        assert_eq!(err.errno(), Some(111));
    }

    #[test]
    fn test_errno_absent_for_other_errors() {
        let err = ApnsError::Decode("short frame".to_string());
        assert_eq!(err.errno(), None);
    }
}
