//! Error types for switchboard.

use std::time::Duration;

use thiserror::Error;

/// Main error type for all switchboard operations.
#[derive(Debug, Error)]
pub enum RelayError {
    /// I/O error on the TCP connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Protocol error (bad length, unknown type byte, malformed payload).
    ///
    /// The connection that produced it must be closed.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A frame was constructed with the wrong payload for its type.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// An invocation request violates its invariants.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No open connection to the broker.
    #[error("Not connected to broker")]
    NotConnected,

    /// The call did not resolve within its timeout.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The remote side answered with a failure.
    #[error("Remote error {error_type}: {error_message}")]
    Remote {
        /// Error type reported by the target.
        error_type: String,
        /// Error message reported by the target.
        error_message: String,
    },

    /// Connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Backpressure timeout - write buffer full.
    #[error("Backpressure timeout")]
    BackpressureTimeout,
}

/// Result type alias using RelayError.
pub type Result<T> = std::result::Result<T, RelayError>;
