//! Error types for the device gateway.
//!
//! [`GatewayError`] is the crate-level error used by the listener, the
//! configuration layer and the telemetry sink. Frame-level problems never
//! surface as a `GatewayError`: the validator reports a
//! [`Rejection`](crate::protocol::Rejection) and the decoder a
//! [`DecodeError`](crate::protocol::DecodeError), both of which the connection
//! handler logs and then moves past.
//!
//! ## Error Categories
//!
//! - **Io Errors**: Socket accept, read or write failures
//! - **Bind Errors**: The listener could not claim its address
//! - **Config Errors**: Invalid environment or file configuration
//! - **Sink Errors**: The telemetry store refused or failed an upsert
//! - **Capacity Errors**: Connection limit or dispatcher queue exhausted
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use fleetwire::GatewayError;
//!
//! let error = GatewayError::sink_failed("store unavailable");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for gateway operations.
pub type Result<T, E = GatewayError> = std::result::Result<T, E>;

/// Main error type for gateway operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GatewayError {
    #[error("I/O error during {operation}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to bind listener on {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration for {key}: {details}")]
    Config { key: String, details: String },

    #[error("Telemetry sink failed: {reason}")]
    Sink {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Connection limit of {limit} reached")]
    ConnectionLimit { limit: usize },

    #[error("Sink queue is full ({capacity} pending records)")]
    QueueFull { capacity: usize },

    #[error("Sink dispatcher has shut down")]
    DispatcherClosed,

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },
}

impl GatewayError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Io { .. } => true,
            GatewayError::Sink { .. } => true,
            GatewayError::QueueFull { .. } => true,
            GatewayError::Timeout { .. } => true,
            GatewayError::ConnectionLimit { .. } => true,
            GatewayError::Bind { .. } => false,
            GatewayError::Config { .. } => false,
            GatewayError::DispatcherClosed => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            GatewayError::Io { .. } => vec![
                "Check network connectivity to the device",
                "Inspect the peer for resets or half-open sockets",
            ],
            GatewayError::Bind { .. } => vec![
                "Check that no other process holds the port",
                "Set FLEETWIRE_PORT to a free port",
                "Verify permissions for ports below 1024",
            ],
            GatewayError::Config { .. } => vec![
                "Check the spelling of the configuration value",
                "Remove the variable to fall back to the default",
            ],
            GatewayError::Sink { .. } => vec![
                "Verify the telemetry store is reachable",
                "Check store credentials and quotas",
            ],
            GatewayError::ConnectionLimit { .. } => vec![
                "Raise FLEETWIRE_MAX_CONNECTIONS",
                "Enable an idle timeout to reclaim dead sockets",
            ],
            GatewayError::QueueFull { .. } => vec![
                "Raise FLEETWIRE_SINK_QUEUE",
                "Investigate telemetry store latency",
            ],
            GatewayError::DispatcherClosed => vec![
                "Restart the gateway",
                "Check logs for the dispatcher shutdown reason",
            ],
            GatewayError::Timeout { .. } => vec![
                "Increase the idle timeout",
                "Check whether the device is still powered",
            ],
        }
    }

    /// Helper constructor for I/O errors with an operation label.
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        GatewayError::Io { operation: operation.into(), source }
    }

    /// Helper constructor for configuration errors.
    pub fn config(key: impl Into<String>, details: impl Into<String>) -> Self {
        GatewayError::Config { key: key.into(), details: details.into() }
    }

    /// Helper constructor for sink failures.
    pub fn sink_failed(reason: impl Into<String>) -> Self {
        GatewayError::Sink { reason: reason.into(), source: None }
    }

    /// Helper constructor for sink failures with source.
    pub fn sink_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        GatewayError::Sink { reason: reason.into(), source: Some(source) }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        GatewayError::Io { operation: "socket".to_string(), source: err }
    }
}
