//! Error handling for the register bridge service
//!
//! One variant per failure class the device engine can report. Most variants
//! carry a message only; batch read failures keep their coordinates so the poll
//! driver can log which request broke the cycle.

use thiserror::Error;

use crate::core::types::RegisterCategory;

/// Register bridge service error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegSrvError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Transport could not connect, or a connection-level failure occurred
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Transport-level read or write failure (including protocol exceptions)
    #[error("Transport error: {0}")]
    TransportError(String),

    /// A bounded transport call did not complete in time
    #[error("Timeout error: {0}")]
    TimeoutError(String),

    /// Device did not answer its probe register
    #[error("Device unavailable: {0}")]
    Unavailable(String),

    /// Model could not be identified or is not supported
    #[error("Model error: {0}")]
    ModelError(String),

    /// One batch of a read cycle failed; the whole cycle was discarded
    #[error("Batch read error: {category} batch at {start} (+{count}): {reason}")]
    BatchReadError {
        category: RegisterCategory,
        start: u16,
        count: u16,
        reason: String,
    },

    /// Unknown parameter name or slug
    #[error("Not found: {0}")]
    NotFound(String),

    /// Parameter window falls outside the state buffer
    #[error("Index error: {0}")]
    IndexError(String),

    /// Value outside the encodable or permitted range
    #[error("Range error: {0}")]
    RangeError(String),

    /// Data type not supported by this codec direction or device family
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Malformed input (write payloads, option indices)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Operation not valid in the current lifecycle state
    #[error("State error: {0}")]
    StateError(String),

    /// Telemetry bus failures
    #[error("Publish error: {0}")]
    PublishError(String),

    #[error("IO error: {0}")]
    IoError(String),
}

/// Result type alias for the register bridge service
pub type Result<T> = std::result::Result<T, RegSrvError>;

impl RegSrvError {
    pub fn config(msg: impl Into<String>) -> Self {
        RegSrvError::ConfigError(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        RegSrvError::ConnectionError(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        RegSrvError::TransportError(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        RegSrvError::TimeoutError(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        RegSrvError::Unavailable(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        RegSrvError::ModelError(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        RegSrvError::NotFound(msg.into())
    }

    pub fn index(msg: impl Into<String>) -> Self {
        RegSrvError::IndexError(msg.into())
    }

    pub fn range(msg: impl Into<String>) -> Self {
        RegSrvError::RangeError(msg.into())
    }

    pub fn not_implemented(msg: impl Into<String>) -> Self {
        RegSrvError::NotImplemented(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        RegSrvError::ValidationError(msg.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        RegSrvError::StateError(msg.into())
    }

    pub fn publish(msg: impl Into<String>) -> Self {
        RegSrvError::PublishError(msg.into())
    }

    /// Transient failures the poll driver retries on a later cycle.
    ///
    /// Profile defects (decode/encode, unknown names) and unsupported models
    /// are not retried.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RegSrvError::ConnectionError(_)
                | RegSrvError::TransportError(_)
                | RegSrvError::TimeoutError(_)
                | RegSrvError::Unavailable(_)
                | RegSrvError::BatchReadError { .. }
                | RegSrvError::IoError(_)
        )
    }

    /// Whether this error came from the transport itself
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            RegSrvError::ConnectionError(_)
                | RegSrvError::TransportError(_)
                | RegSrvError::TimeoutError(_)
                | RegSrvError::IoError(_)
        )
    }
}

impl From<std::io::Error> for RegSrvError {
    fn from(err: std::io::Error) -> Self {
        RegSrvError::IoError(err.to_string())
    }
}

impl From<common::CommonError> for RegSrvError {
    fn from(err: common::CommonError) -> Self {
        RegSrvError::ConfigError(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for RegSrvError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        RegSrvError::TimeoutError(err.to_string())
    }
}
