//! Error type for shared service plumbing

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommonError {
    /// Configuration file missing, malformed, or of an unknown format
    #[error("Configuration error: {0}")]
    Config(String),

    /// Logging could not be initialized
    #[error("Logging error: {0}")]
    Logging(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CommonError>;
