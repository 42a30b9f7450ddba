//! # Error Types
//!
//! Custom error types for Atorch Logger using `thiserror`.

use thiserror::Error;

/// Main error type for Atorch Logger
#[derive(Debug, Error)]
pub enum AtorchLoggerError {
    /// Meter protocol errors (malformed frame, checksum/length mismatch)
    #[error("Meter protocol error: {0}")]
    Protocol(String),

    /// Transport errors (serial open/read/write failures)
    #[error("Transport error: {0}")]
    Transport(String),

    /// No meter device found at any candidate path
    #[error("No meter device found at: {0}")]
    PortNotFound(String),

    /// Durable store errors
    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),

    /// CSV export errors
    #[error("Export error: {0}")]
    Export(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Atorch Logger
pub type Result<T> = std::result::Result<T, AtorchLoggerError>;
