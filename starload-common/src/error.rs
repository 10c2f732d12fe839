//! Common error types for starload

use thiserror::Error;

/// Common result type for starload operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types shared by the loader crates
///
/// Everything here is fatal for the batch that raised it. Row-level
/// problems are modelled separately and never become an `Error`.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reader/writer error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML config file could not be parsed
    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid caller input (bad identifier, unsupported dimension, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Batch state machine was driven out of order
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidState { from: String, to: String },

    /// Schema is missing or only partially created
    #[error("Schema error: {0}")]
    Schema(String),
}
