//! Error types for digest computation

use thiserror::Error;

/// Result type for digest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Digest errors
#[derive(Error, Debug)]
pub enum Error {
    /// Ledger error
    #[error("Ledger error: {0}")]
    Ledger(#[from] convey_ledger::Error),

    /// Window bounds are not ordered
    #[error("Window error: {0}")]
    Window(String),

    /// Prize fund cannot be split
    #[error("Reward error: {0}")]
    Reward(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
