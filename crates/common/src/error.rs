use thiserror::Error;

use crate::types::{AddressParseError, AmountParseError};

/// Ambient error types for the drip workspace.
///
/// Claim-policy rejections are not represented here; they live in
/// `drip_core::FaucetError` so callers can match on them precisely.
#[derive(Error, Debug)]
pub enum DripError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Persistent storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Address parsing errors
    #[error("Invalid address: {0}")]
    Address(#[from] AddressParseError),

    /// Amount parsing errors
    #[error("Invalid amount: {0}")]
    Amount(#[from] AmountParseError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for drip operations
pub type Result<T> = std::result::Result<T, DripError>;

impl From<serde_json::Error> for DripError {
    fn from(err: serde_json::Error) -> Self {
        DripError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for DripError {
    fn from(err: anyhow::Error) -> Self {
        DripError::Internal(err.to_string())
    }
}
