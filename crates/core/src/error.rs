//! Error types for the ledger and faucet engine

use drip_common::types::Address;
use thiserror::Error;

/// Every rejection a ledger or faucet call can produce.
///
/// All variants are terminal for the call that raised them; no partial
/// state survives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FaucetError {
    #[error("Unauthorized caller: {caller}")]
    Unauthorized { caller: Address },

    #[error("Faucet is paused")]
    Paused,

    #[error("Cooldown active: try again in {remaining_secs} seconds")]
    CooldownActive { remaining_secs: u64 },

    #[error("Lifetime claim limit reached")]
    LifetimeCapReached,

    #[error("Mint would exceed the maximum token supply")]
    SupplyCapExceeded,

    #[error("Reentrant call rejected")]
    ReentrantCall,

    #[error("Invalid claim policy: {0}")]
    InvalidPolicy(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl FaucetError {
    /// Stable machine-readable code for the calling layer.
    pub fn code(&self) -> &'static str {
        match self {
            FaucetError::Unauthorized { .. } => "UNAUTHORIZED",
            FaucetError::Paused => "PAUSED",
            FaucetError::CooldownActive { .. } => "COOLDOWN_ACTIVE",
            FaucetError::LifetimeCapReached => "LIFETIME_CAP_REACHED",
            FaucetError::SupplyCapExceeded => "SUPPLY_CAP_EXCEEDED",
            FaucetError::ReentrantCall => "REENTRANT_CALL",
            FaucetError::InvalidPolicy(_) => "INVALID_POLICY",
            FaucetError::Storage(_) => "STORAGE_ERROR",
        }
    }
}

impl From<drip_common::DripError> for FaucetError {
    fn from(err: drip_common::DripError) -> Self {
        FaucetError::Storage(err.to_string())
    }
}

pub type FaucetResult<T> = Result<T, FaucetError>;
