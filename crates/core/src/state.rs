//! State deltas exchanged between the executor and durable storage.

use crate::policy::ClaimRecord;
use async_trait::async_trait;
use drip_common::types::{Address, Amount};
use drip_common::DripError;
use serde::{Deserialize, Serialize};

/// Values of a set of state cells at one point in time.
///
/// Used both as a post-commit write set for storage and as a pre-image to
/// restore when a commit cannot be persisted. A full snapshot is a delta
/// with every cell present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDelta {
    pub balances: Vec<(Address, Amount)>,
    pub claims: Vec<(Address, ClaimRecord)>,
    pub total_supply: Option<Amount>,
    pub paused: Option<bool>,
    pub minter: Option<Address>,
    pub token_owner: Option<Address>,
    pub faucet_owner: Option<Address>,
}

impl StateDelta {
    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
            && self.claims.is_empty()
            && self.total_supply.is_none()
            && self.paused.is_none()
            && self.minter.is_none()
            && self.token_owner.is_none()
            && self.faucet_owner.is_none()
    }
}

/// Which cells an operation may touch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateKeys {
    pub balances: Vec<Address>,
    pub claims: Vec<Address>,
    pub total_supply: bool,
    pub paused: bool,
    pub minter: bool,
    pub token_owner: bool,
    pub faucet_owner: bool,
}

impl StateKeys {
    pub fn claim(participant: Address) -> Self {
        Self {
            balances: vec![participant],
            claims: vec![participant],
            total_supply: true,
            ..Default::default()
        }
    }

    pub fn mint(to: Address) -> Self {
        Self {
            balances: vec![to],
            total_supply: true,
            ..Default::default()
        }
    }

    pub fn paused() -> Self {
        Self {
            paused: true,
            ..Default::default()
        }
    }

    pub fn minter() -> Self {
        Self {
            minter: true,
            ..Default::default()
        }
    }

    pub fn token_owner() -> Self {
        Self {
            token_owner: true,
            ..Default::default()
        }
    }

    pub fn faucet_owner() -> Self {
        Self {
            faucet_owner: true,
            ..Default::default()
        }
    }
}

/// Durable destination for committed state.
#[async_trait]
pub trait StateSink: Send + Sync {
    /// Persist `delta` atomically; either every cell is written or none.
    async fn commit(&self, delta: &StateDelta) -> Result<(), DripError>;
}
