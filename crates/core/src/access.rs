//! Owner-only and minter-only capability checks shared by the ledger and
//! the faucet.

use crate::error::{FaucetError, FaucetResult};
use drip_common::types::Address;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Reject unless `caller` is exactly `expected`.
pub fn ensure_caller(caller: &Address, expected: &Address) -> FaucetResult<()> {
    if caller != expected {
        warn!("Unauthorized call from {} (expected {})", caller, expected);
        return Err(FaucetError::Unauthorized { caller: *caller });
    }
    Ok(())
}

/// Single administrative identity with explicit transfer.
#[derive(Debug)]
pub struct Ownable {
    owner: RwLock<Address>,
}

impl Ownable {
    pub fn new(owner: Address) -> Self {
        Self {
            owner: RwLock::new(owner),
        }
    }

    pub async fn owner(&self) -> Address {
        *self.owner.read().await
    }

    /// Fails with `Unauthorized` unless `caller` is the current owner.
    pub async fn only_owner(&self, caller: &Address) -> FaucetResult<()> {
        let owner = self.owner.read().await;
        ensure_caller(caller, &owner)
    }

    /// Hand ownership to `new_owner`, returning the previous owner.
    pub async fn transfer_ownership(&self, caller: &Address, new_owner: Address) -> FaucetResult<Address> {
        let mut owner = self.owner.write().await;
        ensure_caller(caller, &owner)?;
        let previous = std::mem::replace(&mut *owner, new_owner);
        info!("Ownership transferred from {} to {}", previous, new_owner);
        Ok(previous)
    }

    /// Unchecked overwrite used when restoring persisted state.
    pub(crate) async fn restore(&self, owner: Address) {
        *self.owner.write().await = owner;
    }

    pub(crate) fn try_restore(&self, owner: Address) -> bool {
        match self.owner.try_write() {
            Ok(mut current) => {
                *current = owner;
                true
            }
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address([b; 20])
    }

    #[test]
    fn test_ensure_caller() {
        assert!(ensure_caller(&addr(1), &addr(1)).is_ok());
        assert_eq!(
            ensure_caller(&addr(2), &addr(1)),
            Err(FaucetError::Unauthorized { caller: addr(2) })
        );
    }

    #[tokio::test]
    async fn test_only_owner() {
        let ownable = Ownable::new(addr(1));
        assert!(ownable.only_owner(&addr(1)).await.is_ok());
        assert!(matches!(
            ownable.only_owner(&addr(9)).await,
            Err(FaucetError::Unauthorized { .. })
        ));
    }

    #[tokio::test]
    async fn test_transfer_ownership() {
        let ownable = Ownable::new(addr(1));

        let err = ownable.transfer_ownership(&addr(2), addr(2)).await.unwrap_err();
        assert_eq!(err, FaucetError::Unauthorized { caller: addr(2) });
        assert_eq!(ownable.owner().await, addr(1));

        let previous = ownable.transfer_ownership(&addr(1), addr(2)).await.unwrap();
        assert_eq!(previous, addr(1));
        assert_eq!(ownable.owner().await, addr(2));
        assert!(ownable.only_owner(&addr(1)).await.is_err());
    }
}
