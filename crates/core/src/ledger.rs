//! Token Ledger
//!
//! Authoritative balance and supply bookkeeping. The only mutator of
//! balances and total supply; minting is restricted to a single minter.

use crate::access::{ensure_caller, Ownable};
use crate::constants::{MAX_SUPPLY, TOKEN_DECIMALS, TOKEN_NAME, TOKEN_SYMBOL};
use crate::error::{FaucetError, FaucetResult};
use crate::events::{Component, DripEvent, EventLog};
use crate::state::StateDelta;
use async_trait::async_trait;
use drip_common::types::{Address, Amount};
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Static token description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl Default for TokenMetadata {
    fn default() -> Self {
        Self {
            name: TOKEN_NAME.to_string(),
            symbol: TOKEN_SYMBOL.to_string(),
            decimals: TOKEN_DECIMALS,
        }
    }
}

/// Mint capability the faucet holds on the ledger.
#[async_trait]
pub trait TokenMinter: Send + Sync {
    /// Identity of the token component.
    fn token_address(&self) -> Address;

    /// Credit `amount` to `to` on behalf of `caller`, all-or-nothing.
    async fn mint(
        &self,
        caller: &Address,
        to: &Address,
        amount: &Amount,
        events: &mut EventLog,
    ) -> FaucetResult<()>;
}

#[derive(Debug, Default)]
struct LedgerState {
    minter: Address,
    total_supply: Amount,
    balances: HashMap<Address, Amount>,
}

/// Snapshot of the ledger singleton for the query surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerInfo {
    pub address: Address,
    pub metadata: TokenMetadata,
    pub owner: Address,
    pub minter: Address,
    pub total_supply: Amount,
    pub max_supply: Amount,
}

pub struct TokenLedger {
    address: Address,
    metadata: TokenMetadata,
    max_supply: Amount,
    ownable: Ownable,
    state: RwLock<LedgerState>,
}

impl TokenLedger {
    /// Deploy a ledger. The deploying owner starts out as the minter until
    /// it wires the faucet in with [`set_minter`](Self::set_minter).
    pub fn new(address: Address, owner: Address) -> Self {
        Self::with_config(address, owner, TokenMetadata::default(), MAX_SUPPLY.clone())
    }

    pub fn with_config(address: Address, owner: Address, metadata: TokenMetadata, max_supply: Amount) -> Self {
        info!(
            "Token ledger {} ({}) deployed at {} with max supply {}",
            metadata.name, metadata.symbol, address, max_supply
        );
        Self {
            address,
            metadata,
            max_supply,
            ownable: Ownable::new(owner),
            state: RwLock::new(LedgerState {
                minter: owner,
                ..Default::default()
            }),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn metadata(&self) -> &TokenMetadata {
        &self.metadata
    }

    pub fn max_supply(&self) -> &Amount {
        &self.max_supply
    }

    pub async fn owner(&self) -> Address {
        self.ownable.owner().await
    }

    pub async fn minter(&self) -> Address {
        self.state.read().await.minter
    }

    pub async fn total_supply(&self) -> Amount {
        self.state.read().await.total_supply.clone()
    }

    /// Balance of `address`; 0 for unknown addresses.
    pub async fn balance_of(&self, address: &Address) -> Amount {
        self.state
            .read()
            .await
            .balances
            .get(address)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn info(&self) -> LedgerInfo {
        let state = self.state.read().await;
        LedgerInfo {
            address: self.address,
            metadata: self.metadata.clone(),
            owner: self.ownable.owner().await,
            minter: state.minter,
            total_supply: state.total_supply.clone(),
            max_supply: self.max_supply.clone(),
        }
    }

    /// Mint new tokens. Only the minter may call; the supply cap is checked
    /// before anything is written.
    pub async fn mint(
        &self,
        caller: &Address,
        to: &Address,
        amount: &Amount,
        events: &mut EventLog,
    ) -> FaucetResult<()> {
        let mut state = self.state.write().await;
        ensure_caller(caller, &state.minter)?;

        let new_supply = &state.total_supply + amount;
        if new_supply > self.max_supply {
            warn!(
                "Mint of {} to {} rejected: supply {} would exceed cap {}",
                amount, to, state.total_supply, self.max_supply
            );
            return Err(FaucetError::SupplyCapExceeded);
        }

        *state.balances.entry(*to).or_default() += amount;
        state.total_supply = new_supply;

        events.emit(DripEvent::Transfer {
            from: None,
            to: *to,
            amount: amount.clone(),
        });
        debug!("Minted {} to {}, total supply {}", amount, to, state.total_supply);
        Ok(())
    }

    /// Rewire the minter. Owner only; not restricted to a single call.
    pub async fn set_minter(&self, caller: &Address, minter: Address, events: &mut EventLog) -> FaucetResult<()> {
        self.ownable.only_owner(caller).await?;
        let mut state = self.state.write().await;
        let previous = std::mem::replace(&mut state.minter, minter);
        events.emit(DripEvent::MinterChanged { previous, minter });
        info!("Minter changed from {} to {}", previous, minter);
        Ok(())
    }

    pub async fn transfer_ownership(&self, caller: &Address, new_owner: Address, events: &mut EventLog) -> FaucetResult<()> {
        let previous = self.ownable.transfer_ownership(caller, new_owner).await?;
        events.emit(DripEvent::OwnershipTransferred {
            component: Component::Token,
            previous,
            owner: new_owner,
        });
        Ok(())
    }

    /// Write the ledger-owned parts of `delta` back verbatim.
    pub async fn apply_delta(&self, delta: &StateDelta) {
        if let Some(owner) = delta.token_owner {
            self.ownable.restore(owner).await;
        }
        let mut state = self.state.write().await;
        Self::write_delta(&mut state, delta);
    }

    /// Non-blocking [`apply_delta`](Self::apply_delta); `false` if a lock
    /// was held and nothing could be written.
    pub(crate) fn try_apply_delta(&self, delta: &StateDelta) -> bool {
        let Ok(mut state) = self.state.try_write() else {
            return false;
        };
        if let Some(owner) = delta.token_owner {
            if !self.ownable.try_restore(owner) {
                return false;
            }
        }
        Self::write_delta(&mut state, delta);
        true
    }

    fn write_delta(state: &mut LedgerState, delta: &StateDelta) {
        if let Some(minter) = delta.minter {
            state.minter = minter;
        }
        if let Some(supply) = &delta.total_supply {
            state.total_supply = supply.clone();
        }
        for (address, balance) in &delta.balances {
            if balance.is_zero() {
                state.balances.remove(address);
            } else {
                state.balances.insert(*address, balance.clone());
            }
        }
    }

    /// Every holder with a non-zero balance.
    pub async fn holders(&self) -> Vec<(Address, Amount)> {
        let state = self.state.read().await;
        let mut holders: Vec<_> = state
            .balances
            .iter()
            .map(|(a, b)| (*a, b.clone()))
            .collect();
        holders.sort_by(|a, b| a.0.cmp(&b.0));
        holders
    }
}

#[async_trait]
impl TokenMinter for TokenLedger {
    fn token_address(&self) -> Address {
        self.address
    }

    async fn mint(
        &self,
        caller: &Address,
        to: &Address,
        amount: &Amount,
        events: &mut EventLog,
    ) -> FaucetResult<()> {
        TokenLedger::mint(self, caller, to, amount, events).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drip_common::types::tokens;

    fn addr(b: u8) -> Address {
        Address([b; 20])
    }

    const OWNER: u8 = 1;
    const MINTER: u8 = 2;
    const USER: u8 = 3;

    async fn wired_ledger() -> TokenLedger {
        let ledger = TokenLedger::new(addr(0xaa), addr(OWNER));
        let mut events = EventLog::new();
        ledger.set_minter(&addr(OWNER), addr(MINTER), &mut events).await.unwrap();
        ledger
    }

    #[tokio::test]
    async fn test_metadata() {
        let ledger = TokenLedger::new(addr(0xaa), addr(OWNER));
        assert_eq!(ledger.metadata().name, "Faucet Token");
        assert_eq!(ledger.metadata().symbol, "FCT");
        assert_eq!(ledger.metadata().decimals, 18);
        assert_eq!(ledger.max_supply(), &tokens(100_000_000));
        assert_eq!(ledger.minter().await, addr(OWNER));
    }

    #[tokio::test]
    async fn test_mint_credits_and_emits_transfer() {
        let ledger = wired_ledger().await;
        let mut events = EventLog::new();
        ledger.mint(&addr(MINTER), &addr(USER), &tokens(10), &mut events).await.unwrap();

        assert_eq!(ledger.balance_of(&addr(USER)).await, tokens(10));
        assert_eq!(ledger.total_supply().await, tokens(10));
        assert_eq!(
            events.events(),
            &[DripEvent::Transfer { from: None, to: addr(USER), amount: tokens(10) }]
        );
    }

    #[tokio::test]
    async fn test_non_minter_cannot_mint() {
        let ledger = wired_ledger().await;
        let mut events = EventLog::new();
        let err = ledger.mint(&addr(USER), &addr(USER), &tokens(10), &mut events).await.unwrap_err();

        assert_eq!(err, FaucetError::Unauthorized { caller: addr(USER) });
        assert_eq!(ledger.balance_of(&addr(USER)).await, Amount::zero());
        assert_eq!(ledger.total_supply().await, Amount::zero());
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_supply_cap_is_all_or_nothing() {
        let ledger = TokenLedger::with_config(addr(0xaa), addr(OWNER), TokenMetadata::default(), tokens(25));
        let mut events = EventLog::new();
        ledger.mint(&addr(OWNER), &addr(USER), &tokens(20), &mut events).await.unwrap();

        let err = ledger.mint(&addr(OWNER), &addr(USER), &tokens(10), &mut events).await.unwrap_err();
        assert_eq!(err, FaucetError::SupplyCapExceeded);
        assert_eq!(ledger.balance_of(&addr(USER)).await, tokens(20));
        assert_eq!(ledger.total_supply().await, tokens(20));

        // exactly reaching the cap is allowed
        ledger.mint(&addr(OWNER), &addr(USER), &tokens(5), &mut events).await.unwrap();
        assert_eq!(ledger.total_supply().await, tokens(25));
    }

    #[tokio::test]
    async fn test_set_minter_owner_only() {
        let ledger = wired_ledger().await;
        let mut events = EventLog::new();
        let err = ledger.set_minter(&addr(USER), addr(USER), &mut events).await.unwrap_err();
        assert_eq!(err, FaucetError::Unauthorized { caller: addr(USER) });
        assert_eq!(ledger.minter().await, addr(MINTER));

        // rewiring again is permitted
        ledger.set_minter(&addr(OWNER), addr(USER), &mut events).await.unwrap();
        assert_eq!(ledger.minter().await, addr(USER));
        assert_eq!(
            events.events(),
            &[DripEvent::MinterChanged { previous: addr(MINTER), minter: addr(USER) }]
        );
    }

    #[tokio::test]
    async fn test_unknown_balance_is_zero() {
        let ledger = TokenLedger::new(addr(0xaa), addr(OWNER));
        assert_eq!(ledger.balance_of(&addr(0x42)).await, Amount::zero());
        assert!(ledger.holders().await.is_empty());
    }

    #[tokio::test]
    async fn test_transfer_ownership_moves_set_minter_right() {
        let ledger = wired_ledger().await;
        let mut events = EventLog::new();
        ledger.transfer_ownership(&addr(OWNER), addr(USER), &mut events).await.unwrap();
        assert_eq!(ledger.owner().await, addr(USER));
        assert!(ledger.set_minter(&addr(OWNER), addr(OWNER), &mut events).await.is_err());
        assert!(ledger.set_minter(&addr(USER), addr(OWNER), &mut events).await.is_ok());
    }
}
