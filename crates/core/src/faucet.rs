//! Faucet Engine
//!
//! Owns the claim policy: pause gating, cooldown and lifetime-cap
//! enforcement, and orchestration of ledger mints. Accounting is committed
//! before the mint is invoked and rolled back if the mint fails.

use crate::access::Ownable;
use crate::clock::CallContext;
use crate::error::{FaucetError, FaucetResult};
use crate::events::{Component, DripEvent, EventLog};
use crate::guard::ReentrancyGuard;
use crate::ledger::TokenMinter;
use crate::policy::{ClaimPolicy, ClaimRecord, ClaimState};
use crate::state::StateDelta;
use drip_common::types::{Address, Amount};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Outcome of a successful claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimReceipt {
    pub claimant: Address,
    pub amount: Amount,
    pub timestamp: u64,
}

/// Everything the UI needs about one participant, from a single read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimStatus {
    pub address: Address,
    pub state: ClaimState,
    pub can_claim: bool,
    pub last_claim_at: u64,
    pub total_claimed: Amount,
    pub remaining_allowance: Amount,
    pub time_until_next_claim: u64,
}

/// Snapshot of the faucet singleton for the query surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaucetInfo {
    pub address: Address,
    pub token: Address,
    pub owner: Address,
    pub paused: bool,
    pub policy: ClaimPolicy,
}

/// Claim orchestration over a [`TokenMinter`].
///
/// The engine does not queue calls: a claim arriving while another is in
/// flight fails with [`FaucetError::ReentrantCall`], whoever the participant.
/// Concurrent callers go through [`DripRuntime`](crate::runtime::DripRuntime),
/// which serializes them.
pub struct FaucetEngine {
    address: Address,
    token: Arc<dyn TokenMinter>,
    policy: ClaimPolicy,
    ownable: Ownable,
    paused: AtomicBool,
    claims: RwLock<HashMap<Address, ClaimRecord>>,
    guard: ReentrancyGuard,
}

impl FaucetEngine {
    pub fn new(
        address: Address,
        owner: Address,
        token: Arc<dyn TokenMinter>,
        policy: ClaimPolicy,
    ) -> FaucetResult<Self> {
        policy.validate()?;
        info!(
            "Faucet deployed at {} minting through {} (claim {}, cap {}, cooldown {}s)",
            address,
            token.token_address(),
            policy.claim_amount,
            policy.max_lifetime_claim,
            policy.cooldown_secs
        );
        Ok(Self {
            address,
            token,
            policy,
            ownable: Ownable::new(owner),
            paused: AtomicBool::new(false),
            claims: RwLock::new(HashMap::new()),
            guard: ReentrancyGuard::new(),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Address of the ledger this faucet mints through.
    pub fn token(&self) -> Address {
        self.token.token_address()
    }

    pub fn policy(&self) -> &ClaimPolicy {
        &self.policy
    }

    pub async fn owner(&self) -> Address {
        self.ownable.owner().await
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub async fn info(&self) -> FaucetInfo {
        FaucetInfo {
            address: self.address,
            token: self.token(),
            owner: self.ownable.owner().await,
            paused: self.is_paused(),
            policy: self.policy.clone(),
        }
    }

    /// Claim `claim_amount` for `ctx.caller`.
    pub async fn request_tokens(&self, ctx: &CallContext, events: &mut EventLog) -> FaucetResult<ClaimReceipt> {
        let _entered = self.guard.enter()?;
        let caller = ctx.caller;

        if self.is_paused() {
            debug!("Claim by {} rejected: faucet paused", caller);
            return Err(FaucetError::Paused);
        }

        // Effects before the external mint: a nested call sees the advanced
        // cooldown and cap.
        let previous = {
            let mut claims = self.claims.write().await;
            let record = claims.get(&caller).cloned().unwrap_or_default();
            if let Err(e) = self.policy.check(&record, ctx.now) {
                debug!("Claim by {} rejected: {}", caller, e);
                return Err(e);
            }
            claims.insert(caller, self.policy.advance(&record, ctx.now));
            record
        };

        if let Err(e) = self
            .token
            .mint(&self.address, &caller, &self.policy.claim_amount, events)
            .await
        {
            warn!("Mint for {} failed, rolling back claim: {}", caller, e);
            let mut claims = self.claims.write().await;
            if previous.is_empty() {
                claims.remove(&caller);
            } else {
                claims.insert(caller, previous);
            }
            return Err(e);
        }

        events.emit(DripEvent::TokensClaimed {
            claimant: caller,
            amount: self.policy.claim_amount.clone(),
            timestamp: ctx.now,
        });
        info!("{} claimed {} at {}", caller, self.policy.claim_amount, ctx.now);

        Ok(ClaimReceipt {
            claimant: caller,
            amount: self.policy.claim_amount.clone(),
            timestamp: ctx.now,
        })
    }

    /// Owner-only pause switch. Never touches claim accounting.
    pub async fn set_paused(&self, caller: &Address, paused: bool, events: &mut EventLog) -> FaucetResult<()> {
        self.ownable.only_owner(caller).await?;
        self.paused.store(paused, Ordering::SeqCst);
        events.emit(DripEvent::FaucetPaused { paused });
        info!("Faucet paused = {}", paused);
        Ok(())
    }

    pub async fn transfer_ownership(&self, caller: &Address, new_owner: Address, events: &mut EventLog) -> FaucetResult<()> {
        let previous = self.ownable.transfer_ownership(caller, new_owner).await?;
        events.emit(DripEvent::OwnershipTransferred {
            component: Component::Faucet,
            previous,
            owner: new_owner,
        });
        Ok(())
    }

    pub async fn claim_record(&self, address: &Address) -> ClaimRecord {
        self.claims
            .read()
            .await
            .get(address)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn last_claim_at(&self, address: &Address) -> u64 {
        self.claim_record(address).await.last_claim_at
    }

    pub async fn total_claimed(&self, address: &Address) -> Amount {
        self.claim_record(address).await.total_claimed
    }

    /// Pause, cooldown and cap combined, without mutating anything.
    pub async fn can_claim(&self, address: &Address, now: u64) -> bool {
        if self.is_paused() {
            return false;
        }
        let record = self.claim_record(address).await;
        self.policy.check(&record, now).is_ok()
    }

    pub async fn remaining_allowance(&self, address: &Address) -> Amount {
        let record = self.claim_record(address).await;
        self.policy.remaining_allowance(&record)
    }

    pub async fn time_until_next_claim(&self, address: &Address, now: u64) -> u64 {
        let record = self.claim_record(address).await;
        self.policy.cooldown_remaining(&record, now)
    }

    pub async fn claim_status(&self, address: &Address, now: u64) -> ClaimStatus {
        let record = self.claim_record(address).await;
        let state = self.policy.classify(&record, now, self.is_paused());
        ClaimStatus {
            address: *address,
            state,
            can_claim: state == ClaimState::Eligible,
            last_claim_at: record.last_claim_at,
            remaining_allowance: self.policy.remaining_allowance(&record),
            time_until_next_claim: self.policy.cooldown_remaining(&record, now),
            total_claimed: record.total_claimed,
        }
    }

    /// Write the faucet-owned parts of `delta` back verbatim.
    pub async fn apply_delta(&self, delta: &StateDelta) {
        if let Some(owner) = delta.faucet_owner {
            self.ownable.restore(owner).await;
        }
        let mut claims = self.claims.write().await;
        self.write_delta(&mut claims, delta);
    }

    /// Non-blocking [`apply_delta`](Self::apply_delta); `false` if a lock
    /// was held and nothing could be written.
    pub(crate) fn try_apply_delta(&self, delta: &StateDelta) -> bool {
        let Ok(mut claims) = self.claims.try_write() else {
            return false;
        };
        if let Some(owner) = delta.faucet_owner {
            if !self.ownable.try_restore(owner) {
                return false;
            }
        }
        self.write_delta(&mut claims, delta);
        true
    }

    fn write_delta(&self, claims: &mut HashMap<Address, ClaimRecord>, delta: &StateDelta) {
        if let Some(paused) = delta.paused {
            self.paused.store(paused, Ordering::SeqCst);
        }
        for (address, record) in &delta.claims {
            if record.is_empty() {
                claims.remove(address);
            } else {
                claims.insert(*address, record.clone());
            }
        }
    }

    /// Every participant that has claimed at least once.
    pub async fn participants(&self) -> Vec<(Address, ClaimRecord)> {
        let claims = self.claims.read().await;
        let mut all: Vec<_> = claims.iter().map(|(a, r)| (*a, r.clone())).collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::TokenLedger;
    use drip_common::types::tokens;
    use num_traits::Zero;

    fn addr(b: u8) -> Address {
        Address([b; 20])
    }

    const OWNER: u8 = 1;
    const USER: u8 = 3;

    async fn setup() -> (Arc<TokenLedger>, FaucetEngine) {
        let ledger = Arc::new(TokenLedger::new(addr(0xaa), addr(OWNER)));
        let faucet = FaucetEngine::new(addr(0xbb), addr(OWNER), ledger.clone(), ClaimPolicy::default()).unwrap();
        ledger
            .set_minter(&addr(OWNER), faucet.address(), &mut EventLog::new())
            .await
            .unwrap();
        (ledger, faucet)
    }

    #[tokio::test]
    async fn test_first_claim() {
        let (ledger, faucet) = setup().await;
        let mut events = EventLog::new();
        let receipt = faucet
            .request_tokens(&CallContext::new(addr(USER), 1_000), &mut events)
            .await
            .unwrap();

        assert_eq!(receipt.amount, tokens(10));
        assert_eq!(ledger.balance_of(&addr(USER)).await, tokens(10));
        assert_eq!(faucet.last_claim_at(&addr(USER)).await, 1_000);
        assert_eq!(faucet.total_claimed(&addr(USER)).await, tokens(10));
        assert_eq!(
            events.events(),
            &[
                DripEvent::Transfer { from: None, to: addr(USER), amount: tokens(10) },
                DripEvent::TokensClaimed { claimant: addr(USER), amount: tokens(10), timestamp: 1_000 },
            ]
        );
    }

    #[tokio::test]
    async fn test_cooldown_rejects_second_claim() {
        let (_, faucet) = setup().await;
        let ctx = CallContext::new(addr(USER), 1_000);
        faucet.request_tokens(&ctx, &mut EventLog::new()).await.unwrap();

        let err = faucet.request_tokens(&ctx, &mut EventLog::new()).await.unwrap_err();
        assert_eq!(err, FaucetError::CooldownActive { remaining_secs: 86_400 });
        assert_eq!(faucet.total_claimed(&addr(USER)).await, tokens(10));
    }

    #[tokio::test]
    async fn test_rollback_when_mint_fails() {
        let ledger = Arc::new(TokenLedger::new(addr(0xaa), addr(OWNER)));
        // minter never wired: the ledger rejects the faucet
        let faucet = FaucetEngine::new(addr(0xbb), addr(OWNER), ledger.clone(), ClaimPolicy::default()).unwrap();

        let mut events = EventLog::new();
        let err = faucet
            .request_tokens(&CallContext::new(addr(USER), 50), &mut events)
            .await
            .unwrap_err();
        assert_eq!(err, FaucetError::Unauthorized { caller: addr(0xbb) });
        assert!(faucet.claim_record(&addr(USER)).await.is_empty());
        assert!(faucet.participants().await.is_empty());
        assert_eq!(ledger.total_supply().await, Amount::zero());
        assert!(events.is_empty());
        assert!(faucet.can_claim(&addr(USER), 50).await);
    }

    #[tokio::test]
    async fn test_pause_owner_only_and_gates_claims() {
        let (_, faucet) = setup().await;
        let mut events = EventLog::new();

        let err = faucet.set_paused(&addr(USER), true, &mut events).await.unwrap_err();
        assert_eq!(err, FaucetError::Unauthorized { caller: addr(USER) });
        assert!(!faucet.is_paused());

        faucet.set_paused(&addr(OWNER), true, &mut events).await.unwrap();
        assert_eq!(events.events(), &[DripEvent::FaucetPaused { paused: true }]);
        assert!(!faucet.can_claim(&addr(USER), 0).await);
        assert_eq!(
            faucet.request_tokens(&CallContext::new(addr(USER), 0), &mut EventLog::new()).await,
            Err(FaucetError::Paused)
        );
        assert_eq!(faucet.claim_status(&addr(USER), 0).await.state, ClaimState::Suspended);

        faucet.set_paused(&addr(OWNER), false, &mut events).await.unwrap();
        assert!(faucet.can_claim(&addr(USER), 0).await);
    }

    #[tokio::test]
    async fn test_invalid_policy_rejected_at_construction() {
        let ledger = Arc::new(TokenLedger::new(addr(0xaa), addr(OWNER)));
        let policy = ClaimPolicy {
            claim_amount: Amount::zero(),
            ..ClaimPolicy::default()
        };
        assert!(matches!(
            FaucetEngine::new(addr(0xbb), addr(OWNER), ledger, policy),
            Err(FaucetError::InvalidPolicy(_))
        ));
    }

    #[tokio::test]
    async fn test_views_for_fresh_participant() {
        let (_, faucet) = setup().await;
        let status = faucet.claim_status(&addr(USER), 10).await;
        assert_eq!(status.state, ClaimState::Eligible);
        assert!(status.can_claim);
        assert_eq!(status.remaining_allowance, tokens(100));
        assert_eq!(status.time_until_next_claim, 0);
        assert_eq!(faucet.token(), addr(0xaa));
    }
}
