//! End-to-end claim behaviour through the transactional runtime.

use drip_common::types::{tokens, Address, Amount};
use drip_core::{
    ClaimState, DeployParams, DripEvent, DripRuntime, FaucetError, ManualClock, SubscriptionFilter,
};
use num_traits::Zero;
use std::sync::Arc;

const DAY: u64 = 86_400;

fn addr(b: u8) -> Address {
    Address([b; 20])
}

fn owner() -> Address {
    addr(0x01)
}

async fn runtime_at(start: u64) -> (DripRuntime, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(start));
    let runtime = DripRuntime::deploy(DeployParams::new(owner()), clock.clone())
        .await
        .unwrap();
    (runtime, clock)
}

#[tokio::test]
async fn test_second_claim_within_cooldown_is_rejected_once() {
    let (runtime, clock) = runtime_at(1_000).await;
    let p = addr(0x10);

    runtime.request_tokens(p).await.unwrap();
    clock.advance(60);
    let err = runtime.request_tokens(p).await.unwrap_err();

    assert_eq!(err, FaucetError::CooldownActive { remaining_secs: DAY - 60 });
    assert_eq!(runtime.faucet().total_claimed(&p).await, tokens(10));
    assert_eq!(runtime.balance_of(&p).await, tokens(10));
}

#[tokio::test]
async fn test_cap_convergence_after_ten_claims() {
    let (runtime, clock) = runtime_at(1_000).await;
    let p = addr(0x11);

    for i in 0..10 {
        runtime.request_tokens(p).await.unwrap();
        if i < 9 {
            clock.advance(DAY);
        }
    }

    assert_eq!(runtime.faucet().total_claimed(&p).await, tokens(100));
    assert!(!runtime.can_claim(&p).await);
    assert_eq!(runtime.remaining_allowance(&p).await, Amount::zero());

    clock.advance(DAY);
    assert_eq!(runtime.request_tokens(p).await, Err(FaucetError::LifetimeCapReached));
    assert_eq!(runtime.claim_status(&p).await.state, ClaimState::Capped);
    assert_eq!(runtime.balance_of(&p).await, tokens(100));
}

#[tokio::test]
async fn test_participants_are_independent() {
    let (runtime, _clock) = runtime_at(5_000).await;
    let a = addr(0x20);
    let b = addr(0x21);

    runtime.request_tokens(a).await.unwrap();

    assert_eq!(runtime.faucet().last_claim_at(&b).await, 0);
    assert_eq!(runtime.faucet().total_claimed(&b).await, Amount::zero());
    assert_eq!(runtime.balance_of(&b).await, Amount::zero());
    assert!(runtime.can_claim(&b).await);

    runtime.request_tokens(b).await.unwrap();
    assert_eq!(runtime.balance_of(&a).await, tokens(10));
    assert_eq!(runtime.balance_of(&b).await, tokens(10));
    assert_eq!(runtime.ledger().total_supply().await, tokens(20));
}

#[tokio::test]
async fn test_pause_gates_everyone_and_unpause_restores_eligibility() {
    let (runtime, clock) = runtime_at(1_000).await;
    let fresh = addr(0x30);
    let cooling = addr(0x31);

    runtime.request_tokens(cooling).await.unwrap();
    clock.advance(100);

    let before_fresh = runtime.claim_status(&fresh).await;
    let before_cooling = runtime.claim_status(&cooling).await;

    runtime.set_paused(owner(), true).await.unwrap();
    assert!(runtime.faucet().is_paused());
    assert!(!runtime.can_claim(&fresh).await);
    assert!(!runtime.can_claim(&cooling).await);
    assert_eq!(runtime.request_tokens(fresh).await, Err(FaucetError::Paused));
    assert_eq!(runtime.request_tokens(cooling).await, Err(FaucetError::Paused));
    assert_eq!(runtime.claim_status(&fresh).await.state, ClaimState::Suspended);

    runtime.set_paused(owner(), false).await.unwrap();
    assert_eq!(runtime.claim_status(&fresh).await, before_fresh);
    assert_eq!(runtime.claim_status(&cooling).await, before_cooling);
    assert!(runtime.can_claim(&fresh).await);
}

#[tokio::test]
async fn test_supply_cap_rolls_back_faucet_accounting() {
    let clock = Arc::new(ManualClock::new(1_000));
    let params = DeployParams::new(owner()).with_max_supply(tokens(15));
    let runtime = DripRuntime::deploy(params, clock.clone()).await.unwrap();
    let first = addr(0x40);
    let second = addr(0x41);

    runtime.request_tokens(first).await.unwrap();
    let mut events = runtime.subscribe(SubscriptionFilter::default());

    let err = runtime.request_tokens(second).await.unwrap_err();
    assert_eq!(err, FaucetError::SupplyCapExceeded);
    assert_eq!(runtime.ledger().total_supply().await, tokens(10));
    assert_eq!(runtime.balance_of(&second).await, Amount::zero());
    assert_eq!(runtime.faucet().total_claimed(&second).await, Amount::zero());
    assert_eq!(runtime.faucet().last_claim_at(&second).await, 0);
    assert!(runtime.can_claim(&second).await);
    assert!(events.try_recv().is_none());
}

#[tokio::test]
async fn test_concrete_scenario_from_time_zero() {
    let (runtime, clock) = runtime_at(0).await;
    let p = addr(0x50);

    runtime.request_tokens(p).await.unwrap();
    assert_eq!(runtime.balance_of(&p).await, tokens(10));
    assert_eq!(runtime.faucet().total_claimed(&p).await, tokens(10));
    assert_eq!(runtime.time_until_next_claim(&p).await, DAY);

    clock.set(43_200);
    assert_eq!(
        runtime.request_tokens(p).await,
        Err(FaucetError::CooldownActive { remaining_secs: 43_200 })
    );
    assert_eq!(runtime.time_until_next_claim(&p).await, 43_200);

    clock.set(DAY);
    runtime.request_tokens(p).await.unwrap();
    assert_eq!(runtime.balance_of(&p).await, tokens(20));
    assert_eq!(runtime.faucet().last_claim_at(&p).await, DAY);
}

#[tokio::test]
async fn test_authorization_gates() {
    let (runtime, _clock) = runtime_at(1_000).await;
    let stranger = addr(0x60);

    assert_eq!(
        runtime.set_paused(stranger, true).await,
        Err(FaucetError::Unauthorized { caller: stranger })
    );
    assert!(!runtime.faucet().is_paused());

    assert_eq!(
        runtime.mint(stranger, stranger, tokens(10)).await,
        Err(FaucetError::Unauthorized { caller: stranger })
    );
    // the deployer handed minting to the faucet
    assert!(runtime.mint(owner(), owner(), tokens(10)).await.is_err());
    assert_eq!(runtime.balance_of(&stranger).await, Amount::zero());
    assert_eq!(runtime.ledger().total_supply().await, Amount::zero());

    assert_eq!(
        runtime.set_minter(stranger, stranger).await,
        Err(FaucetError::Unauthorized { caller: stranger })
    );
    assert_eq!(runtime.ledger().minter().await, runtime.get_addresses().faucet);
}

#[tokio::test]
async fn test_events_published_only_on_commit() {
    let (runtime, clock) = runtime_at(1_000).await;
    let p = addr(0x70);
    let mut mine = runtime.subscribe(SubscriptionFilter { addresses: vec![p] });

    runtime.request_tokens(p).await.unwrap();
    assert_eq!(
        mine.recv().await,
        Some(DripEvent::Transfer { from: None, to: p, amount: tokens(10) })
    );
    assert_eq!(
        mine.recv().await,
        Some(DripEvent::TokensClaimed { claimant: p, amount: tokens(10), timestamp: 1_000 })
    );

    clock.advance(1);
    assert!(runtime.request_tokens(p).await.is_err());
    assert!(mine.try_recv().is_none());

    runtime.set_paused(owner(), true).await.unwrap();
    assert_eq!(mine.recv().await, Some(DripEvent::FaucetPaused { paused: true }));
}

#[tokio::test]
async fn test_time_never_goes_backwards() {
    let (runtime, clock) = runtime_at(10_000).await;
    let p = addr(0x80);

    runtime.request_tokens(p).await.unwrap();
    clock.set(5_000);
    assert_eq!(runtime.now(), 10_000);
    assert_eq!(runtime.time_until_next_claim(&p).await, DAY);
    assert!(matches!(
        runtime.request_tokens(p).await,
        Err(FaucetError::CooldownActive { remaining_secs: DAY })
    ));
}

#[tokio::test]
async fn test_ownership_transfer_moves_pause_right() {
    let (runtime, _clock) = runtime_at(1_000).await;
    let new_owner = addr(0x90);

    runtime.transfer_faucet_ownership(owner(), new_owner).await.unwrap();
    assert!(runtime.set_paused(owner(), true).await.is_err());
    runtime.set_paused(new_owner, true).await.unwrap();
    assert_eq!(runtime.faucet_info().await.owner, new_owner);

    // the ledger keeps its own owner
    assert_eq!(runtime.ledger_info().await.owner, owner());
}

#[tokio::test]
async fn test_get_addresses_matches_components() {
    let (runtime, _clock) = runtime_at(1_000).await;
    let addresses = runtime.get_addresses();
    assert_eq!(addresses.token, runtime.ledger().address());
    assert_eq!(addresses.faucet, runtime.faucet().address());
    assert_eq!(runtime.faucet_info().await.token, addresses.token);
}
