//! Execution environment for the ledger and faucet.
//!
//! Every external call runs as one transaction: calls are serialized, each
//! sees a single non-decreasing `now`, and a call either commits all of its
//! effects (state, persistence, events) or none of them.

use crate::clock::{CallContext, Clock};
use crate::deploy::{ComponentAddresses, DeployParams, Deployment};
use crate::error::{FaucetError, FaucetResult};
use crate::events::{EventLog, EventPublisher, EventSubscriber, SubscriptionFilter};
use crate::faucet::{ClaimReceipt, ClaimStatus, FaucetEngine, FaucetInfo};
use crate::ledger::{LedgerInfo, TokenLedger};
use crate::state::{StateDelta, StateKeys, StateSink};
use drip_common::types::{Address, Amount};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, warn};

tokio::task_local! {
    /// Set while a call is executing on the current task.
    static IN_CALL: ();
}

pub struct DripRuntime {
    ledger: Arc<TokenLedger>,
    faucet: Arc<FaucetEngine>,
    addresses: ComponentAddresses,
    clock: Arc<dyn Clock>,
    publisher: EventPublisher,
    sink: Option<Arc<dyn StateSink>>,
    /// Serializes mutating calls.
    tx_lock: Arc<Mutex<()>>,
    /// Timestamp of the last committed call; `now` never goes below it.
    last_now: AtomicU64,
}

impl DripRuntime {
    pub fn new(deployment: Deployment, clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger: deployment.ledger,
            faucet: deployment.faucet,
            addresses: deployment.addresses,
            clock,
            publisher: EventPublisher::default(),
            sink: None,
            tx_lock: Arc::new(Mutex::new(())),
            last_now: AtomicU64::new(0),
        }
    }

    /// Deploy fresh components and wrap them in a runtime.
    pub async fn deploy(params: DeployParams, clock: Arc<dyn Clock>) -> FaucetResult<Self> {
        Ok(Self::new(Deployment::deploy(params).await?, clock))
    }

    pub fn with_sink(mut self, sink: Arc<dyn StateSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_publisher(mut self, publisher: EventPublisher) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn ledger(&self) -> &Arc<TokenLedger> {
        &self.ledger
    }

    pub fn faucet(&self) -> &Arc<FaucetEngine> {
        &self.faucet
    }

    pub fn subscribe(&self, filter: SubscriptionFilter) -> EventSubscriber {
        self.publisher.subscribe(filter)
    }

    // --- transaction plumbing ---

    /// Run `op` as one transaction. `op` gets the call context and returns
    /// its result together with the events it produced.
    async fn execute<T, F, Fut>(&self, caller: Address, keys: StateKeys, op: F) -> FaucetResult<T>
    where
        F: FnOnce(CallContext) -> Fut,
        Fut: Future<Output = (FaucetResult<T>, EventLog)>,
    {
        if IN_CALL.try_with(|_| ()).is_ok() {
            warn!("Nested call by {} rejected", caller);
            return Err(FaucetError::ReentrantCall);
        }

        IN_CALL
            .scope((), async move {
                let tx = self.tx_lock.clone().lock_owned().await;
                let now = self.clock.now().max(self.last_now.load(Ordering::SeqCst));
                let ctx = CallContext::new(caller, now);
                let pre_image = self.capture(&keys).await;
                let mut rollback = Rollback::new(self.ledger.clone(), self.faucet.clone(), pre_image, tx);

                let (result, events) = op(ctx).await;
                let value = match result {
                    Ok(value) => value,
                    Err(e) => {
                        rollback.disarm();
                        debug!("Call by {} rejected: {}", caller, e);
                        return Err(e);
                    }
                };

                if let Some(sink) = &self.sink {
                    let post_image = self.capture(&keys).await;
                    if let Err(e) = sink.commit(&post_image).await {
                        error!("Failed to persist call by {}, restoring state: {}", caller, e);
                        rollback.restore().await;
                        return Err(FaucetError::Storage(e.to_string()));
                    }
                }

                rollback.disarm();
                self.last_now.store(now, Ordering::SeqCst);
                self.publisher.publish_log(events);
                Ok(value)
            })
            .await
    }

    async fn capture(&self, keys: &StateKeys) -> StateDelta {
        let mut delta = StateDelta::default();
        for address in &keys.balances {
            delta.balances.push((*address, self.ledger.balance_of(address).await));
        }
        for address in &keys.claims {
            delta.claims.push((*address, self.faucet.claim_record(address).await));
        }
        if keys.total_supply {
            delta.total_supply = Some(self.ledger.total_supply().await);
        }
        if keys.paused {
            delta.paused = Some(self.faucet.is_paused());
        }
        if keys.minter {
            delta.minter = Some(self.ledger.minter().await);
        }
        if keys.token_owner {
            delta.token_owner = Some(self.ledger.owner().await);
        }
        if keys.faucet_owner {
            delta.faucet_owner = Some(self.faucet.owner().await);
        }
        delta
    }

    async fn apply(&self, delta: &StateDelta) {
        self.ledger.apply_delta(delta).await;
        self.faucet.apply_delta(delta).await;
    }

    /// Full snapshot of every state cell.
    pub async fn snapshot(&self) -> StateDelta {
        let _lock = self.tx_lock.lock().await;
        StateDelta {
            balances: self.ledger.holders().await,
            claims: self.faucet.participants().await,
            total_supply: Some(self.ledger.total_supply().await),
            paused: Some(self.faucet.is_paused()),
            minter: Some(self.ledger.minter().await),
            token_owner: Some(self.ledger.owner().await),
            faucet_owner: Some(self.faucet.owner().await),
        }
    }

    /// Load previously persisted state into the components. State whose
    /// supply is above this deployment's cap is refused and nothing is loaded.
    pub async fn restore(&self, state: &StateDelta) -> FaucetResult<()> {
        let _lock = self.tx_lock.lock().await;
        if let Some(supply) = &state.total_supply {
            let max_supply = self.ledger.max_supply();
            if supply > max_supply {
                error!("Stored total supply {} is above the configured cap {}", supply, max_supply);
                return Err(FaucetError::SupplyCapExceeded);
            }
        }
        self.apply(state).await;
        let latest_claim = state.claims.iter().map(|(_, r)| r.last_claim_at).max().unwrap_or(0);
        self.last_now.fetch_max(latest_claim, Ordering::SeqCst);
        Ok(())
    }

    /// Write a full snapshot to the sink (initial deployment).
    pub async fn persist_all(&self) -> FaucetResult<()> {
        let snapshot = self.snapshot().await;
        if let Some(sink) = &self.sink {
            sink.commit(&snapshot).await?;
        }
        Ok(())
    }

    // --- mutating surface ---

    pub async fn request_tokens(&self, caller: Address) -> FaucetResult<ClaimReceipt> {
        self.execute(caller, StateKeys::claim(caller), |ctx| async move {
            let mut events = EventLog::new();
            let result = self.faucet.request_tokens(&ctx, &mut events).await;
            (result, events)
        })
        .await
    }

    pub async fn set_paused(&self, caller: Address, paused: bool) -> FaucetResult<()> {
        self.execute(caller, StateKeys::paused(), |ctx| async move {
            let mut events = EventLog::new();
            let result = self.faucet.set_paused(&ctx.caller, paused, &mut events).await;
            (result, events)
        })
        .await
    }

    pub async fn set_minter(&self, caller: Address, minter: Address) -> FaucetResult<()> {
        self.execute(caller, StateKeys::minter(), |ctx| async move {
            let mut events = EventLog::new();
            let result = self.ledger.set_minter(&ctx.caller, minter, &mut events).await;
            (result, events)
        })
        .await
    }

    /// Direct ledger mint; only succeeds for the current minter.
    pub async fn mint(&self, caller: Address, to: Address, amount: Amount) -> FaucetResult<()> {
        self.execute(caller, StateKeys::mint(to), |ctx| async move {
            let mut events = EventLog::new();
            let result = self.ledger.mint(&ctx.caller, &to, &amount, &mut events).await;
            (result, events)
        })
        .await
    }

    pub async fn transfer_token_ownership(&self, caller: Address, new_owner: Address) -> FaucetResult<()> {
        self.execute(caller, StateKeys::token_owner(), |ctx| async move {
            let mut events = EventLog::new();
            let result = self.ledger.transfer_ownership(&ctx.caller, new_owner, &mut events).await;
            (result, events)
        })
        .await
    }

    pub async fn transfer_faucet_ownership(&self, caller: Address, new_owner: Address) -> FaucetResult<()> {
        self.execute(caller, StateKeys::faucet_owner(), |ctx| async move {
            let mut events = EventLog::new();
            let result = self.faucet.transfer_ownership(&ctx.caller, new_owner, &mut events).await;
            (result, events)
        })
        .await
    }

    // --- query surface ---

    /// Current time as the next call would see it.
    pub fn now(&self) -> u64 {
        self.clock.now().max(self.last_now.load(Ordering::SeqCst))
    }

    pub fn get_addresses(&self) -> ComponentAddresses {
        self.addresses
    }

    pub async fn balance_of(&self, address: &Address) -> Amount {
        self.ledger.balance_of(address).await
    }

    pub async fn can_claim(&self, address: &Address) -> bool {
        let now = self.now();
        self.faucet.can_claim(address, now).await
    }

    pub async fn remaining_allowance(&self, address: &Address) -> Amount {
        self.faucet.remaining_allowance(address).await
    }

    pub async fn time_until_next_claim(&self, address: &Address) -> u64 {
        let now = self.now();
        self.faucet.time_until_next_claim(address, now).await
    }

    pub async fn claim_status(&self, address: &Address) -> ClaimStatus {
        let now = self.now();
        self.faucet.claim_status(address, now).await
    }

    pub async fn ledger_info(&self) -> LedgerInfo {
        self.ledger.info().await
    }

    pub async fn faucet_info(&self) -> FaucetInfo {
        self.faucet.info().await
    }
}

/// Puts the pre-image of a call back unless the call was disarmed, including
/// when the call's future is dropped mid-flight. Holds the transaction lock
/// until the pre-image is back in place.
struct Rollback {
    ledger: Arc<TokenLedger>,
    faucet: Arc<FaucetEngine>,
    pre_image: Option<StateDelta>,
    tx: Option<OwnedMutexGuard<()>>,
}

impl Rollback {
    fn new(ledger: Arc<TokenLedger>, faucet: Arc<FaucetEngine>, pre_image: StateDelta, tx: OwnedMutexGuard<()>) -> Self {
        Self {
            ledger,
            faucet,
            pre_image: Some(pre_image),
            tx: Some(tx),
        }
    }

    /// The call committed, or failed without touching state.
    fn disarm(&mut self) {
        self.pre_image = None;
    }

    async fn restore(mut self) {
        if let Some(pre_image) = &self.pre_image {
            self.ledger.apply_delta(pre_image).await;
            self.faucet.apply_delta(pre_image).await;
        }
        self.pre_image = None;
    }
}

impl Drop for Rollback {
    fn drop(&mut self) {
        let Some(pre_image) = self.pre_image.take() else {
            return;
        };
        warn!("Call abandoned before commit, restoring state");
        if self.ledger.try_apply_delta(&pre_image) && self.faucet.try_apply_delta(&pre_image) {
            return;
        }

        // A reader holds a lock; finish on the runtime and keep the
        // transaction lock until then.
        let ledger = self.ledger.clone();
        let faucet = self.faucet.clone();
        let tx = self.tx.take();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    ledger.apply_delta(&pre_image).await;
                    faucet.apply_delta(&pre_image).await;
                    drop(tx);
                });
            }
            Err(e) => error!("Cannot restore abandoned call: {}", e),
        }
    }
}
