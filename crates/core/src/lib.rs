//! Claim-eligibility and accounting engine.
//!
//! - [`ledger`]: token balances, supply cap, minter-gated minting
//! - [`faucet`]: cooldown, lifetime cap, pause switch, mint orchestration
//! - [`runtime`]: transactional execution of calls against both

pub mod access;
pub mod clock;
pub mod constants;
pub mod deploy;
pub mod error;
pub mod events;
pub mod faucet;
pub mod guard;
pub mod ledger;
pub mod policy;
pub mod runtime;
pub mod state;

// Re-export commonly used types
pub use clock::{CallContext, Clock, ManualClock, SystemClock};
pub use deploy::{ComponentAddresses, DeployParams, Deployment};
pub use error::{FaucetError, FaucetResult};
pub use events::{DripEvent, EventLog, EventPublisher, SubscriptionFilter};
pub use faucet::{ClaimReceipt, ClaimStatus, FaucetEngine, FaucetInfo};
pub use ledger::{LedgerInfo, TokenLedger, TokenMetadata, TokenMinter};
pub use policy::{ClaimPolicy, ClaimRecord, ClaimState};
pub use runtime::DripRuntime;
pub use state::{StateDelta, StateKeys, StateSink};
