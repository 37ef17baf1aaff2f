//! Durable storage for ledger and faucet state.

pub mod error;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use store::{PersistedState, SledStateStore};
