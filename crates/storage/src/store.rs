//! Sled-backed state store.
//!
//! Three trees: `balances` (address -> amount), `claims`
//! (address -> claim record) and `meta` (singleton cells). Each committed
//! call is written with one multi-tree transaction, so a crash never leaves
//! a claim record without its matching balance.

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use drip_common::types::{Address, Amount};
use drip_common::DripError;
use drip_core::{ClaimRecord, StateDelta, StateSink};
use num_traits::Zero;
use serde::de::DeserializeOwned;
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use sled::{Db, Tree};
use std::path::Path;
use tracing::{debug, info};

const BALANCES_TREE: &str = "balances";
const CLAIMS_TREE: &str = "claims";
const META_TREE: &str = "meta";

const META_DEPLOYER: &[u8] = b"deployer";
const META_TOTAL_SUPPLY: &[u8] = b"total_supply";
const META_PAUSED: &[u8] = b"paused";
const META_MINTER: &[u8] = b"minter";
const META_TOKEN_OWNER: &[u8] = b"token_owner";
const META_FAUCET_OWNER: &[u8] = b"faucet_owner";

/// Everything needed to bring a runtime back after a restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedState {
    /// Deployer the component addresses were derived from.
    pub deployer: Address,
    /// Full snapshot of every state cell.
    pub state: StateDelta,
}

/// Encoded writes for one tree; `None` removes the key.
type TreeWrites = Vec<(Vec<u8>, Option<Vec<u8>>)>;

#[derive(Clone)]
pub struct SledStateStore {
    db: Db,
    balances: Tree,
    claims: Tree,
    meta: Tree,
}

impl SledStateStore {
    /// Create or open the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        info!("Opening state store at: {}", path.as_ref().display());
        let db = sled::Config::default()
            .path(path)
            .cache_capacity(64 * 1024 * 1024)
            .open()?;
        Self::from_db(db)
    }

    /// In-memory store that disappears on drop.
    pub fn open_temporary() -> StoreResult<Self> {
        let db = sled::Config::default().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StoreResult<Self> {
        Ok(Self {
            balances: db.open_tree(BALANCES_TREE)?,
            claims: db.open_tree(CLAIMS_TREE)?,
            meta: db.open_tree(META_TREE)?,
            db,
        })
    }

    /// Deployer recorded at first start, if any.
    pub fn deployer(&self) -> StoreResult<Option<Address>> {
        self.meta
            .get(META_DEPLOYER)?
            .map(|bytes| decode_address(META_TREE, &bytes))
            .transpose()
    }

    pub fn record_deployer(&self, deployer: &Address) -> StoreResult<()> {
        self.meta.insert(META_DEPLOYER, deployer.as_bytes())?;
        Ok(())
    }

    /// Read back the whole persisted state. `None` for a store that was
    /// never initialised.
    pub fn load(&self) -> StoreResult<Option<PersistedState>> {
        let Some(deployer) = self.deployer()? else {
            return Ok(None);
        };

        let mut state = StateDelta::default();
        for item in self.balances.iter() {
            let (key, value) = item?;
            state
                .balances
                .push((decode_address(BALANCES_TREE, &key)?, bincode::deserialize(&value)?));
        }
        for item in self.claims.iter() {
            let (key, value) = item?;
            state
                .claims
                .push((decode_address(CLAIMS_TREE, &key)?, bincode::deserialize(&value)?));
        }

        state.total_supply = self.get_meta::<Amount>(META_TOTAL_SUPPLY)?;
        state.paused = self.get_meta::<bool>(META_PAUSED)?;
        state.minter = self.get_meta_address(META_MINTER)?;
        state.token_owner = self.get_meta_address(META_TOKEN_OWNER)?;
        state.faucet_owner = self.get_meta_address(META_FAUCET_OWNER)?;

        debug!(
            "Loaded {} balances and {} claim records",
            state.balances.len(),
            state.claims.len()
        );
        Ok(Some(PersistedState { deployer, state }))
    }

    /// Write one delta atomically across all trees. Zero balances and empty
    /// claim records are removed rather than stored.
    pub fn apply(&self, delta: &StateDelta) -> StoreResult<()> {
        if delta.is_empty() {
            return Ok(());
        }

        let mut balance_writes: TreeWrites = Vec::with_capacity(delta.balances.len());
        for (address, balance) in &delta.balances {
            let value = if balance.is_zero() {
                None
            } else {
                Some(bincode::serialize(balance)?)
            };
            balance_writes.push((address.as_bytes().to_vec(), value));
        }

        let mut claim_writes: TreeWrites = Vec::with_capacity(delta.claims.len());
        for (address, record) in &delta.claims {
            let value = if record.is_empty() {
                None
            } else {
                Some(bincode::serialize::<ClaimRecord>(record)?)
            };
            claim_writes.push((address.as_bytes().to_vec(), value));
        }

        let mut meta_writes: TreeWrites = Vec::new();
        if let Some(supply) = &delta.total_supply {
            meta_writes.push((META_TOTAL_SUPPLY.to_vec(), Some(bincode::serialize(supply)?)));
        }
        if let Some(paused) = delta.paused {
            meta_writes.push((META_PAUSED.to_vec(), Some(bincode::serialize(&paused)?)));
        }
        for (key, address) in [
            (META_MINTER, delta.minter),
            (META_TOKEN_OWNER, delta.token_owner),
            (META_FAUCET_OWNER, delta.faucet_owner),
        ] {
            if let Some(address) = address {
                meta_writes.push((key.to_vec(), Some(address.as_bytes().to_vec())));
            }
        }

        (&self.balances, &self.claims, &self.meta)
            .transaction(|(balances, claims, meta)| {
                for (tree, writes) in [
                    (balances, &balance_writes),
                    (claims, &claim_writes),
                    (meta, &meta_writes),
                ] {
                    for (key, value) in writes {
                        match value {
                            Some(value) => {
                                tree.insert(key.as_slice(), value.as_slice())?;
                            }
                            None => {
                                tree.remove(key.as_slice())?;
                            }
                        }
                    }
                }
                Ok::<(), ConflictableTransactionError<()>>(())
            })
            .map_err(|e| match e {
                TransactionError::Storage(e) => StoreError::Database(e),
                TransactionError::Abort(()) => StoreError::Task("transaction aborted".to_string()),
            })?;

        debug!(
            "Applied delta: {} balances, {} claims, {} meta cells",
            balance_writes.len(),
            claim_writes.len(),
            meta_writes.len()
        );
        Ok(())
    }

    pub async fn flush(&self) -> StoreResult<()> {
        self.db.flush_async().await?;
        Ok(())
    }

    fn get_meta<T: DeserializeOwned>(&self, key: &[u8]) -> StoreResult<Option<T>> {
        match self.meta.get(key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn get_meta_address(&self, key: &[u8]) -> StoreResult<Option<Address>> {
        self.meta
            .get(key)?
            .map(|bytes| decode_address(META_TREE, &bytes))
            .transpose()
    }
}

fn decode_address(tree: &'static str, bytes: &[u8]) -> StoreResult<Address> {
    Address::from_slice(bytes).map_err(|e| StoreError::Corrupt {
        tree,
        reason: e.to_string(),
    })
}

#[async_trait]
impl StateSink for SledStateStore {
    async fn commit(&self, delta: &StateDelta) -> Result<(), DripError> {
        let store = self.clone();
        let delta = delta.clone();

        // sled writes block; keep them off the runtime threads
        tokio::task::spawn_blocking(move || store.apply(&delta))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))??;
        Ok(())
    }
}
