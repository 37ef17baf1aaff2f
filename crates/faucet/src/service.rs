//! Faucet service core logic

use crate::auth::RequestAuthenticator;
use crate::config::FaucetServiceConfig;
use crate::error::{ApiError, ApiResult};
use crate::metrics::FaucetMetrics;
use axum::http::HeaderMap;
use drip_common::types::Address;
use drip_common::{DripError, Result};
use drip_core::{
    ClaimReceipt, ClaimState, ClaimStatus, Clock, ComponentAddresses, DripRuntime, SystemClock,
};
use drip_storage::SledStateStore;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Rate limiter using governor crate
type RateLimiterImpl = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

const RATE_LIMIT_WINDOW_SECS: u64 = 3600;

/// Faucet service
pub struct FaucetService {
    config: FaucetServiceConfig,
    runtime: Arc<DripRuntime>,
    store: SledStateStore,
    metrics: FaucetMetrics,
    auth: RequestAuthenticator,
    ip_rate_limiters: moka::future::Cache<IpAddr, Arc<RateLimiterImpl>>,
}

impl FaucetService {
    /// Open the store at `config.db_path` and bring the components up.
    pub async fn open(config: FaucetServiceConfig) -> Result<Self> {
        let store = SledStateStore::open(&config.db_path)?;
        Self::with_store(config, store, Arc::new(SystemClock)).await
    }

    /// Service over a throwaway store.
    pub async fn in_memory(config: FaucetServiceConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let store = SledStateStore::open_temporary()?;
        Self::with_store(config, store, clock).await
    }

    /// Restore persisted state from `store`, or deploy fresh components and
    /// persist them if the store is empty.
    pub async fn with_store(config: FaucetServiceConfig, store: SledStateStore, clock: Arc<dyn Clock>) -> Result<Self> {
        let mut params = config.deploy_params()?;
        let persisted = store.load()?;

        if let Some(persisted) = &persisted {
            if persisted.deployer != params.deployer {
                warn!(
                    "Configured deployer {} differs from stored deployer {}, keeping the stored one",
                    params.deployer, persisted.deployer
                );
                params.deployer = persisted.deployer;
            }
        }

        let runtime = DripRuntime::deploy(params, clock)
            .await
            .map_err(|e| DripError::Internal(e.to_string()))?
            .with_sink(Arc::new(store.clone()));

        match persisted {
            Some(persisted) => {
                runtime.restore(&persisted.state).await.map_err(|e| {
                    DripError::Config(format!(
                        "stored state does not fit max_supply {}: {}",
                        runtime.ledger().max_supply(),
                        e
                    ))
                })?;
                info!(
                    "Restored {} holders and {} participants",
                    persisted.state.balances.len(),
                    persisted.state.claims.len()
                );
            }
            None => {
                store.record_deployer(&runtime.ledger().owner().await)?;
                runtime
                    .persist_all()
                    .await
                    .map_err(|e| DripError::Storage(e.to_string()))?;
                info!("Initialised fresh state store");
            }
        }

        let metrics = FaucetMetrics::new().map_err(|e| DripError::Internal(e.to_string()))?;
        metrics.set_paused(runtime.faucet().is_paused());
        metrics.set_total_supply(&runtime.ledger().total_supply().await);

        let addresses = runtime.get_addresses();
        info!("Token at {}, faucet at {}", addresses.token, addresses.faucet);

        let auth = RequestAuthenticator::new(config.auth_max_skew_secs);

        Ok(Self {
            config,
            runtime: Arc::new(runtime),
            store,
            metrics,
            auth,
            // Cache 10k IPs
            ip_rate_limiters: moka::future::Cache::new(10_000),
        })
    }

    pub fn runtime(&self) -> &Arc<DripRuntime> {
        &self.runtime
    }

    pub fn config(&self) -> &FaucetServiceConfig {
        &self.config
    }

    pub fn metrics(&self) -> &FaucetMetrics {
        &self.metrics
    }

    /// Caller identity of a signed request, checked against the runtime clock.
    pub async fn authenticate(&self, method: &str, path: &str, headers: &HeaderMap, body: &[u8]) -> ApiResult<Address> {
        self.auth
            .authenticate(method, path, headers, body, self.runtime.now())
            .await
            .map_err(|e| {
                self.metrics.record_rejection(e.code());
                e
            })
    }

    /// Claim for `caller`, after the per-IP rate limit.
    pub async fn claim(&self, caller: Address, ip_addr: IpAddr) -> ApiResult<ClaimResponse> {
        info!("Claim request for {} from {}", caller, ip_addr);
        self.check_rate_limit(&ip_addr).await?;

        match self.runtime.request_tokens(caller).await {
            Ok(receipt) => {
                self.metrics.claims_total.inc();
                self.metrics
                    .set_total_supply(&self.runtime.ledger().total_supply().await);
                Ok(ClaimResponse::from(receipt))
            }
            Err(e) => {
                self.metrics.record_rejection(e.code());
                Err(e.into())
            }
        }
    }

    async fn check_rate_limit(&self, ip_addr: &IpAddr) -> ApiResult<()> {
        let per_hour = NonZeroU32::new(self.config.max_requests_per_hour).unwrap_or(NonZeroU32::MIN);
        let ip_limiter = self
            .ip_rate_limiters
            .get_with(*ip_addr, async move { Arc::new(RateLimiter::direct(Quota::per_hour(per_hour))) })
            .await;

        ip_limiter.check().map_err(|_| {
            warn!("Rate limit hit for {}", ip_addr);
            self.metrics.rate_limited_total.inc();
            ApiError::RateLimitExceeded(RATE_LIMIT_WINDOW_SECS / u64::from(per_hour.get()))
        })?;

        debug!("Rate limit passed for IP: {}", ip_addr);
        Ok(())
    }

    pub async fn claim_status(&self, address: &Address) -> ClaimStatusResponse {
        self.runtime.claim_status(address).await.into()
    }

    pub async fn balance(&self, address: &Address) -> BalanceResponse {
        let metadata = self.runtime.ledger().metadata();
        BalanceResponse {
            address: *address,
            balance: self.runtime.balance_of(address).await.to_string(),
            symbol: metadata.symbol.clone(),
            decimals: metadata.decimals,
        }
    }

    pub fn addresses(&self) -> ComponentAddresses {
        self.runtime.get_addresses()
    }

    pub async fn set_paused(&self, caller: Address, paused: bool) -> ApiResult<bool> {
        self.runtime.set_paused(caller, paused).await?;
        self.metrics.set_paused(paused);
        Ok(paused)
    }

    pub async fn set_minter(&self, caller: Address, minter: Address) -> ApiResult<Address> {
        self.runtime.set_minter(caller, minter).await?;
        Ok(minter)
    }

    pub async fn status(&self) -> FaucetStatus {
        let ledger = self.runtime.ledger_info().await;
        let faucet = self.runtime.faucet_info().await;
        FaucetStatus {
            token: TokenStatus {
                address: ledger.address,
                name: ledger.metadata.name,
                symbol: ledger.metadata.symbol,
                decimals: ledger.metadata.decimals,
                total_supply: ledger.total_supply.to_string(),
                max_supply: ledger.max_supply.to_string(),
                minter: ledger.minter,
                owner: ledger.owner,
            },
            faucet: FaucetDetails {
                address: faucet.address,
                token: faucet.token,
                owner: faucet.owner,
                paused: faucet.paused,
                claim_amount: faucet.policy.claim_amount.to_string(),
                max_lifetime_claim: faucet.policy.max_lifetime_claim.to_string(),
                cooldown_secs: faucet.policy.cooldown_secs,
            },
        }
    }

    pub fn render_metrics(&self) -> ApiResult<String> {
        self.metrics
            .gather()
            .map_err(|e| ApiError::Internal(e.to_string()))
    }

    /// Flush pending writes to disk.
    pub async fn shutdown(&self) -> Result<()> {
        self.store.flush().await?;
        info!("State store flushed");
        Ok(())
    }
}

/// Claim response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimResponse {
    pub claimant: Address,
    pub amount: String,
    pub timestamp: u64,
}

impl From<ClaimReceipt> for ClaimResponse {
    fn from(receipt: ClaimReceipt) -> Self {
        Self {
            claimant: receipt.claimant,
            amount: receipt.amount.to_string(),
            timestamp: receipt.timestamp,
        }
    }
}

/// Per-participant eligibility, amounts as decimal strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimStatusResponse {
    pub address: Address,
    pub state: ClaimState,
    pub can_claim: bool,
    pub last_claim_at: u64,
    pub total_claimed: String,
    pub remaining_allowance: String,
    pub time_until_next_claim: u64,
}

impl From<ClaimStatus> for ClaimStatusResponse {
    fn from(status: ClaimStatus) -> Self {
        Self {
            address: status.address,
            state: status.state,
            can_claim: status.can_claim,
            last_claim_at: status.last_claim_at,
            total_claimed: status.total_claimed.to_string(),
            remaining_allowance: status.remaining_allowance.to_string(),
            time_until_next_claim: status.time_until_next_claim,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub address: Address,
    pub balance: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Faucet status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaucetStatus {
    pub token: TokenStatus,
    pub faucet: FaucetDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenStatus {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: String,
    pub max_supply: String,
    pub minter: Address,
    pub owner: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaucetDetails {
    pub address: Address,
    pub token: Address,
    pub owner: Address,
    pub paused: bool,
    pub claim_amount: String,
    pub max_lifetime_claim: String,
    pub cooldown_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use drip_common::types::tokens;
    use drip_core::{FaucetError, ManualClock};
    use std::net::Ipv4Addr;

    fn localhost() -> IpAddr {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    }

    async fn service(config: FaucetServiceConfig) -> (FaucetService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000));
        let service = FaucetService::in_memory(config, clock.clone()).await.unwrap();
        (service, clock)
    }

    #[tokio::test]
    async fn test_claim_updates_metrics() {
        let (service, _) = service(FaucetServiceConfig::default()).await;
        let user = Address([7u8; 20]);

        let response = service.claim(user, localhost()).await.unwrap();
        assert_eq!(response.amount, tokens(10).to_string());

        let err = service.claim(user, localhost()).await.unwrap_err();
        assert_eq!(err.code(), "COOLDOWN_ACTIVE");

        let text = service.render_metrics().unwrap();
        assert!(text.contains("drip_claims_total 1"));
        assert!(text.contains("drip_total_supply_tokens 10"));
        assert!(text.contains("reason=\"COOLDOWN_ACTIVE\""));
    }

    #[tokio::test]
    async fn test_rate_limit_per_ip() {
        let config = FaucetServiceConfig {
            max_requests_per_hour: 2,
            ..Default::default()
        };
        let (service, _) = service(config).await;

        service.claim(Address([1u8; 20]), localhost()).await.unwrap();
        service.claim(Address([2u8; 20]), localhost()).await.unwrap();
        let err = service.claim(Address([3u8; 20]), localhost()).await.unwrap_err();
        assert!(matches!(err, ApiError::RateLimitExceeded(1800)));

        // other IPs have their own budget
        let other = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        service.claim(Address([3u8; 20]), other).await.unwrap();
    }

    #[tokio::test]
    async fn test_status_reports_wiring() {
        let (service, _) = service(FaucetServiceConfig::default()).await;
        let status = service.status().await;
        let addresses = service.addresses();

        assert_eq!(status.token.address, addresses.token);
        assert_eq!(status.token.minter, addresses.faucet);
        assert_eq!(status.token.symbol, "FCT");
        assert_eq!(status.faucet.token, addresses.token);
        assert!(!status.faucet.paused);
        assert_eq!(status.faucet.cooldown_secs, 86_400);
    }

    #[tokio::test]
    async fn test_restart_keeps_state() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = FaucetServiceConfig {
            db_path: dir.path().to_string_lossy().into_owned(),
            ..Default::default()
        };
        let user = Address([9u8; 20]);
        let owner = config.deployer_address().unwrap();

        {
            let store = SledStateStore::open(&config.db_path).unwrap();
            let service = FaucetService::with_store(config.clone(), store, Arc::new(ManualClock::new(500)))
                .await
                .unwrap();
            service.claim(user, localhost()).await.unwrap();
            service.set_paused(owner, true).await.unwrap();
            service.shutdown().await.unwrap();
        }

        let store = SledStateStore::open(&config.db_path).unwrap();
        let service = FaucetService::with_store(config, store, Arc::new(ManualClock::new(600)))
            .await
            .unwrap();
        assert_eq!(service.balance(&user).await.balance, tokens(10).to_string());
        assert!(service.status().await.faucet.paused);
        let status = service.claim_status(&user).await;
        assert_eq!(status.state, ClaimState::Suspended);
        assert_eq!(status.last_claim_at, 500);

        let err = service.claim(user, localhost()).await.unwrap_err();
        assert!(matches!(err, ApiError::Faucet(FaucetError::Paused)));
    }

    #[tokio::test]
    async fn test_restart_with_smaller_max_supply_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = FaucetServiceConfig {
            db_path: dir.path().to_string_lossy().into_owned(),
            ..Default::default()
        };
        {
            let store = SledStateStore::open(&config.db_path).unwrap();
            let service = FaucetService::with_store(config.clone(), store, Arc::new(ManualClock::new(500)))
                .await
                .unwrap();
            service.claim(Address([9u8; 20]), localhost()).await.unwrap();
            service.shutdown().await.unwrap();
        }

        let shrunk = FaucetServiceConfig {
            max_supply: Some(tokens(5).to_string()),
            ..config
        };
        let store = SledStateStore::open(&shrunk.db_path).unwrap();
        let err = FaucetService::with_store(shrunk, store, Arc::new(ManualClock::new(600)))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, DripError::Config(_)));
    }

    #[tokio::test]
    async fn test_admin_requires_owner() {
        let (service, _) = service(FaucetServiceConfig::default()).await;
        let stranger = Address([5u8; 20]);
        let err = service.set_paused(stranger, true).await.unwrap_err();
        assert_eq!(err.code(), "UNAUTHORIZED");
        assert!(!service.status().await.faucet.paused);
    }
}
