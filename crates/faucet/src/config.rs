//! Faucet service configuration

use drip_common::types::{parse_amount, Address, Amount};
use drip_common::utils::logging::LoggingConfig;
use drip_common::{DripError, Result};
use drip_core::constants::MAX_SUPPLY;
use drip_core::{ClaimPolicy, DeployParams};
use serde::{Deserialize, Serialize};

/// Faucet service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaucetServiceConfig {
    /// Server address
    pub server_addr: String,

    /// Enable CORS
    pub cors_enabled: bool,

    /// Allowed origins ("*" for any)
    pub allowed_origins: Vec<String>,

    /// Database path
    pub db_path: String,

    /// Rate limit: maximum HTTP claim requests per IP per hour
    pub max_requests_per_hour: u32,

    /// Deployer and initial owner of both components
    pub deployer: String,

    /// Accepted distance between a signed request's timestamp and now (seconds)
    pub auth_max_skew_secs: u64,

    /// Amount per claim (base units, decimal); `None` keeps the default
    pub claim_amount: Option<String>,

    /// Lifetime cap per participant (base units, decimal)
    pub max_lifetime_claim: Option<String>,

    /// Cooldown between claims (seconds)
    pub cooldown_secs: Option<u64>,

    /// Token supply cap (base units, decimal)
    pub max_supply: Option<String>,

    /// Logging
    pub logging: LoggingConfig,
}

impl Default for FaucetServiceConfig {
    fn default() -> Self {
        Self {
            server_addr: "0.0.0.0:3000".to_string(),
            cors_enabled: true,
            allowed_origins: vec!["*".to_string()],
            db_path: "./drip_data".to_string(),
            max_requests_per_hour: 30,
            // first account of a local development node
            deployer: "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266".to_string(),
            auth_max_skew_secs: 300,
            claim_amount: None,
            max_lifetime_claim: None,
            cooldown_secs: None,
            max_supply: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl FaucetServiceConfig {
    /// Load from environment variables with defaults
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `DRIP_*` environment variables on top of `self`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(addr) = std::env::var("DRIP_SERVER_ADDR") {
            self.server_addr = addr;
        }

        if let Ok(enabled) = std::env::var("DRIP_CORS_ENABLED") {
            self.cors_enabled = enabled.to_lowercase() == "true";
        }

        if let Ok(origins) = std::env::var("DRIP_ALLOWED_ORIGINS") {
            self.allowed_origins = origins.split(',').map(|o| o.trim().to_string()).collect();
        }

        if let Ok(db_path) = std::env::var("DRIP_DB_PATH") {
            self.db_path = db_path;
        }

        if let Ok(max_req) = std::env::var("DRIP_MAX_REQUESTS_PER_HOUR") {
            self.max_requests_per_hour = max_req.parse().unwrap_or(self.max_requests_per_hour);
        }

        if let Ok(deployer) = std::env::var("DRIP_DEPLOYER") {
            self.deployer = deployer;
        }

        if let Ok(skew) = std::env::var("DRIP_AUTH_MAX_SKEW_SECS") {
            self.auth_max_skew_secs = skew.parse().unwrap_or(self.auth_max_skew_secs);
        }

        if let Ok(amount) = std::env::var("DRIP_CLAIM_AMOUNT") {
            self.claim_amount = Some(amount);
        }

        if let Ok(cap) = std::env::var("DRIP_MAX_LIFETIME_CLAIM") {
            self.max_lifetime_claim = Some(cap);
        }

        if let Ok(cooldown) = std::env::var("DRIP_COOLDOWN_SECS") {
            self.cooldown_secs = cooldown.parse().ok().or(self.cooldown_secs);
        }

        if let Ok(supply) = std::env::var("DRIP_MAX_SUPPLY") {
            self.max_supply = Some(supply);
        }

        if let Ok(level) = std::env::var("DRIP_LOG_LEVEL") {
            self.logging.level = level;
        }

        self
    }

    pub fn deployer_address(&self) -> Result<Address> {
        Ok(self.deployer.parse::<Address>()?)
    }

    /// Claim policy with configured overrides applied.
    pub fn policy(&self) -> Result<ClaimPolicy> {
        let mut policy = ClaimPolicy::default();
        if let Some(amount) = &self.claim_amount {
            policy.claim_amount = parse_amount(amount)?;
        }
        if let Some(cap) = &self.max_lifetime_claim {
            policy.max_lifetime_claim = parse_amount(cap)?;
        }
        if let Some(cooldown) = self.cooldown_secs {
            policy.cooldown_secs = cooldown;
        }
        policy
            .validate()
            .map_err(|e| DripError::Config(e.to_string()))?;
        Ok(policy)
    }

    pub fn max_supply(&self) -> Result<Amount> {
        match &self.max_supply {
            Some(supply) => Ok(parse_amount(supply)?),
            None => Ok(MAX_SUPPLY.clone()),
        }
    }

    /// Everything needed to deploy the ledger and faucet.
    pub fn deploy_params(&self) -> Result<DeployParams> {
        Ok(DeployParams::new(self.deployer_address()?)
            .with_policy(self.policy()?)
            .with_max_supply(self.max_supply()?))
    }
}
