//! Deployment wiring: component addresses, ledger + faucet construction and
//! handing the mint capability to the faucet.

use crate::constants::{FAUCET_DEPLOY_NONCE, MAX_SUPPLY, TOKEN_DEPLOY_NONCE};
use crate::error::FaucetResult;
use crate::events::EventLog;
use crate::faucet::FaucetEngine;
use crate::ledger::{TokenLedger, TokenMetadata};
use crate::policy::ClaimPolicy;
use drip_common::types::{Address, Amount};
use rlp::RlpStream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Static identifiers of the two components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentAddresses {
    pub token: Address,
    pub faucet: Address,
}

/// Contract-creation address: `keccak256(rlp([deployer, nonce]))[12..]`.
pub fn derive_address(deployer: &Address, nonce: u64) -> Address {
    let mut stream = RlpStream::new_list(2);
    stream.append(&deployer.0.to_vec());
    stream.append(&nonce);
    let hash = keccak_hash::keccak(stream.out());

    let mut addr_bytes = [0u8; 20];
    addr_bytes.copy_from_slice(&hash.0[12..]);
    Address(addr_bytes)
}

/// Deployment parameters
#[derive(Debug, Clone)]
pub struct DeployParams {
    pub deployer: Address,
    pub metadata: TokenMetadata,
    pub max_supply: Amount,
    pub policy: ClaimPolicy,
}

impl DeployParams {
    pub fn new(deployer: Address) -> Self {
        Self {
            deployer,
            metadata: TokenMetadata::default(),
            max_supply: MAX_SUPPLY.clone(),
            policy: ClaimPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ClaimPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_supply(mut self, max_supply: Amount) -> Self {
        self.max_supply = max_supply;
        self
    }
}

/// A wired ledger + faucet pair
pub struct Deployment {
    pub ledger: Arc<TokenLedger>,
    pub faucet: Arc<FaucetEngine>,
    pub addresses: ComponentAddresses,
}

impl Deployment {
    /// Deploy the ledger, deploy the faucet against it, then have the
    /// deployer make the faucet the sole minter.
    pub async fn deploy(params: DeployParams) -> FaucetResult<Self> {
        let addresses = ComponentAddresses {
            token: derive_address(&params.deployer, TOKEN_DEPLOY_NONCE),
            faucet: derive_address(&params.deployer, FAUCET_DEPLOY_NONCE),
        };

        let ledger = Arc::new(TokenLedger::with_config(
            addresses.token,
            params.deployer,
            params.metadata,
            params.max_supply,
        ));
        let faucet = Arc::new(FaucetEngine::new(
            addresses.faucet,
            params.deployer,
            ledger.clone(),
            params.policy,
        )?);

        let mut events = EventLog::new();
        ledger
            .set_minter(&params.deployer, addresses.faucet, &mut events)
            .await?;

        info!(
            "Deployment complete: token {} faucet {} (deployer {})",
            addresses.token, addresses.faucet, params.deployer
        );
        Ok(Self {
            ledger,
            faucet,
            addresses,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_address_known_vector() {
        // CREATE address of 0x6ac7ea33f8831ea9dcc53393aaa88b25a785dbf0 at nonce 0
        let deployer: Address = "0x6ac7ea33f8831ea9dcc53393aaa88b25a785dbf0".parse().unwrap();
        assert_eq!(
            derive_address(&deployer, 0).to_string(),
            "0xcd234a471b72ba2f1ccf0a70fcaba648a5eecd8d"
        );
        assert_eq!(
            derive_address(&deployer, 1).to_string(),
            "0x343c43a37d37dff08ae8c4a11544c718abb4fcf8"
        );
    }

    #[tokio::test]
    async fn test_deploy_wires_faucet_as_minter() {
        let deployer = Address([9u8; 20]);
        let deployment = Deployment::deploy(DeployParams::new(deployer)).await.unwrap();

        assert_ne!(deployment.addresses.token, deployment.addresses.faucet);
        assert_eq!(deployment.ledger.minter().await, deployment.addresses.faucet);
        assert_eq!(deployment.faucet.token(), deployment.addresses.token);
        assert_eq!(deployment.ledger.owner().await, deployer);
        assert_eq!(deployment.faucet.owner().await, deployer);
        assert!(!deployment.faucet.is_paused());
    }
}
