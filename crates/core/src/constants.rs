//! Token and claim-policy constants.
//!
//! All amounts are base units (18 decimals folded into the integer).

use drip_common::types::{tokens, Amount};
use once_cell::sync::Lazy;

pub const TOKEN_NAME: &str = "Faucet Token";
pub const TOKEN_SYMBOL: &str = "FCT";
pub const TOKEN_DECIMALS: u8 = 18;

pub const CLAIM_AMOUNT_TOKENS: u64 = 10;
pub const MAX_LIFETIME_CLAIM_TOKENS: u64 = 100;
pub const MAX_SUPPLY_TOKENS: u64 = 100_000_000;

/// Minimum seconds between two successful claims by the same participant.
pub const COOLDOWN_SECONDS: u64 = 86_400;

/// Tokens minted per successful claim (10e18).
pub static CLAIM_AMOUNT: Lazy<Amount> = Lazy::new(|| tokens(CLAIM_AMOUNT_TOKENS));

/// Lifetime cap per participant (100e18).
pub static MAX_LIFETIME_CLAIM: Lazy<Amount> = Lazy::new(|| tokens(MAX_LIFETIME_CLAIM_TOKENS));

/// Global supply cap (1e8 tokens).
pub static MAX_SUPPLY: Lazy<Amount> = Lazy::new(|| tokens(MAX_SUPPLY_TOKENS));

/// Deployer nonces used to derive component addresses.
pub const TOKEN_DEPLOY_NONCE: u64 = 0;
pub const FAUCET_DEPLOY_NONCE: u64 = 1;
