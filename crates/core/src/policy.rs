//! Claim-eligibility rules.
//!
//! Pure functions over a participant's [`ClaimRecord`]; the faucet engine
//! owns the records and the pause flag.

use crate::constants::{CLAIM_AMOUNT, COOLDOWN_SECONDS, MAX_LIFETIME_CLAIM};
use crate::error::{FaucetError, FaucetResult};
use drip_common::types::{fits_u256, saturating_sub, Amount};
use num_traits::Zero;
use serde::{Deserialize, Serialize};

/// Per-participant faucet accounting. The zero value means "never claimed".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRecord {
    /// Timestamp of the last successful claim, 0 if none.
    pub last_claim_at: u64,
    /// Cumulative base units claimed.
    pub total_claimed: Amount,
}

impl ClaimRecord {
    /// Every successful claim adds a non-zero amount, so this also covers a
    /// claim processed at timestamp 0.
    pub fn has_claimed(&self) -> bool {
        !self.total_claimed.is_zero()
    }

    pub fn is_empty(&self) -> bool {
        self.last_claim_at == 0 && !self.has_claimed()
    }
}

/// Where a participant currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimState {
    Eligible,
    CoolingDown,
    /// Terminal: another full claim would exceed the lifetime cap.
    Capped,
    /// Faucet paused; overrides every other state.
    Suspended,
}

/// Claim amount, lifetime cap and cooldown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimPolicy {
    pub claim_amount: Amount,
    pub max_lifetime_claim: Amount,
    pub cooldown_secs: u64,
}

impl Default for ClaimPolicy {
    fn default() -> Self {
        Self {
            claim_amount: CLAIM_AMOUNT.clone(),
            max_lifetime_claim: MAX_LIFETIME_CLAIM.clone(),
            cooldown_secs: COOLDOWN_SECONDS,
        }
    }
}

impl ClaimPolicy {
    pub fn validate(&self) -> FaucetResult<()> {
        if self.claim_amount.is_zero() {
            return Err(FaucetError::InvalidPolicy("claim amount must be non-zero".to_string()));
        }
        if self.claim_amount > self.max_lifetime_claim {
            return Err(FaucetError::InvalidPolicy(
                "claim amount exceeds the lifetime cap".to_string(),
            ));
        }
        if !fits_u256(&self.max_lifetime_claim) {
            return Err(FaucetError::InvalidPolicy(
                "lifetime cap does not fit in 256 bits".to_string(),
            ));
        }
        Ok(())
    }

    /// Seconds left before `record` may claim again; 0 if never claimed.
    pub fn cooldown_remaining(&self, record: &ClaimRecord, now: u64) -> u64 {
        if !record.has_claimed() {
            return 0;
        }
        let elapsed = now.saturating_sub(record.last_claim_at);
        self.cooldown_secs.saturating_sub(elapsed)
    }

    pub fn remaining_allowance(&self, record: &ClaimRecord) -> Amount {
        saturating_sub(&self.max_lifetime_claim, &record.total_claimed)
    }

    /// True once a full claim no longer fits under the cap.
    pub fn is_capped(&self, record: &ClaimRecord) -> bool {
        &record.total_claimed + &self.claim_amount > self.max_lifetime_claim
    }

    /// Cooldown then cap, in that order. Pause is checked by the engine.
    pub fn check(&self, record: &ClaimRecord, now: u64) -> FaucetResult<()> {
        let remaining_secs = self.cooldown_remaining(record, now);
        if remaining_secs > 0 {
            return Err(FaucetError::CooldownActive { remaining_secs });
        }
        if self.is_capped(record) {
            return Err(FaucetError::LifetimeCapReached);
        }
        Ok(())
    }

    pub fn classify(&self, record: &ClaimRecord, now: u64, paused: bool) -> ClaimState {
        if paused {
            ClaimState::Suspended
        } else if self.is_capped(record) {
            ClaimState::Capped
        } else if self.cooldown_remaining(record, now) > 0 {
            ClaimState::CoolingDown
        } else {
            ClaimState::Eligible
        }
    }

    /// The record after a successful claim at `now`.
    pub fn advance(&self, record: &ClaimRecord, now: u64) -> ClaimRecord {
        ClaimRecord {
            last_claim_at: now,
            total_claimed: &record.total_claimed + &self.claim_amount,
        }
    }
}
