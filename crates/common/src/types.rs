use num_bigint::BigUint;
use num_traits::{One, Zero};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const ADDRESS_LENGTH: usize = 20;

/// Number of decimal places folded into one display token.
pub const TOKEN_DECIMALS: u32 = 18;

/// Token amounts in base units (10^-18 of a display token).
pub type Amount = BigUint;

// --- NewTypes ---

/// Participant / component identity (20 bytes, Ethereum style).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Address(pub [u8; ADDRESS_LENGTH]);

impl Address {
    pub const ZERO: Address = Address([0u8; ADDRESS_LENGTH]);

    pub fn from_slice(bytes: &[u8]) -> Result<Self, AddressParseError> {
        if bytes.len() != ADDRESS_LENGTH {
            return Err(AddressParseError::InvalidLength(bytes.len()));
        }
        let mut arr = [0u8; ADDRESS_LENGTH];
        arr.copy_from_slice(bytes);
        Ok(Address(arr))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LENGTH]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address(0x{})", hex::encode(self.0))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Address parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressParseError {
    #[error("Invalid address length: expected 20 bytes, got {0}")]
    InvalidLength(usize),

    #[error("Invalid hex in address: {0}")]
    InvalidHex(String),
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let hex_part = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let bytes = hex::decode(hex_part).map_err(|e| AddressParseError::InvalidHex(e.to_string()))?;
        Address::from_slice(&bytes)
    }
}

impl From<[u8; ADDRESS_LENGTH]> for Address {
    fn from(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Address(bytes)
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// --- Amount helpers ---

/// Amount parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountParseError {
    #[error("Empty amount")]
    Empty,

    #[error("Invalid amount: {0}")]
    InvalidDigits(String),
}

/// 10^18, one display token in base units.
pub fn one_token() -> Amount {
    BigUint::from(10u32).pow(TOKEN_DECIMALS)
}

/// `n` display tokens expressed in base units.
pub fn tokens(n: u64) -> Amount {
    BigUint::from(n) * one_token()
}

/// Parse a decimal string of base units.
pub fn parse_amount(s: &str) -> Result<Amount, AmountParseError> {
    let s = s.trim().replace('_', "");
    if s.is_empty() {
        return Err(AmountParseError::Empty);
    }
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AmountParseError::InvalidDigits(s));
    }
    BigUint::parse_bytes(s.as_bytes(), 10).ok_or(AmountParseError::InvalidDigits(s))
}

/// Whether `amount` is representable as an unsigned 256-bit integer.
pub fn fits_u256(amount: &Amount) -> bool {
    amount.bits() <= 256
}

/// Largest unsigned 256-bit value.
pub fn u256_max() -> Amount {
    (BigUint::one() << 256u32) - BigUint::one()
}

/// Saturating `a - b` for unsigned amounts.
pub fn saturating_sub(a: &Amount, b: &Amount) -> Amount {
    if a > b {
        a - b
    } else {
        Amount::zero()
    }
}
