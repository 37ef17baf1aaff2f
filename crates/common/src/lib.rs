//! Shared primitives for the drip faucet workspace: identities, token
//! amounts, ambient errors, logging and configuration helpers.

pub mod error;
pub mod types;
pub mod utils;

pub use error::{DripError, Result};
pub use types::{Address, Amount};
