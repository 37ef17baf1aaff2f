//! HTTP faucet service
//!
//! Exposes the claim engine over HTTP with:
//! - Signed requests: the caller is the recovered secp256k1 signer
//! - Per-IP rate limiting in front of the cooldown and lifetime cap
//! - Durable state in sled, restored on restart
//! - Prometheus metrics

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;
pub mod service;

pub use api::router;
pub use auth::RequestAuthenticator;
pub use config::FaucetServiceConfig;
pub use error::{ApiError, ApiResult};
pub use metrics::FaucetMetrics;
pub use service::{
    BalanceResponse, ClaimResponse, ClaimStatusResponse, FaucetDetails, FaucetService, FaucetStatus,
    TokenStatus,
};
