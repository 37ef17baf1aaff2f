//! HTTP API for faucet service

use crate::auth::{CALLER_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use crate::error::{ApiError, ApiResult};
use crate::service::{BalanceResponse, ClaimResponse, ClaimStatusResponse, FaucetService, FaucetStatus};
use axum::{
    body::Bytes,
    extract::{ConnectInfo, Path, State},
    http::{header, HeaderMap, HeaderValue, Method, Uri},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use drip_common::types::Address;
use drip_core::ComponentAddresses;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Success response
#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse<T> {
    pub data: T,
    pub timestamp: String,
}

impl<T> SuccessResponse<T> {
    fn new(data: T) -> Json<Self> {
        Json(Self {
            data,
            timestamp: chrono::Utc::now().to_rfc3339(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct PauseRequest {
    pub paused: bool,
}

#[derive(Debug, Deserialize)]
pub struct MinterRequest {
    pub minter: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PauseResponse {
    pub paused: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MinterResponse {
    pub minter: Address,
}

/// Build the router with tracing and, if enabled, CORS.
pub fn router(service: Arc<FaucetService>) -> Router {
    let cors = cors_layer(&service.config().allowed_origins);
    let cors_enabled = service.config().cors_enabled;

    let mut app = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/status", get(status_handler))
        .route("/api/addresses", get(addresses_handler))
        .route("/api/balance/:address", get(balance_handler))
        .route("/api/claim/:address", get(claim_status_handler))
        .route("/api/claim", post(claim_handler))
        .route("/api/admin/pause", post(pause_handler))
        .route("/api/admin/minter", post(minter_handler))
        .with_state(service)
        .layer(TraceLayer::new_for_http());

    if cors_enabled {
        app = app.layer(cors);
        info!("CORS enabled");
    }
    app
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();
    layer.allow_origin(origins)
}

fn parse_address(raw: &str) -> ApiResult<Address> {
    raw.trim()
        .parse::<Address>()
        .map_err(|e| ApiError::InvalidAddress(format!("{}: {}", raw, e)))
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> ApiResult<T> {
    serde_json::from_slice(body).map_err(|e| ApiError::InvalidRequest(e.to_string()))
}

/// Claim handler
pub async fn claim_handler(
    State(service): State<Arc<FaucetService>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<SuccessResponse<ClaimResponse>>> {
    let caller = service.authenticate(method.as_str(), uri.path(), &headers, &body).await?;
    let response = service.claim(caller, addr.ip()).await?;
    Ok(SuccessResponse::new(response))
}

pub async fn claim_status_handler(
    State(service): State<Arc<FaucetService>>,
    Path(address): Path<String>,
) -> ApiResult<Json<SuccessResponse<ClaimStatusResponse>>> {
    let address = parse_address(&address)?;
    Ok(SuccessResponse::new(service.claim_status(&address).await))
}

pub async fn balance_handler(
    State(service): State<Arc<FaucetService>>,
    Path(address): Path<String>,
) -> ApiResult<Json<SuccessResponse<BalanceResponse>>> {
    let address = parse_address(&address)?;
    Ok(SuccessResponse::new(service.balance(&address).await))
}

pub async fn addresses_handler(State(service): State<Arc<FaucetService>>) -> Json<SuccessResponse<ComponentAddresses>> {
    SuccessResponse::new(service.addresses())
}

/// Status handler
pub async fn status_handler(State(service): State<Arc<FaucetService>>) -> Json<SuccessResponse<FaucetStatus>> {
    SuccessResponse::new(service.status().await)
}

pub async fn pause_handler(
    State(service): State<Arc<FaucetService>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<SuccessResponse<PauseResponse>>> {
    let caller = service.authenticate(method.as_str(), uri.path(), &headers, &body).await?;
    let request: PauseRequest = parse_body(&body)?;
    let paused = service.set_paused(caller, request.paused).await?;
    Ok(SuccessResponse::new(PauseResponse { paused }))
}

pub async fn minter_handler(
    State(service): State<Arc<FaucetService>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<SuccessResponse<MinterResponse>>> {
    let caller = service.authenticate(method.as_str(), uri.path(), &headers, &body).await?;
    let request: MinterRequest = parse_body(&body)?;
    let minter = parse_address(&request.minter)?;
    let minter = service.set_minter(caller, minter).await?;
    Ok(SuccessResponse::new(MinterResponse { minter }))
}

pub async fn metrics_handler(State(service): State<Arc<FaucetService>>) -> ApiResult<impl IntoResponse> {
    let body = service.render_metrics()?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Root handler with info
pub async fn root_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "Drip Faucet",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Rate-limited token faucet with cooldown and lifetime cap",
        "authentication": {
            "signature_header": SIGNATURE_HEADER,
            "timestamp_header": TIMESTAMP_HEADER,
            "caller_header": CALLER_HEADER,
            "message": "keccak256(\"drip:\" METHOD \" \" PATH \":\" TIMESTAMP \":\" BODY), signed with secp256k1 as r||s||v"
        },
        "endpoints": {
            "GET /api/addresses": "Token and faucet addresses",
            "GET /api/balance/:address": "Token balance",
            "GET /api/claim/:address": "Claim eligibility",
            "POST /api/claim": "Claim tokens for the signer",
            "POST /api/admin/pause": "Pause or unpause (owner)",
            "POST /api/admin/minter": "Change the token minter (token owner)",
            "GET /api/status": "Token and faucet status",
            "GET /health": "Health check",
            "GET /metrics": "Prometheus metrics"
        }
    }))
}
