//! Signed request authentication
//!
//! Mutating routes carry a secp256k1 signature over
//! `keccak256("drip:" METHOD " " PATH ":" TIMESTAMP ":" BODY)` in
//! [`SIGNATURE_HEADER`] (`0x` + hex of `r || s || v`) and the signing time in
//! [`TIMESTAMP_HEADER`]. The recovered signer is the caller.

use crate::error::{ApiError, ApiResult};
use axum::http::HeaderMap;
use drip_common::types::Address;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use std::time::Duration;
use tracing::{debug, warn};

pub const SIGNATURE_HEADER: &str = "x-drip-signature";
pub const TIMESTAMP_HEADER: &str = "x-drip-timestamp";
/// Optional; when present it must name the signer.
pub const CALLER_HEADER: &str = "x-caller";

/// Digest a caller signs for one request.
pub fn request_digest(method: &str, path: &str, timestamp: u64, body: &[u8]) -> [u8; 32] {
    let mut preimage = format!("drip:{} {}:{}:", method, path, timestamp).into_bytes();
    preimage.extend_from_slice(body);
    keccak_hash::keccak(&preimage).0
}

/// Account address of a public key
pub fn address_of(key: &VerifyingKey) -> Address {
    let pub_key_bytes = key.to_encoded_point(false);
    let hash = keccak_hash::keccak(&pub_key_bytes.as_bytes()[1..]); // Skip first byte
    let mut addr_bytes = [0u8; 20];
    addr_bytes.copy_from_slice(&hash.0[12..]);
    Address(addr_bytes)
}

/// Value for [`SIGNATURE_HEADER`].
pub fn sign_request(key: &SigningKey, method: &str, path: &str, timestamp: u64, body: &[u8]) -> ApiResult<String> {
    let digest = request_digest(method, path, timestamp, body);
    let (signature, recovery_id) = key
        .sign_prehash_recoverable(&digest)
        .map_err(|e| ApiError::Internal(format!("Signing failed: {}", e)))?;

    let mut bytes = signature.to_bytes().to_vec();
    bytes.push(recovery_id.to_byte());
    Ok(format!("0x{}", hex::encode(bytes)))
}

/// Recover the address that produced `signature` over `digest`.
pub fn recover_signer(digest: &[u8; 32], signature: &str) -> ApiResult<Address> {
    let raw = hex::decode(signature.trim().trim_start_matches("0x"))
        .map_err(|e| ApiError::Unauthenticated(format!("malformed signature: {}", e)))?;
    if raw.len() != 65 {
        return Err(ApiError::Unauthenticated(format!(
            "signature must be 65 bytes, got {}",
            raw.len()
        )));
    }

    let parsed = Signature::from_slice(&raw[..64])
        .map_err(|e| ApiError::Unauthenticated(format!("malformed signature: {}", e)))?;
    // accept both raw (0/1) and legacy (27/28) recovery bytes
    let v = match raw[64] {
        27 | 28 => raw[64] - 27,
        v => v,
    };
    let recovery_id =
        RecoveryId::from_byte(v).ok_or_else(|| ApiError::Unauthenticated(format!("bad recovery id {}", raw[64])))?;

    let key = VerifyingKey::recover_from_prehash(digest, &parsed, recovery_id)
        .map_err(|e| ApiError::Unauthenticated(format!("signature does not verify: {}", e)))?;
    Ok(address_of(&key))
}

/// Verifies signed requests and refuses to accept the same signed request twice.
pub struct RequestAuthenticator {
    max_skew_secs: u64,
    seen: moka::future::Cache<(Address, [u8; 32]), ()>,
}

impl RequestAuthenticator {
    pub fn new(max_skew_secs: u64) -> Self {
        // a replay outside the window already fails the timestamp check
        let ttl = Duration::from_secs(max_skew_secs.saturating_mul(2).max(1));
        Self {
            max_skew_secs,
            seen: moka::future::Cache::builder()
                .max_capacity(100_000)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Authenticated caller of a request received at `now`.
    pub async fn authenticate(
        &self,
        method: &str,
        path: &str,
        headers: &HeaderMap,
        body: &[u8],
        now: u64,
    ) -> ApiResult<Address> {
        let signature = header_str(headers, SIGNATURE_HEADER)?
            .ok_or_else(|| ApiError::Unauthenticated(format!("missing {} header", SIGNATURE_HEADER)))?;
        let timestamp: u64 = header_str(headers, TIMESTAMP_HEADER)?
            .ok_or_else(|| ApiError::Unauthenticated(format!("missing {} header", TIMESTAMP_HEADER)))?
            .trim()
            .parse()
            .map_err(|_| ApiError::Unauthenticated(format!("{} must be unix seconds", TIMESTAMP_HEADER)))?;

        if now.abs_diff(timestamp) > self.max_skew_secs {
            warn!("Stale signed request: timestamp {} at {}", timestamp, now);
            return Err(ApiError::Unauthenticated(format!(
                "timestamp {} is more than {}s away from {}",
                timestamp, self.max_skew_secs, now
            )));
        }

        let digest = request_digest(method, path, timestamp, body);
        let signer = recover_signer(&digest, signature)?;

        if let Some(claimed) = header_str(headers, CALLER_HEADER)? {
            let claimed: Address = claimed
                .trim()
                .parse()
                .map_err(|e| ApiError::InvalidAddress(format!("{}: {}", claimed, e)))?;
            if claimed != signer {
                warn!("Request claims to be {} but is signed by {}", claimed, signer);
                return Err(ApiError::Unauthenticated(format!(
                    "{} does not match the signer",
                    CALLER_HEADER
                )));
            }
        }

        let entry = self.seen.entry((signer, digest)).or_insert_with(async {}).await;
        if !entry.is_fresh() {
            warn!("Replayed request from {} rejected", signer);
            return Err(ApiError::Unauthenticated("request already processed".to_string()));
        }

        debug!("Authenticated {} {} as {}", method, path, signer);
        Ok(signer)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> ApiResult<Option<&'a str>> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(Some)
            .map_err(|_| ApiError::InvalidRequest(format!("{} header is not ASCII", name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn key(b: u8) -> SigningKey {
        SigningKey::from_slice(&[b; 32]).unwrap()
    }

    fn signed_headers(key: &SigningKey, path: &str, timestamp: u64, body: &[u8]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let signature = sign_request(key, "POST", path, timestamp, body).unwrap();
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(&signature).unwrap());
        headers.insert(TIMESTAMP_HEADER, HeaderValue::from(timestamp));
        headers
    }

    #[test]
    fn test_address_of_known_key() {
        let key = SigningKey::from_slice(
            &hex::decode("ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80").unwrap(),
        )
        .unwrap();
        let expected: Address = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266".parse().unwrap();
        assert_eq!(address_of(key.verifying_key()), expected);
    }

    #[test]
    fn test_recover_signer() {
        let key = key(0x42);
        let digest = request_digest("POST", "/api/claim", 10, b"");
        let signature = sign_request(&key, "POST", "/api/claim", 10, b"").unwrap();
        assert_eq!(recover_signer(&digest, &signature).unwrap(), address_of(key.verifying_key()));

        // a different body recovers someone else
        let other = request_digest("POST", "/api/claim", 10, b"{}");
        assert_ne!(recover_signer(&other, &signature).unwrap(), address_of(key.verifying_key()));

        assert!(matches!(recover_signer(&digest, "0x1234"), Err(ApiError::Unauthenticated(_))));
    }

    #[tokio::test]
    async fn test_authenticate() {
        let auth = RequestAuthenticator::new(300);
        let key = key(0x42);
        let body = br#"{"paused":true}"#;

        let headers = signed_headers(&key, "/api/admin/pause", 1_000, body);
        let caller = auth
            .authenticate("POST", "/api/admin/pause", &headers, body, 1_100)
            .await
            .unwrap();
        assert_eq!(caller, address_of(key.verifying_key()));

        // same signed request again
        let err = auth
            .authenticate("POST", "/api/admin/pause", &headers, body, 1_100)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "UNAUTHENTICATED");

        // stale
        let headers = signed_headers(&key, "/api/admin/pause", 1_000, body);
        assert!(auth
            .authenticate("POST", "/api/admin/pause", &headers, body, 2_000)
            .await
            .is_err());

        // unsigned
        assert!(auth
            .authenticate("POST", "/api/admin/pause", &HeaderMap::new(), body, 1_000)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_claimed_caller_must_match_signer() {
        let auth = RequestAuthenticator::new(300);
        let mut headers = signed_headers(&key(0x42), "/api/claim", 1_000, b"");
        headers.insert(
            CALLER_HEADER,
            HeaderValue::from_static("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"),
        );
        let err = auth
            .authenticate("POST", "/api/claim", &headers, b"", 1_000)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated(_)));
    }
}
