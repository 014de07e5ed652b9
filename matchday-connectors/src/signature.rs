//! Webhook signature verification.
//!
//! The gateway signs the raw request body with the shared webhook secret
//! (HMAC-SHA256) and sends the hex digest in a header.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::gateway_rest::GatewayRestError;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 of `body` under `secret`.
pub fn sign_payload(secret: &str, body: &[u8]) -> Result<String, GatewayRestError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| GatewayRestError::SignatureError(format!("HMAC error: {}", e)))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check `signature` (hex) against `body`. Comparison is constant time.
pub fn verify_payload(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}
