//! GitHub webhook signature verification using HMAC-SHA256.
//!
//! GitHub signs webhook payloads with a shared secret and sends the result
//! in the `X-Hub-Signature-256` header as `sha256=<hex>`. Verification runs
//! before any parsing.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Parse a `sha256=<hex>` header into raw bytes. `None` if malformed.
pub fn parse_signature_header(header: &str) -> Option<Vec<u8>> {
    let hex_sig = header.strip_prefix("sha256=")?;
    hex::decode(hex_sig).ok()
}

/// Compute the `sha256=<hex>` header value for a payload.
pub fn sign(payload: &[u8], secret: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(payload);
    Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Check a signature header against the payload, in constant time.
pub fn verify_signature(payload: &[u8], signature_header: &str, secret: &[u8]) -> bool {
    let Some(expected) = parse_signature_header(signature_header) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}
