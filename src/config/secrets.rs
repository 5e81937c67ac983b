//! Secret handling utilities.
//!
//! Re-exports secrecy types and provides the comparison used for bearer
//! tokens on the HTTP surface.

use hmac::{Hmac, Mac};
use sha2::Sha256;

pub use secrecy::{ExposeSecret, SecretBox, SecretString};

type HmacSha256 = Hmac<Sha256>;

/// Compare a presented token against a secret in constant time.
///
/// Both sides are reduced to HMAC tags keyed by the secret, so the final
/// comparison is fixed-length and goes through `Mac::verify_slice`.
pub fn token_matches(secret: &SecretString, presented: &str) -> bool {
    let key = secret.expose_secret().as_bytes();
    let (Ok(mut expected), Ok(mut candidate)) = (
        HmacSha256::new_from_slice(key),
        HmacSha256::new_from_slice(key),
    ) else {
        return false;
    };
    expected.update(key);
    candidate.update(presented.as_bytes());
    candidate.verify_slice(&expected.finalize().into_bytes()).is_ok()
}
