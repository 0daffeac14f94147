//! HMAC-SHA256 webhook signatures.
//!
//! The signature is computed over the exact bytes received on the wire. A body
//! that has been parsed and re-serialized will not verify.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Lowercase hex HMAC-SHA256 of `body` keyed by `secret`.
pub fn sign(body: &[u8], secret: &str) -> String {
    let mut mac = mac_for(secret);
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Check a hex signature in constant time.
///
/// Malformed input (bad hex, wrong length, empty) verifies as `false`.
/// A `sha256=` prefix and surrounding whitespace are accepted.
pub fn verify(body: &[u8], signature: &str, secret: &str) -> bool {
    let signature = signature.trim();
    let signature = signature.strip_prefix("sha256=").unwrap_or(signature);

    let expected = match hex::decode(signature) {
        Ok(bytes) if !bytes.is_empty() => bytes,
        _ => return false,
    };

    let mut mac = mac_for(secret);
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

fn mac_for(secret: &str) -> HmacSha256 {
    match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC-SHA256 accepts keys of any length"),
    }
}
