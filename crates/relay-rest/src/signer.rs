//! Request signing.
//!
//! Canonical string: `UPPER(method) || path || JSON(body) || timestamp_ms`.
//! Signature: hex-encoded HMAC-SHA256 over the canonical string. The
//! signature is a pure function of its inputs; the timestamp is supplied by
//! the caller so each attempt signs with a fresh one.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Build the canonical string for one request.
///
/// `body` is the serialized JSON payload, empty when the request has none.
pub fn canonical_string(method: &str, path: &str, body: &str, timestamp_ms: i64) -> String {
    format!("{}{}{}{}", method.to_uppercase(), path, body, timestamp_ms)
}

/// Compute the hex HMAC-SHA256 signature over the canonical string.
pub fn sign(secret: &[u8], method: &str, path: &str, body: &str, timestamp_ms: i64) -> String {
    let canonical = canonical_string(method, path, body, timestamp_ms);
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(canonical.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Current epoch milliseconds, computed at call time.
pub fn timestamp_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
