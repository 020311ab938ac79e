//! HMAC-SHA256 webhook signature verification.
//!
//! The platform signs `"{timestamp}.{body}"` with the per-route shared secret and sends
//! `X-Webhook-Signature: sha256=<hex>` plus `X-Webhook-Timestamp: <unix seconds>`.
//! Covering the timestamp in the signed payload plus a freshness window guards replays.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex signature (with "sha256=" prefix).
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Header carrying the Unix-seconds request timestamp.
pub const TIMESTAMP_HEADER: &str = "x-webhook-timestamp";

/// Allowed forward clock skew. A timestamp further in the future than this is rejected.
const MAX_FUTURE_SKEW_SECS: i64 = 60;

/// Sign a timestamp + payload with HMAC-SHA256 and return the wire signature ("sha256=<hex>").
pub fn sign_payload(secret: &str, timestamp: &str, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Verify a webhook signature against the raw body and timestamp header.
/// Rejects absent or malformed timestamps, timestamps older than `window` (replay guard)
/// or ahead of the clock by more than a small skew, and any signature mismatch.
/// Pure over its inputs; uses the current clock for freshness.
pub fn verify(
    secret: &str,
    timestamp: Option<&str>,
    signature: Option<&str>,
    payload: &[u8],
    window: Duration,
) -> bool {
    verify_at(
        secret,
        timestamp,
        signature,
        payload,
        window,
        chrono::Utc::now().timestamp(),
    )
}

/// Freshness-testable form of [`verify`]: `now` is the Unix-seconds reference clock.
pub fn verify_at(
    secret: &str,
    timestamp: Option<&str>,
    signature: Option<&str>,
    payload: &[u8],
    window: Duration,
    now: i64,
) -> bool {
    let (Some(timestamp), Some(signature)) = (timestamp, signature) else {
        return false;
    };
    let Ok(ts) = timestamp.trim().parse::<i64>() else {
        return false;
    };
    if now - ts > window.as_secs() as i64 {
        return false;
    }
    if ts - now > MAX_FUTURE_SKEW_SECS {
        return false;
    }
    let expected = sign_payload(secret, timestamp.trim(), payload);
    constant_time_eq(expected.as_bytes(), signature.trim().as_bytes())
}

/// Constant-time byte comparison (no early exit on first mismatch).
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b.iter())
            .fold(0u8, |acc, (x, y)| acc | (x ^ y))
            == 0
}
