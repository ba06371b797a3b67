// Token payload decoding
// Reads claims without verifying the signature; the issuing backend owns that.

use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use chrono::{DateTime, Utc};

use super::types::{TokenPayload, User};

/// Decode the payload segment of a compact token
///
/// Returns `None` for anything that is not `header.payload[.signature]`
/// with a base64 JSON payload carrying a numeric `exp`.
pub fn decode(token: &str) -> Option<TokenPayload> {
    let segment = token.split('.').nth(1)?;
    let segment = segment.trim_end_matches('=');

    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .or_else(|_| STANDARD_NO_PAD.decode(segment))
        .ok()?;

    serde_json::from_slice(&bytes).ok()
}

/// Check whether a token is expired right now
///
/// Undecodable tokens count as expired.
pub fn is_expired(token: &str) -> bool {
    is_expired_at(token, Utc::now())
}

/// Check whether a token is expired at the given instant
pub fn is_expired_at(token: &str, now: DateTime<Utc>) -> bool {
    match decode(token) {
        Some(payload) => {
            let now_secs = now.timestamp_millis() as f64 / 1000.0;
            payload.exp < now_secs
        }
        None => true,
    }
}

/// Project a token's claims onto the user identity
pub fn user_from_token(token: &str) -> Option<User> {
    decode(token).map(User::from)
}
