//! Local inspection of bearer token expiry claims.
//!
//! These functions decode the claims segment of a JWT without verifying its
//! signature: the client only needs to know *when* the server will stop
//! accepting the token, and that decision is checked against a safety margin
//! so renewal happens before the server would reject it.
//!
//! Every function here is pure, works without network access, and fails
//! closed: malformed input, a missing expiry claim, or an undecodable
//! segment is indistinguishable from an already-expired token.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use serde::Deserialize;

/// Buffer subtracted from a token's real expiry.
///
/// A token within this margin of its `exp` claim is treated as expired.
pub const EXPIRY_SAFETY_MARGIN: Duration = Duration::from_secs(5 * 60);

/// The subset of JWT claims the client inspects.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenClaims {
    /// Expiry, epoch seconds.
    #[serde(default)]
    pub exp: Option<i64>,
    /// Subject (user id).
    #[serde(default)]
    pub sub: Option<String>,
    /// Issued-at, epoch seconds.
    #[serde(default)]
    pub iat: Option<i64>,
}

/// Decode the claims segment of a JWT.
///
/// Returns `None` for anything that is not a three-segment token with a
/// base64url JSON payload. The signature is not verified.
pub fn decode_claims(token: &str) -> Option<TokenClaims> {
    let mut segments = token.split('.');
    let _header = segments.next()?;
    let payload = segments.next()?;
    segments.next()?;

    // Tolerate padded encoders.
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// The token's expiry in epoch milliseconds, if it has a decodable `exp`.
pub fn expires_at_ms(token: &str) -> Option<i64> {
    decode_claims(token)?.exp?.checked_mul(1000)
}

/// Whether the token is expired at `now_ms`, safety margin included.
///
/// `None`, malformed tokens, and tokens without an `exp` claim are all
/// expired.
pub fn is_expired_at(token: Option<&str>, now_ms: i64) -> bool {
    let Some(token) = token else {
        return true;
    };
    let Some(exp_ms) = expires_at_ms(token) else {
        return true;
    };
    now_ms >= exp_ms - EXPIRY_SAFETY_MARGIN.as_millis() as i64
}

/// Whether the token is expired right now, safety margin included.
pub fn is_expired(token: Option<&str>) -> bool {
    is_expired_at(token, now_ms())
}

/// Time until the safety-margin expiry at `now_ms`.
///
/// Zero for anything [`is_expired_at`] would reject.
pub fn time_remaining_at(token: Option<&str>, now_ms: i64) -> Duration {
    let Some(token) = token else {
        return Duration::ZERO;
    };
    let Some(exp_ms) = expires_at_ms(token) else {
        return Duration::ZERO;
    };
    let remaining = exp_ms - EXPIRY_SAFETY_MARGIN.as_millis() as i64 - now_ms;
    if remaining <= 0 {
        Duration::ZERO
    } else {
        Duration::from_millis(remaining as u64)
    }
}

/// Time until the safety-margin expiry, measured from the wall clock.
pub fn time_remaining(token: Option<&str>) -> Duration {
    time_remaining_at(token, now_ms())
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Mint an unsigned token whose payload carries the given claims.
    fn mint(payload: serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(payload.to_string().as_bytes());
        format!("{}.{}.sig", header, body)
    }

    fn mint_exp(exp_secs: i64) -> String {
        mint(json!({ "exp": exp_secs, "sub": "user-1" }))
    }

    #[test]
    fn malformed_tokens_are_expired() {
        assert!(is_expired(Some("not-a-jwt")));
        assert!(is_expired(Some("only.two")));
        assert!(is_expired(Some("a.%%%.c")));
        assert!(is_expired(None));
    }

    #[test]
    fn malformed_tokens_have_zero_remaining() {
        assert_eq!(time_remaining(Some("not-a-jwt")), Duration::ZERO);
        assert_eq!(time_remaining(None), Duration::ZERO);
    }

    #[test]
    fn missing_exp_claim_is_expired() {
        let token = mint(json!({ "sub": "user-1" }));
        assert!(is_expired(Some(&token)));
        assert_eq!(time_remaining(Some(&token)), Duration::ZERO);
    }

    #[test]
    fn token_inside_safety_margin_is_expired() {
        let now = now_ms();
        let token = mint_exp(now / 1000 + 4 * 60);
        assert!(is_expired_at(Some(&token), now));
    }

    #[test]
    fn token_outside_safety_margin_is_valid() {
        let now = now_ms();
        let token = mint_exp(now / 1000 + 6 * 60);
        assert!(!is_expired_at(Some(&token), now));

        let remaining = time_remaining_at(Some(&token), now);
        assert!(remaining > Duration::from_secs(55));
        assert!(remaining <= Duration::from_secs(60));
    }

    #[test]
    fn padded_payload_segment_decodes() {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
        let body = base64::engine::general_purpose::URL_SAFE
            .encode(json!({ "exp": 4102444800i64 }).to_string().as_bytes());
        let token = format!("{}.{}.sig", header, body);
        assert!(decode_claims(&token).is_some());
    }

    #[test]
    fn claims_expose_subject() {
        let token = mint(json!({ "exp": 4102444800i64, "sub": "user-42" }));
        let claims = decode_claims(&token).unwrap();
        assert_eq!(claims.sub.as_deref(), Some("user-42"));
    }
}
