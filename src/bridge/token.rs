//! Bearer credential derivation for stateful sessions
//!
//! Keys of the form `id.secret` are never sent raw: a short-lived signed
//! token (HMAC-SHA256 over a base64url header.payload pair, 1 hour expiry)
//! is derived instead. Any other key shape is used verbatim.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_TTL_MS: i64 = 3_600 * 1_000;

/// Derive the bearer token for `key`.
pub fn derive_bearer_token(key: &str) -> String {
    let Some((id, secret)) = split_key(key) else {
        return key.to_string();
    };

    let now_ms = Utc::now().timestamp_millis();
    let header = json!({ "alg": "HS256", "sign_type": "SIGN" });
    let payload = json!({
        "api_key": id,
        "exp": now_ms + TOKEN_TTL_MS,
        "timestamp": now_ms,
    });

    let encoded_header = URL_SAFE_NO_PAD.encode(header.to_string());
    let encoded_payload = URL_SAFE_NO_PAD.encode(payload.to_string());
    let signing_input = format!("{}.{}", encoded_header, encoded_payload);

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        // HMAC accepts any key length; unreachable in practice, but fall
        // back to the raw key rather than panic.
        Err(_) => return key.to_string(),
    };
    mac.update(signing_input.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    format!("{}.{}", signing_input, signature)
}

/// `id.secret` split; anything without exactly one dot is already a token.
fn split_key(key: &str) -> Option<(&str, &str)> {
    let mut parts = key.splitn(3, '.');
    let id = parts.next()?;
    let secret = parts.next()?;
    if parts.next().is_some() || id.is_empty() || secret.is_empty() {
        return None;
    }
    Some((id, secret))
}
