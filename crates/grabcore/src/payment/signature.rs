//! IPN authenticity check
//!
//! NOWPayments signs the notification body (JSON with keys sorted
//! recursively) with HMAC-SHA512 and sends the hex digest in the
//! `x-nowpayments-sig` header. Older integrations instead put the shared
//! secret in an `ipn_secret` body field; both are accepted.

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha512;

type HmacSha512 = Hmac<Sha512>;

pub const SIGNATURE_HEADER: &str = "x-nowpayments-sig";

/// Serialize with object keys sorted at every level
pub fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|key| format!("{}:{}", Value::String(key.clone()), canonical_json(&map[key])))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        other => other.to_string(),
    }
}

fn mac_for(secret: &str, payload: &Value) -> Option<HmacSha512> {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(canonical_json(payload).as_bytes());
    Some(mac)
}

/// Hex HMAC-SHA512 of the canonical body
pub fn sign(secret: &str, payload: &Value) -> String {
    mac_for(secret, payload)
        .map(|mac| hex::encode(mac.finalize().into_bytes()))
        .unwrap_or_default()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// True when the header signature or the legacy body secret matches.
///
/// An empty configured secret never verifies.
pub fn verify(secret: &str, payload: &Value, header: Option<&str>) -> bool {
    if secret.is_empty() {
        return false;
    }

    if let Some(sig) = header.map(str::trim).filter(|s| !s.is_empty()) {
        let Ok(expected) = hex::decode(sig.to_ascii_lowercase()) else {
            return false;
        };
        return match mac_for(secret, payload) {
            Some(mac) => mac.verify_slice(&expected).is_ok(),
            None => false,
        };
    }

    payload
        .get("ipn_secret")
        .and_then(Value::as_str)
        .is_some_and(|given| constant_time_eq(given.as_bytes(), secret.as_bytes()))
}
