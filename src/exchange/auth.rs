//! Venue API Authentication
//!
//! Implements the HMAC-SHA256 payload signature carried by every mutating
//! REST call (POST / PUT / DELETE).

use anyhow::{anyhow, Result};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

/// Seconds a signature stays valid; the timestamp header is `now + lifetime`
pub const SIGNATURE_LIFETIME_SECS: u64 = 300;

pub const API_KEY_HEADER: &str = "rbt-api-key";
pub const SIGNATURE_HEADER: &str = "rbt-signature";
pub const TIMESTAMP_HEADER: &str = "rbt-ts";

/// API key + hex secret
#[derive(Clone)]
pub struct VenueAuth {
    api_key: String,
    api_secret: String,
}

impl VenueAuth {
    pub fn new(api_key: String, api_secret: String) -> Self {
        Self { api_key, api_secret }
    }

    /// Get API key
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Sign a request body and return headers
    ///
    /// Returns: (signature, timestamp)
    pub fn sign(&self, method: &str, path: &str, body: &str) -> Result<(String, String)> {
        let timestamp = Self::expiry_timestamp();
        let payload = Self::payload(method, path, body)?;
        let signature = self.payload_signature(&payload, timestamp)?;
        Ok((signature, timestamp.to_string()))
    }

    /// Flatten a JSON body into the signed key/value set. String values are
    /// taken without quotes, everything else in its JSON text form.
    pub fn payload(method: &str, path: &str, body: &str) -> Result<BTreeMap<String, String>> {
        let mut payload = BTreeMap::new();
        if !body.trim().is_empty() {
            let fields: serde_json::Map<String, serde_json::Value> = serde_json::from_str(body)?;
            for (key, value) in fields {
                let text = match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                payload.insert(key, text);
            }
        }
        payload.insert("method".to_string(), method.to_uppercase());
        payload.insert("path".to_string(), path.to_string());
        Ok(payload)
    }

    /// `k1=v1k2=v2...` in key order
    pub fn payload_message(payload: &BTreeMap<String, String>) -> String {
        payload
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<String>()
    }

    /// HMAC-SHA256(secret, SHA256(message + timestamp)), hex with `0x` prefix
    pub fn payload_signature(&self, payload: &BTreeMap<String, String>, timestamp: u64) -> Result<String> {
        let secret = hex::decode(self.api_secret.trim_start_matches("0x"))
            .map_err(|e| anyhow!("API secret is not valid hex: {}", e))?;

        let mut input = Self::payload_message(payload);
        input.push_str(&timestamp.to_string());
        let digest = Sha256::digest(input.as_bytes());

        let mut mac = HmacSha256::new_from_slice(&secret)
            .map_err(|e| anyhow!("HMAC initialization failed: {}", e))?;
        mac.update(&digest);
        Ok(format!("0x{}", hex::encode(mac.finalize().into_bytes())))
    }

    fn expiry_timestamp() -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        now + SIGNATURE_LIFETIME_SECS
    }
}

impl std::fmt::Debug for VenueAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VenueAuth")
            .field("api_key", &format!("{}...", &self.api_key[..8.min(self.api_key.len())]))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth() -> VenueAuth {
        VenueAuth::new(
            "test_key".to_string(),
            "0x0102030405060708090a0b0c0d0e0f10".to_string(),
        )
    }

    #[test]
    fn test_payload_message_is_sorted() {
        let payload = VenueAuth::payload(
            "delete",
            "/orders",
            r#"{"order_id":"42","market_id":"ETH-USD"}"#,
        )
        .unwrap();
        assert_eq!(
            VenueAuth::payload_message(&payload),
            "market_id=ETH-USDmethod=DELETEorder_id=42path=/orders"
        );
    }

    #[test]
    fn test_payload_keeps_numbers_unquoted() {
        let payload = VenueAuth::payload("POST", "/orders", r#"{"price":1739.5,"size":null}"#).unwrap();
        assert_eq!(payload["price"], "1739.5");
        assert_eq!(payload["size"], "null");
    }

    #[test]
    fn test_signature_shape() {
        let auth = auth();
        let payload = VenueAuth::payload("POST", "/orders", r#"{"market_id":"ETH-USD"}"#).unwrap();

        let sig = auth.payload_signature(&payload, 1_700_000_000).unwrap();
        assert!(sig.starts_with("0x"));
        assert_eq!(sig.len(), 66);
        assert_eq!(sig, auth.payload_signature(&payload, 1_700_000_000).unwrap());
        assert_ne!(sig, auth.payload_signature(&payload, 1_700_000_001).unwrap());
    }

    #[test]
    fn test_bad_secret_is_an_error() {
        let auth = VenueAuth::new("k".into(), "not-hex".into());
        assert!(auth.sign("POST", "/orders", "{}").is_err());
    }
}
