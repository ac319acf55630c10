//! Signed submission of reward batches.
//!
//! Signature input: every record's fields sorted by key as `key=value`
//! joined by `&`, records joined by `&`, then `&timestamp=<ms>&nonce=<hex>`.
//! The receiving side recomputes it byte for byte, so formatting of each
//! value must match plain JSON scalar rendering (strings unquoted).

use hmac::{Hmac, Mac};
use rand::RngCore;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use sha2::Sha256;
use tracing::{error, info};

use crate::error::{AppError, AppResult};
use crate::export::RewardRecord;

type HmacSha256 = Hmac<Sha256>;

pub const TIMESTAMP_HEADER: &str = "x-timestamp";
pub const NONCE_HEADER: &str = "x-nonce";
pub const SIGNATURE_HEADER: &str = "x-signature";

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// `k1=v1&k2=v2` with keys in sorted order.
fn canonical_item<T: Serialize>(item: &T) -> AppResult<String> {
    let value = serde_json::to_value(item)?;
    let Value::Object(fields) = value else {
        return Err(AppError::Configuration("Reward items must serialize to objects".to_string()));
    };
    let mut pairs: Vec<(String, Value)> = fields.into_iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    Ok(pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, scalar(v)))
        .collect::<Vec<_>>()
        .join("&"))
}

pub fn signing_payload<T: Serialize>(items: &[T], timestamp: &str, nonce: &str) -> AppResult<String> {
    let body = items
        .iter()
        .map(canonical_item)
        .collect::<AppResult<Vec<_>>>()?
        .join("&");
    Ok(format!("{}&timestamp={}&nonce={}", body, timestamp, nonce))
}

pub fn sign<T: Serialize>(items: &[T], timestamp: &str, nonce: &str, secret: &str) -> AppResult<String> {
    let payload = signing_payload(items, timestamp, nonce)?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Configuration(format!("Invalid HMAC key: {}", e)))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// 16 random bytes, hex encoded.
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedHeaders {
    pub timestamp: String,
    pub nonce: String,
    pub signature: String,
}

pub struct RewardsClient {
    client: Client,
    endpoint: String,
    secret: String,
}

impl RewardsClient {
    pub fn new(client: Client, endpoint: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            secret: secret.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn sign_now(&self, records: &[RewardRecord]) -> AppResult<SignedHeaders> {
        let timestamp = chrono::Utc::now().timestamp_millis().to_string();
        let nonce = generate_nonce();
        let signature = sign(records, &timestamp, &nonce, &self.secret)?;
        Ok(SignedHeaders {
            timestamp,
            nonce,
            signature,
        })
    }

    /// POST one batch. Not retried: a timed-out submission may have landed.
    pub async fn submit(&self, records: &[RewardRecord]) -> AppResult<Value> {
        let headers = self.sign_now(records)?;
        info!("Sending {} records to {}", records.len(), self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .header(TIMESTAMP_HEADER, &headers.timestamp)
            .header(SIGNATURE_HEADER, &headers.signature)
            .header(NONCE_HEADER, &headers.nonce)
            .header("Content-Type", "application/json")
            .json(records)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            error!("Rewards API rejected batch ({}): {}", status, text);
            return Err(AppError::Network(format!("Rewards API error ({}): {}", status, text)));
        }

        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        info!("Rewards API accepted batch: {}", body);
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(address: &str) -> RewardRecord {
        RewardRecord {
            user_address: address.to_string(),
            defi_id: 21,
            acs_amount: 619,
            description: "Yoki2 season 7".to_string(),
        }
    }

    #[test]
    fn test_payload_sorts_fields_and_appends_auth() {
        let payload = signing_payload(&[record("0xabc"), record("0xdef")], "1700000000000", "00ff").unwrap();
        assert_eq!(
            payload,
            "acsAmount=619&defiId=21&description=Yoki2 season 7&userAddress=0xabc\
             &acsAmount=619&defiId=21&description=Yoki2 season 7&userAddress=0xdef\
             &timestamp=1700000000000&nonce=00ff"
        );
    }

    #[test]
    fn test_empty_batch_payload() {
        let payload = signing_payload::<RewardRecord>(&[], "1", "ab").unwrap();
        assert_eq!(payload, "&timestamp=1&nonce=ab");
    }

    #[test]
    fn test_signature_is_lowercase_hex_hmac() {
        let signature = sign(&[record("0xabc")], "1700000000000", "00ff", "secret").unwrap();
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));

        let payload = signing_payload(&[record("0xabc")], "1700000000000", "00ff").unwrap();
        let mut mac = HmacSha256::new_from_slice(b"secret").unwrap();
        mac.update(payload.as_bytes());
        assert_eq!(signature, hex::encode(mac.finalize().into_bytes()));

        let other = sign(&[record("0xabc")], "1700000000000", "00fe", "secret").unwrap();
        assert_ne!(signature, other);
    }

    #[test]
    fn test_known_batch_signature() {
        let signature = sign(&[record("0xabc")], "1700000000000", "00ff", "secret").unwrap();
        assert_eq!(
            signature,
            "f91abbe593324c37051a82e9a0e3275c2d4a68f2e11f8c85eca4aba4b2f4d28f"
        );
    }

    #[test]
    fn test_nonce_is_sixteen_bytes_hex() {
        let nonce = generate_nonce();
        assert_eq!(nonce.len(), 32);
        assert_ne!(nonce, generate_nonce());
    }
}
