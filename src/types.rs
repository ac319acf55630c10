use alloy_primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{AppError, AppResult};

pub type TokenId = U256;

/// Unix values above this are taken as milliseconds rather than seconds.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Transfer record as delivered by an indexer, before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTransfer {
    pub from: String,
    pub to: String,
    pub token_id: String,
    pub value: String,
    pub timestamp: String,
}

/// Normalized ERC-1155 single transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    pub from: Address,
    pub to: Address,
    pub token_id: TokenId,
    pub value: U256,
    pub timestamp: DateTime<Utc>,
}

impl TransferEvent {
    pub fn is_mint(&self) -> bool {
        self.from == Address::ZERO && self.to != Address::ZERO
    }

    pub fn is_burn(&self) -> bool {
        self.to == Address::ZERO && self.from != Address::ZERO
    }
}

impl TryFrom<RawTransfer> for TransferEvent {
    type Error = AppError;

    fn try_from(raw: RawTransfer) -> AppResult<Self> {
        Ok(Self {
            from: parse_address(&raw.from)?,
            to: parse_address(&raw.to)?,
            token_id: parse_token_id(&raw.token_id)?,
            value: parse_quantity(&raw.value)?,
            timestamp: parse_timestamp(&raw.timestamp)?,
        })
    }
}

pub fn parse_address(value: &str) -> AppResult<Address> {
    Address::from_str(value.trim())
        .map_err(|e| AppError::MalformedEvent(format!("Invalid address '{}': {}", value, e)))
}

pub fn parse_token_id(value: &str) -> AppResult<TokenId> {
    U256::from_str_radix(value.trim(), 10)
        .map_err(|e| AppError::MalformedEvent(format!("Invalid token id '{}': {}", value, e)))
}

pub fn parse_quantity(value: &str) -> AppResult<U256> {
    U256::from_str_radix(value.trim(), 10)
        .map_err(|e| AppError::MalformedEvent(format!("Invalid quantity '{}': {}", value, e)))
}

/// Accepts RFC 3339, unix seconds or unix milliseconds.
pub fn parse_timestamp(value: &str) -> AppResult<DateTime<Utc>> {
    let trimmed = value.trim();

    if let Ok(unix) = trimmed.parse::<i64>() {
        let parsed = if unix.abs() >= MILLIS_THRESHOLD {
            DateTime::from_timestamp_millis(unix)
        } else {
            DateTime::from_timestamp(unix, 0)
        };
        return parsed
            .ok_or_else(|| AppError::MalformedEvent(format!("Timestamp out of range: {}", value)));
    }

    DateTime::parse_from_rfc3339(trimmed)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::MalformedEvent(format!("Invalid timestamp '{}': {}", value, e)))
}

/// Lowercase `0x`-prefixed rendering used in every output file.
pub fn format_address(address: &Address) -> String {
    format!("0x{}", hex::encode(address))
}
