//! Persisted watchlist and cursor records.

use alloy::primitives::Address;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A wallet monitored on one chain from `start_block` onwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchItem {
    pub wallet: Address,
    pub start_block: u64,
    /// Informational only; unreadable values fall back to the Unix epoch.
    #[serde(default = "unix_epoch", deserialize_with = "lenient_timestamp")]
    pub added_at: DateTime<Utc>,
}

fn unix_epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// RFC 3339, or a naive ISO timestamp read as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    let parsed = match &raw {
        Value::String(s) => parse_timestamp(s),
        _ => None,
    };
    Ok(parsed.unwrap_or_else(|| {
        tracing::warn!(added_at = %raw, "Unreadable watch timestamp; using the Unix epoch");
        unix_epoch()
    }))
}

impl WatchItem {
    pub fn new(wallet: Address, start_block: u64) -> Self {
        Self {
            wallet,
            start_block,
            added_at: Utc::now(),
        }
    }
}

/// Last block whose watched transactions are all durably resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorState {
    pub last_processed_block: u64,
    pub updated_at: DateTime<Utc>,
}

impl CursorState {
    pub fn at(block: u64) -> Self {
        Self {
            last_processed_block: block,
            updated_at: Utc::now(),
        }
    }
}
