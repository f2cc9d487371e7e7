//! Record wire codec
//!
//! Stateless mapping between [`Record`] and the JSON object stored remotely.
//! The backend schema requires only `text`; every optional field is omitted
//! entirely when empty so that absent-vs-empty distinctions never trip
//! backend validation.
//!
//! Older entries were written before records carried an explicit `id` field
//! and before `status` replaced a boolean `completed` flag. Decoding still
//! accepts both shapes: the storage key supplies a missing id, and
//! `completed`, when present, wins over any stored status string.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::SyncError;
use crate::models::{Record, RecordStatus};

/// On-disk shape of a record, decode side only
#[derive(Debug, Deserialize)]
struct WireRecord {
    id: Option<String>,
    text: String,
    status: Option<RecordStatus>,
    completed: Option<bool>,
    emoji: Option<String>,
    date: Option<String>,
    time: Option<String>,
    #[serde(default)]
    removed: bool,
}

/// Encode a record into its wire object
///
/// `status` is always written as its normalized string; the legacy
/// `completed` key is never produced.
pub fn encode(record: &Record) -> Value {
    let mut wire = Map::new();
    wire.insert("id".to_string(), Value::String(record.id.clone()));
    wire.insert("text".to_string(), Value::String(record.text.clone()));
    wire.insert(
        "status".to_string(),
        Value::String(record.status.as_str().to_string()),
    );
    if let Some(emoji) = &record.emoji {
        wire.insert("emoji".to_string(), Value::String(emoji.clone()));
    }
    if let Some(date) = record.date {
        wire.insert(
            "date".to_string(),
            Value::String(date.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
    }
    if let Some(time) = &record.time {
        wire.insert("time".to_string(), Value::String(time.clone()));
    }
    if record.removed {
        wire.insert("removed".to_string(), Value::Bool(true));
    }
    Value::Object(wire)
}

/// Decode a wire object fetched from `key` into a record
///
/// Fails with a validation error when `text` is absent or a present field
/// cannot be interpreted. The record id falls back to the storage key for
/// entries written before the id field existed.
pub fn decode(key: &str, value: &Value) -> Result<Record, SyncError> {
    let wire: WireRecord =
        serde_json::from_value(value.clone()).map_err(|e| SyncError::Validation {
            key: key.to_string(),
            details: e.to_string(),
        })?;

    let status = match wire.completed {
        Some(true) => RecordStatus::Done,
        Some(false) => RecordStatus::Pending,
        None => wire.status.unwrap_or_default(),
    };

    let date = match wire.date {
        Some(raw) => Some(
            DateTime::parse_from_rfc3339(&raw)
                .map_err(|e| SyncError::Validation {
                    key: key.to_string(),
                    details: format!("bad date '{}': {}", raw, e),
                })?
                .with_timezone(&Utc),
        ),
        None => None,
    };

    Ok(Record {
        id: wire.id.unwrap_or_else(|| key.to_string()),
        text: wire.text,
        status,
        emoji: wire.emoji,
        date,
        time: wire.time,
        removed: wire.removed,
    })
}
