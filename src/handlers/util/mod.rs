//! Helpers shared by the event handlers.

pub mod db;
pub mod messages;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;

use super::error::HandlerError;
use crate::types::block::IndexerEvent;

/// Decode an event's payload into its schema struct.
pub fn decode_payload<T: DeserializeOwned>(event: &IndexerEvent) -> Result<T, HandlerError> {
    serde_json::from_value(event.data.clone()).map_err(|e| {
        HandlerError::validation(format!(
            "Malformed {} v{} payload at tx {} event {}: {}",
            event.subtype, event.version, event.transaction_index, event.event_index, e
        ))
    })
}

/// Serialize a decoded payload as a procedure argument.
pub fn encode_payload<T: Serialize>(payload: &T) -> Result<JsonValue, HandlerError> {
    serde_json::to_value(payload)
        .map_err(|e| HandlerError::validation(format!("Failed to encode payload: {}", e)))
}

/// Decode a row returned by the store.
pub fn decode_row<T: DeserializeOwned>(table: &str, row: JsonValue) -> Result<T, HandlerError> {
    serde_json::from_value(row).map_err(|e| {
        HandlerError::consistency(format!("Row returned for {} does not decode: {}", table, e))
    })
}

/// Take the row stored under `key` in a procedure result.
pub fn procedure_row<T: DeserializeOwned>(
    procedure: &str,
    result: JsonValue,
    key: &str,
) -> Result<T, HandlerError> {
    match result {
        JsonValue::Object(mut fields) => match fields.remove(key) {
            Some(row) if !row.is_null() => decode_row(key, row),
            _ => Err(HandlerError::consistency(format!(
                "{} returned no {}",
                procedure, key
            ))),
        },
        other => Err(HandlerError::consistency(format!(
            "{} returned {} instead of an object",
            procedure, other
        ))),
    }
}

/// The single row a write must have affected.
pub fn single_row(table: &str, rows: Vec<JsonValue>) -> Result<JsonValue, HandlerError> {
    let count = rows.len();
    let mut rows = rows.into_iter();
    match (rows.next(), count) {
        (Some(row), 1) => Ok(row),
        _ => Err(HandlerError::consistency(format!(
            "Expected one {} row to be affected, got {}",
            table, count
        ))),
    }
}

pub fn to_i32(field: &str, value: u32) -> Result<i32, HandlerError> {
    i32::try_from(value)
        .map_err(|_| HandlerError::validation(format!("{} {} does not fit an INTEGER", field, value)))
}

pub fn to_i64(field: &str, value: u64) -> Result<i64, HandlerError> {
    i64::try_from(value)
        .map_err(|_| HandlerError::validation(format!("{} {} does not fit a BIGINT", field, value)))
}
