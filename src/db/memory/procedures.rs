//! In-memory counterparts of the server-side handler procedures defined in
//! `migrations/002_handler_procedures.sql`.
//!
//! Each procedure takes the serialized event payload and returns the
//! affected row(s) under the same keys as the SQL functions.

use serde_json::{json, Value as JsonValue};

use super::Tables;
use crate::db::error::DbError;
use crate::db::procedures::{
    ASSET_CREATE, BLOCK_PROCESSOR, LIQUIDITY_TIER_UPSERT, MARKET_CREATE, UPDATE_CLOB_PAIR,
};
use crate::db::types::{DbValue, WhereClause};

/// Event subtype handled by each per-event procedure, mirroring the CASE in
/// `ender_block_processor`.
const SUBTYPE_PROCEDURES: &[(&str, &str)] = &[
    ("update_clob_pair", UPDATE_CLOB_PAIR),
    ("asset", ASSET_CREATE),
    ("market", MARKET_CREATE),
    ("liquidity_tier", LIQUIDITY_TIER_UPSERT),
];

pub(crate) fn call(
    tables: &mut Tables,
    procedure: &str,
    payload: &JsonValue,
) -> Result<JsonValue, DbError> {
    match procedure {
        UPDATE_CLOB_PAIR => update_clob_pair(tables, payload),
        ASSET_CREATE => asset_create(tables, payload),
        MARKET_CREATE => market_create(tables, payload),
        LIQUIDITY_TIER_UPSERT => liquidity_tier_upsert(tables, payload),
        BLOCK_PROCESSOR => block_processor(tables, payload),
        other => Err(DbError::UnknownProcedure(other.to_string())),
    }
}

fn procedure_error(procedure: &str, message: impl Into<String>) -> DbError {
    DbError::ProcedureError {
        procedure: procedure.to_string(),
        message: message.into(),
    }
}

fn int_field(procedure: &str, payload: &JsonValue, field: &str) -> Result<i64, DbError> {
    payload
        .get(field)
        .and_then(JsonValue::as_i64)
        .ok_or_else(|| procedure_error(procedure, format!("missing integer field {}", field)))
}

fn opt_int_field(payload: &JsonValue, field: &str) -> Option<i64> {
    payload.get(field).and_then(JsonValue::as_i64)
}

fn str_field<'a>(procedure: &str, payload: &'a JsonValue, field: &str) -> Result<&'a str, DbError> {
    payload
        .get(field)
        .and_then(JsonValue::as_str)
        .ok_or_else(|| procedure_error(procedure, format!("missing text field {}", field)))
}

fn bool_field(procedure: &str, payload: &JsonValue, field: &str) -> Result<bool, DbError> {
    payload
        .get(field)
        .and_then(JsonValue::as_bool)
        .ok_or_else(|| procedure_error(procedure, format!("missing boolean field {}", field)))
}

fn perpetual_market_status(clob_pair_status: &str) -> Option<&'static str> {
    match clob_pair_status {
        "ACTIVE" => Some("ACTIVE"),
        "PAUSED" => Some("PAUSED"),
        "CANCEL_ONLY" => Some("CANCEL_ONLY"),
        "POST_ONLY" => Some("POST_ONLY"),
        "INITIALIZING" => Some("INITIALIZING"),
        "FINAL_SETTLEMENT" => Some("FINAL_SETTLEMENT"),
        _ => None,
    }
}

fn update_clob_pair(tables: &mut Tables, payload: &JsonValue) -> Result<JsonValue, DbError> {
    let clob_pair_id = int_field(UPDATE_CLOB_PAIR, payload, "clob_pair_id")?;
    let clob_status = str_field(UPDATE_CLOB_PAIR, payload, "status")?;
    let status = perpetual_market_status(clob_status).ok_or_else(|| {
        procedure_error(
            UPDATE_CLOB_PAIR,
            format!("unable to translate clob pair status {}", clob_status),
        )
    })?;

    let set_columns = vec![
        ("status".to_string(), DbValue::Text(status.to_string())),
        (
            "quantum_conversion_exponent".to_string(),
            DbValue::Int32(int_field(UPDATE_CLOB_PAIR, payload, "quantum_conversion_exponent")? as i32),
        ),
        (
            "subticks_per_tick".to_string(),
            DbValue::Int32(int_field(UPDATE_CLOB_PAIR, payload, "subticks_per_tick")? as i32),
        ),
        (
            "step_base_quantums".to_string(),
            DbValue::Int64(int_field(UPDATE_CLOB_PAIR, payload, "step_base_quantums")?),
        ),
    ];

    let mut updated = tables.table_mut("perpetual_markets")?.update(
        &set_columns,
        &WhereClause::Eq("clob_pair_id".to_string(), DbValue::Int64(clob_pair_id)),
    )?;

    let row = updated.pop().ok_or_else(|| {
        procedure_error(
            UPDATE_CLOB_PAIR,
            format!(
                "Could not find perpetual market with corresponding clob_pair_id {}",
                clob_pair_id
            ),
        )
    })?;

    Ok(json!({ "perpetual_market": row }))
}

fn asset_create(tables: &mut Tables, payload: &JsonValue) -> Result<JsonValue, DbError> {
    let has_market = bool_field(ASSET_CREATE, payload, "has_market")?;
    let market_id = if has_market {
        JsonValue::from(int_field(ASSET_CREATE, payload, "market_id")?)
    } else {
        JsonValue::Null
    };

    let table = tables.table_mut("assets")?;
    let row = table.normalize(json!({
        "id": int_field(ASSET_CREATE, payload, "id")?,
        "symbol": str_field(ASSET_CREATE, payload, "symbol")?,
        "atomic_resolution": int_field(ASSET_CREATE, payload, "atomic_resolution")?,
        "has_market": has_market,
        "market_id": market_id,
    }))?;
    let asset = table.insert(row)?;

    Ok(json!({ "asset": asset }))
}

fn market_create(tables: &mut Tables, payload: &JsonValue) -> Result<JsonValue, DbError> {
    let table = tables.table_mut("markets")?;
    let row = table.normalize(json!({
        "id": int_field(MARKET_CREATE, payload, "id")?,
        "pair": str_field(MARKET_CREATE, payload, "pair")?,
        "exponent": int_field(MARKET_CREATE, payload, "exponent")?,
        "min_price_change_ppm": int_field(MARKET_CREATE, payload, "min_price_change_ppm")?,
    }))?;
    let market = table.insert(row)?;

    Ok(json!({ "market": market }))
}

fn liquidity_tier_upsert(tables: &mut Tables, payload: &JsonValue) -> Result<JsonValue, DbError> {
    let lower_cap = opt_int_field(payload, "open_interest_lower_cap");
    let upper_cap = opt_int_field(payload, "open_interest_upper_cap");

    // Absent caps keep the existing values, like the COALESCE in SQL.
    let mut update_columns: Vec<String> = ["name", "initial_margin_ppm", "maintenance_fraction_ppm"]
        .iter()
        .map(|c| c.to_string())
        .collect();
    if lower_cap.is_some() {
        update_columns.push("open_interest_lower_cap".to_string());
    }
    if upper_cap.is_some() {
        update_columns.push("open_interest_upper_cap".to_string());
    }

    let table = tables.table_mut("liquidity_tiers")?;
    let row = table.normalize(json!({
        "id": int_field(LIQUIDITY_TIER_UPSERT, payload, "id")?,
        "name": str_field(LIQUIDITY_TIER_UPSERT, payload, "name")?,
        "initial_margin_ppm": int_field(LIQUIDITY_TIER_UPSERT, payload, "initial_margin_ppm")?,
        "maintenance_fraction_ppm": int_field(LIQUIDITY_TIER_UPSERT, payload, "maintenance_fraction_ppm")?,
        "open_interest_lower_cap": lower_cap,
        "open_interest_upper_cap": upper_cap,
    }))?;
    let tier = table
        .upsert(row, &["id".to_string()], &update_columns)?
        .ok_or_else(|| procedure_error(LIQUIDITY_TIER_UPSERT, "upsert returned no row"))?;

    Ok(json!({ "liquidity_tier": tier }))
}

/// Runs the per-event procedure for every event of a block, in order, and
/// returns their results as an array aligned with the input events.
fn block_processor(tables: &mut Tables, payload: &JsonValue) -> Result<JsonValue, DbError> {
    let events = payload
        .get("events")
        .and_then(JsonValue::as_array)
        .ok_or_else(|| procedure_error(BLOCK_PROCESSOR, "missing events array"))?;

    let mut results = Vec::with_capacity(events.len());
    for event in events {
        let subtype = str_field(BLOCK_PROCESSOR, event, "subtype")?;
        let data = event
            .get("data")
            .ok_or_else(|| procedure_error(BLOCK_PROCESSOR, "event without data"))?;

        let result = match SUBTYPE_PROCEDURES.iter().find(|(s, _)| *s == subtype) {
            Some((_, procedure)) => call(tables, procedure, data)?,
            None => JsonValue::Null,
        };
        results.push(result);
    }

    Ok(JsonValue::Array(results))
}
