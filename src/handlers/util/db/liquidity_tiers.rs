use crate::db::{DbOperation, DbValue};

pub struct LiquidityTierRow<'a> {
    pub id: i32,
    pub name: &'a str,
    pub initial_margin_ppm: i32,
    pub maintenance_fraction_ppm: i32,
    pub open_interest_lower_cap: Option<i64>,
    pub open_interest_upper_cap: Option<i64>,
}

/// Insert the tier or overwrite an existing one. Open interest caps are only
/// overwritten when the event carries them, so a version 1 upsert keeps the
/// caps a version 2 upsert set.
pub fn upsert_liquidity_tier(tier: &LiquidityTierRow<'_>) -> DbOperation {
    let mut update_columns = vec![
        "name".to_string(),
        "initial_margin_ppm".to_string(),
        "maintenance_fraction_ppm".to_string(),
    ];
    if tier.open_interest_lower_cap.is_some() {
        update_columns.push("open_interest_lower_cap".to_string());
    }
    if tier.open_interest_upper_cap.is_some() {
        update_columns.push("open_interest_upper_cap".to_string());
    }

    DbOperation::Upsert {
        table: "liquidity_tiers".to_string(),
        columns: vec![
            "id".to_string(),
            "name".to_string(),
            "initial_margin_ppm".to_string(),
            "maintenance_fraction_ppm".to_string(),
            "open_interest_lower_cap".to_string(),
            "open_interest_upper_cap".to_string(),
        ],
        values: vec![
            DbValue::Int32(tier.id),
            DbValue::Text(tier.name.to_string()),
            DbValue::Int32(tier.initial_margin_ppm),
            DbValue::Int32(tier.maintenance_fraction_ppm),
            DbValue::opt_i64(tier.open_interest_lower_cap),
            DbValue::opt_i64(tier.open_interest_upper_cap),
        ],
        conflict_columns: vec!["id".to_string()],
        update_columns,
    }
}
