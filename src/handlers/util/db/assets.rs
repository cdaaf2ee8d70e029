use crate::db::{DbOperation, DbValue};

pub fn insert_asset(
    id: i64,
    symbol: &str,
    atomic_resolution: i32,
    has_market: bool,
    market_id: Option<i32>,
) -> DbOperation {
    DbOperation::Insert {
        table: "assets".to_string(),
        columns: vec![
            "id".to_string(),
            "symbol".to_string(),
            "atomic_resolution".to_string(),
            "has_market".to_string(),
            "market_id".to_string(),
        ],
        values: vec![
            DbValue::Int64(id),
            DbValue::Text(symbol.to_string()),
            DbValue::Int32(atomic_resolution),
            DbValue::Bool(has_market),
            DbValue::opt_i32(market_id),
        ],
    }
}
