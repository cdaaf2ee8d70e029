use crate::db::{DbOperation, DbValue, WhereClause};

pub fn insert_market(id: i32, pair: &str, exponent: i32, min_price_change_ppm: i32) -> DbOperation {
    DbOperation::Insert {
        table: "markets".to_string(),
        columns: vec![
            "id".to_string(),
            "pair".to_string(),
            "exponent".to_string(),
            "min_price_change_ppm".to_string(),
        ],
        values: vec![
            DbValue::Int32(id),
            DbValue::Text(pair.to_string()),
            DbValue::Int32(exponent),
            DbValue::Int32(min_price_change_ppm),
        ],
    }
}

pub fn market_by_id(id: i32) -> WhereClause {
    WhereClause::Eq("id".to_string(), DbValue::Int32(id))
}
