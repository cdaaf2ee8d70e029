use crate::db::{DbOperation, DbValue, WhereClause};
use crate::types::entities::PerpetualMarketStatus;

/// New clob pair configuration for an existing perpetual market.
pub struct ClobPairConfig {
    pub status: PerpetualMarketStatus,
    pub quantum_conversion_exponent: i32,
    pub subticks_per_tick: i32,
    pub step_base_quantums: i64,
}

pub fn update_clob_pair_config(perpetual_market_id: i64, config: &ClobPairConfig) -> DbOperation {
    DbOperation::Update {
        table: "perpetual_markets".to_string(),
        set_columns: vec![
            ("status".to_string(), DbValue::Text(config.status.as_str().to_string())),
            (
                "quantum_conversion_exponent".to_string(),
                DbValue::Int32(config.quantum_conversion_exponent),
            ),
            ("subticks_per_tick".to_string(), DbValue::Int32(config.subticks_per_tick)),
            ("step_base_quantums".to_string(), DbValue::Int64(config.step_base_quantums)),
        ],
        where_clause: WhereClause::Eq("id".to_string(), DbValue::Int64(perpetual_market_id)),
    }
}
