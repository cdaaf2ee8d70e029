//! Markets topic messages.

use std::collections::BTreeMap;

use serde_json::json;

use crate::handlers::error::HandlerError;
use crate::publish::{OutputEvent, Topic};
use crate::types::entities::{LiquidityTier, PerpetualMarket};

/// `{"trading": {<ticker>: <perpetual market>}}`, keyed by clob pair id.
pub fn trading_update(market: &PerpetualMarket) -> Result<OutputEvent, HandlerError> {
    let mut trading = BTreeMap::new();
    trading.insert(market.ticker.clone(), market);

    Ok(OutputEvent {
        topic: Topic::Markets,
        key: market.clob_pair_id.to_string(),
        payload: json!({ "trading": encode(&trading)? }),
    })
}

/// `{"liquidity_tiers": {<id>: <liquidity tier>}}`, keyed by tier id.
pub fn liquidity_tier_update(tier: &LiquidityTier) -> Result<OutputEvent, HandlerError> {
    let mut tiers = BTreeMap::new();
    tiers.insert(tier.id.to_string(), tier);

    Ok(OutputEvent {
        topic: Topic::Markets,
        key: tier.id.to_string(),
        payload: json!({ "liquidity_tiers": encode(&tiers)? }),
    })
}

fn encode<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, HandlerError> {
    serde_json::to_value(value)
        .map_err(|e| HandlerError::consistency(format!("Failed to encode markets message: {}", e)))
}
