//! Persisted entity rows. Field names and types follow the table columns so
//! a `row_to_json` document deserializes directly.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PerpetualMarketStatus {
    Active,
    Paused,
    CancelOnly,
    PostOnly,
    Initializing,
    FinalSettlement,
}

impl PerpetualMarketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PerpetualMarketStatus::Active => "ACTIVE",
            PerpetualMarketStatus::Paused => "PAUSED",
            PerpetualMarketStatus::CancelOnly => "CANCEL_ONLY",
            PerpetualMarketStatus::PostOnly => "POST_ONLY",
            PerpetualMarketStatus::Initializing => "INITIALIZING",
            PerpetualMarketStatus::FinalSettlement => "FINAL_SETTLEMENT",
        }
    }
}

/// A trading pair (`perpetual_markets`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerpetualMarket {
    pub id: i64,
    pub clob_pair_id: i64,
    pub ticker: String,
    pub market_id: i32,
    pub status: PerpetualMarketStatus,
    pub atomic_resolution: i32,
    pub quantum_conversion_exponent: i32,
    pub subticks_per_tick: i32,
    pub step_base_quantums: i64,
    pub liquidity_tier_id: i32,
}

/// `assets`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: i64,
    pub symbol: String,
    pub atomic_resolution: i32,
    pub has_market: bool,
    pub market_id: Option<i32>,
}

/// Oracle market (`markets`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    pub id: i32,
    pub pair: String,
    pub exponent: i32,
    pub min_price_change_ppm: i32,
}

/// `liquidity_tiers`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityTier {
    pub id: i32,
    pub name: String,
    pub initial_margin_ppm: i32,
    pub maintenance_fraction_ppm: i32,
    pub open_interest_lower_cap: Option<i64>,
    pub open_interest_upper_cap: Option<i64>,
}
