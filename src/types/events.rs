//! Event payload schemas, one struct per (subtype, version).

use serde::{Deserialize, Serialize};

use super::entities::PerpetualMarketStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClobPairStatus {
    Unspecified,
    Active,
    Paused,
    CancelOnly,
    PostOnly,
    Initializing,
    FinalSettlement,
}

impl ClobPairStatus {
    /// Status the perpetual market takes for this clob pair status.
    /// `Unspecified` has no counterpart.
    pub fn to_market_status(self) -> Option<PerpetualMarketStatus> {
        match self {
            ClobPairStatus::Unspecified => None,
            ClobPairStatus::Active => Some(PerpetualMarketStatus::Active),
            ClobPairStatus::Paused => Some(PerpetualMarketStatus::Paused),
            ClobPairStatus::CancelOnly => Some(PerpetualMarketStatus::CancelOnly),
            ClobPairStatus::PostOnly => Some(PerpetualMarketStatus::PostOnly),
            ClobPairStatus::Initializing => Some(PerpetualMarketStatus::Initializing),
            ClobPairStatus::FinalSettlement => Some(PerpetualMarketStatus::FinalSettlement),
        }
    }
}

/// `update_clob_pair` v1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateClobPairEventV1 {
    pub clob_pair_id: u32,
    pub status: ClobPairStatus,
    pub quantum_conversion_exponent: i32,
    pub subticks_per_tick: u32,
    pub step_base_quantums: u64,
}

/// `asset` v1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetCreateEventV1 {
    pub id: u32,
    pub symbol: String,
    pub has_market: bool,
    #[serde(default)]
    pub market_id: u32,
    pub atomic_resolution: i32,
}

/// `market` v1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketCreateEventV1 {
    pub id: u32,
    pub pair: String,
    pub exponent: i32,
    pub min_price_change_ppm: u32,
}

/// `liquidity_tier` v1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityTierUpsertEventV1 {
    pub id: u32,
    pub name: String,
    pub initial_margin_ppm: u32,
    pub maintenance_fraction_ppm: u32,
}

/// `liquidity_tier` v2 adds open interest caps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityTierUpsertEventV2 {
    pub id: u32,
    pub name: String,
    pub initial_margin_ppm: u32,
    pub maintenance_fraction_ppm: u32,
    pub open_interest_lower_cap: u64,
    pub open_interest_upper_cap: u64,
}

/// Version-independent form of a liquidity tier upsert, as handed to the
/// handler and to the server-side procedure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityTierUpsert {
    pub id: u32,
    pub name: String,
    pub initial_margin_ppm: u32,
    pub maintenance_fraction_ppm: u32,
    pub open_interest_lower_cap: Option<u64>,
    pub open_interest_upper_cap: Option<u64>,
}

impl From<LiquidityTierUpsertEventV1> for LiquidityTierUpsert {
    fn from(event: LiquidityTierUpsertEventV1) -> Self {
        Self {
            id: event.id,
            name: event.name,
            initial_margin_ppm: event.initial_margin_ppm,
            maintenance_fraction_ppm: event.maintenance_fraction_ppm,
            open_interest_lower_cap: None,
            open_interest_upper_cap: None,
        }
    }
}

impl From<LiquidityTierUpsertEventV2> for LiquidityTierUpsert {
    fn from(event: LiquidityTierUpsertEventV2) -> Self {
        Self {
            id: event.id,
            name: event.name,
            initial_margin_ppm: event.initial_margin_ppm,
            maintenance_fraction_ppm: event.maintenance_fraction_ppm,
            open_interest_lower_cap: Some(event.open_interest_lower_cap),
            open_interest_upper_cap: Some(event.open_interest_upper_cap),
        }
    }
}
