use super::CachedEntity;
use crate::types::entities::{Asset, LiquidityTier, Market, PerpetualMarket};

impl CachedEntity for PerpetualMarket {
    type Key = i64;
    const TABLE: &'static str = "perpetual_markets";

    fn key(&self) -> i64 {
        self.id
    }

    fn alternate_key(&self) -> Option<i64> {
        Some(self.clob_pair_id)
    }
}

impl CachedEntity for Asset {
    type Key = i64;
    const TABLE: &'static str = "assets";

    fn key(&self) -> i64 {
        self.id
    }
}

impl CachedEntity for Market {
    type Key = i32;
    const TABLE: &'static str = "markets";

    fn key(&self) -> i32 {
        self.id
    }
}

impl CachedEntity for LiquidityTier {
    type Key = i32;
    const TABLE: &'static str = "liquidity_tiers";

    fn key(&self) -> i32 {
        self.id
    }
}
