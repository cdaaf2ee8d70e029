//! Per-handler execution strategy selection.

use serde::Deserialize;

/// Which handler kinds run through their server-side procedure instead of
/// issuing the equivalent operations themselves. Everything defaults to the
/// sequential strategy.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StrategyConfig {
    #[serde(default)]
    pub use_atomic_strategy_for_update_clob_pair: bool,

    #[serde(default)]
    pub use_atomic_strategy_for_asset_create: bool,

    #[serde(default)]
    pub use_atomic_strategy_for_market_create: bool,

    #[serde(default)]
    pub use_atomic_strategy_for_liquidity_tier: bool,
}

impl StrategyConfig {
    /// Every handler kind on the same strategy.
    pub fn all(atomic: bool) -> Self {
        Self {
            use_atomic_strategy_for_update_clob_pair: atomic,
            use_atomic_strategy_for_asset_create: atomic,
            use_atomic_strategy_for_market_create: atomic,
            use_atomic_strategy_for_liquidity_tier: atomic,
        }
    }
}
