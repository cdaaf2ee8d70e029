//! Event handlers, one module per event subtype.
//!
//! Add new handler modules here and register them in `register_handlers`.

pub mod asset_create;
pub mod liquidity_tier;
pub mod market_create;
pub mod update_clob_pair;

use super::registry::HandlerRegistry;
use crate::types::config::handlers::StrategyConfig;

/// Register all event handlers, each on the strategy configured for its kind.
pub fn register_handlers(registry: &mut HandlerRegistry, strategies: &StrategyConfig) {
    update_clob_pair::register_handlers(registry, strategies.use_atomic_strategy_for_update_clob_pair);
    asset_create::register_handlers(registry, strategies.use_atomic_strategy_for_asset_create);
    market_create::register_handlers(registry, strategies.use_atomic_strategy_for_market_create);
    liquidity_tier::register_handlers(registry, strategies.use_atomic_strategy_for_liquidity_tier);
}
