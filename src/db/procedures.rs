//! Names of the server-side procedures defined in
//! `migrations/002_handler_procedures.sql`.

pub const UPDATE_CLOB_PAIR: &str = "ender_update_clob_pair_handler";
pub const ASSET_CREATE: &str = "ender_asset_create_handler";
pub const MARKET_CREATE: &str = "ender_market_create_handler";
pub const LIQUIDITY_TIER_UPSERT: &str = "ender_liquidity_tier_handler";

/// Applies every event of a block in one call, returning an array of
/// per-event results aligned with the input.
pub const BLOCK_PROCESSOR: &str = "ender_block_processor";
