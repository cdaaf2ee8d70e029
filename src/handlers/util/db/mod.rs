//! `DbOperation` builders used by the sequential strategy, one module per table.

pub mod assets;
pub mod liquidity_tiers;
pub mod markets;
pub mod perpetual_markets;
