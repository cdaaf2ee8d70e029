pub mod batching;
pub mod block_cache;
pub mod engine;

#[cfg(test)]
mod tests;

pub use engine::{BlockDispatcher, BlockError, BlockOutcome};
