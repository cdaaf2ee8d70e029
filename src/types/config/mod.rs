pub mod handlers;
pub mod indexer;
