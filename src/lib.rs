pub mod cache;
pub mod db;
pub mod dispatcher;
pub mod handlers;
pub mod publish;
pub mod source;
pub mod stats;
pub mod types;

#[cfg(test)]
mod testing;
