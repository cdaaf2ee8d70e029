pub mod block;
pub mod config;
pub mod entities;
pub mod events;
