//! Event handlers and the machinery that runs them.
//!
//! One handler is built per event through the [`HandlerRegistry`]. Each
//! handler kind runs on the [`ExecutionStrategy`] configured for it, and every
//! handler of a block shares the block's transaction scope through its
//! [`HandlerContext`].

pub mod context;
pub mod error;
pub mod event;
pub mod instance;
pub mod registry;
pub mod strategy;
pub mod traits;
pub mod util;

pub use context::HandlerContext;
pub use error::HandlerError;
pub use instance::{HandlerInstance, HandlerState};
pub use registry::{build_registry, HandlerRegistry};
pub use strategy::{AtomicProcedure, ExecutionStrategy, SequentialOperations, StrategyKind};
pub use traits::EventHandler;
