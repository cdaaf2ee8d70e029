//! Shared collaborators handed to every handler of a block.

use std::sync::Arc;

use crate::cache::Caches;
use crate::db::TxScope;
use crate::stats::Stats;

/// Everything a handler may touch while it runs. Cloned into each spawned
/// handler task; all handlers of a block share the same transaction scope.
#[derive(Clone)]
pub struct HandlerContext {
    pub scope: Arc<dyn TxScope>,
    pub caches: Arc<Caches>,
    pub stats: Arc<dyn Stats>,
}

impl HandlerContext {
    pub fn new(scope: Arc<dyn TxScope>, caches: Arc<Caches>, stats: Arc<dyn Stats>) -> Self {
        Self {
            scope,
            caches,
            stats,
        }
    }
}
