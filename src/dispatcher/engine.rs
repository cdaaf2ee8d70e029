//! Block dispatcher.
//!
//! Turns one decoded block into committed state changes and one ordered batch
//! of output events. Every write of a block goes through a single transaction
//! scope; a block either commits completely and publishes its outputs, or
//! rolls back completely and publishes nothing.

use std::sync::Arc;

use serde_json::{json, Value as JsonValue};
use thiserror::Error;
use tokio::sync::mpsc::Receiver;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::batching::partition;
use super::block_cache::{insert_block, BlockCache, BlockCheck};
use crate::cache::{CacheError, Caches};
use crate::db::procedures::BLOCK_PROCESSOR;
use crate::db::{DbError, Store, TxScope};
use crate::handlers::{build_registry, HandlerContext, HandlerError, HandlerInstance, HandlerRegistry, StrategyKind};
use crate::publish::{OutputBatch, OutputEvent, PublishError, Publisher};
use crate::stats::Stats;
use crate::types::block::{BlockInfo, EventCoordinates, IndexerBlock, IndexerEvent};
use crate::types::config::indexer::IndexerConfig;

#[derive(Debug, Error)]
pub enum BlockError {
    #[error("Invalid block {height}: {message}")]
    InvalidBlock { height: u64, message: String },

    #[error("Block {height} does not follow last processed block {last}")]
    HeightGap { height: u64, last: u64 },

    #[error("Failed to build handler for {subtype} event at block {height} tx {transaction_index} event {event_index}: {source}")]
    Build {
        subtype: String,
        height: u64,
        transaction_index: u32,
        event_index: u32,
        #[source]
        source: HandlerError,
    },

    #[error("{handler} failed on {event_type} at {coordinates}: {source}")]
    Handler {
        handler: &'static str,
        event_type: &'static str,
        coordinates: EventCoordinates,
        #[source]
        source: HandlerError,
    },

    #[error("Failed to load last processed block: {0}")]
    LastHeight(#[source] DbError),

    #[error("Store error on block {height}: {source}")]
    Store {
        height: u64,
        #[source]
        source: DbError,
    },

    #[error("Block processor returned an unusable result for block {height}: {message}")]
    BlockProcessor { height: u64, message: String },

    #[error("Handler task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Worker pool closed")]
    PoolClosed,

    #[error("Failed to load caches: {0}")]
    Cache(#[from] CacheError),

    /// The block committed but its outputs could not be handed downstream.
    #[error("Block {height} committed but publishing failed: {source}")]
    Publish {
        height: u64,
        #[source]
        source: PublishError,
    },
}

/// Result of a successfully handled block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockOutcome {
    Processed {
        height: u64,
        handlers: usize,
        batches: usize,
        outputs: usize,
    },
    AlreadyProcessed {
        height: u64,
    },
}

pub struct BlockDispatcher {
    store: Arc<dyn Store>,
    registry: HandlerRegistry,
    caches: Arc<Caches>,
    stats: Arc<dyn Stats>,
    publisher: Arc<dyn Publisher>,
    block_cache: BlockCache,
    handler_concurrency: usize,
    use_block_processor: bool,
}

impl BlockDispatcher {
    pub fn new(
        store: Arc<dyn Store>,
        caches: Arc<Caches>,
        stats: Arc<dyn Stats>,
        publisher: Arc<dyn Publisher>,
        config: &IndexerConfig,
    ) -> Self {
        Self {
            store,
            registry: build_registry(&config.strategies),
            caches,
            stats,
            publisher,
            block_cache: BlockCache::default(),
            handler_concurrency: config.handler_concurrency.max(1),
            use_block_processor: config.use_block_processor_procedure,
        }
    }

    /// Load the last committed height and fill every cache from the store.
    pub async fn initialize(&mut self) -> Result<(), BlockError> {
        self.block_cache = BlockCache::load(self.store.as_ref())
            .await
            .map_err(BlockError::LastHeight)?;
        self.caches.refresh_all(self.store.as_ref()).await?;

        tracing::info!(
            "Block dispatcher initialized, last processed block {:?}",
            self.block_cache.last_height()
        );
        Ok(())
    }

    pub fn last_height(&self) -> Option<u64> {
        self.block_cache.last_height()
    }

    /// Process blocks until the source closes or a block fails.
    pub async fn run(mut self, mut blocks_rx: Receiver<IndexerBlock>) -> Result<(), BlockError> {
        tracing::info!("Block dispatcher started");

        while let Some(block) = blocks_rx.recv().await {
            match self.process_block(block).await? {
                BlockOutcome::Processed {
                    height,
                    handlers,
                    batches,
                    outputs,
                } => {
                    tracing::info!(
                        "Processed block {}: {} handlers in {} batches, {} output events",
                        height,
                        handlers,
                        batches,
                        outputs
                    );
                }
                BlockOutcome::AlreadyProcessed { height } => {
                    tracing::debug!("Block {} already processed, skipping", height);
                }
            }
        }

        tracing::info!("Block source closed, dispatcher shutting down");
        Ok(())
    }

    pub async fn process_block(&mut self, block: IndexerBlock) -> Result<BlockOutcome, BlockError> {
        let height = block.height;

        match self.block_cache.check(height) {
            BlockCheck::AlreadyProcessed => return Ok(BlockOutcome::AlreadyProcessed { height }),
            BlockCheck::Gap { last } => return Err(BlockError::HeightGap { height, last }),
            BlockCheck::Process => {}
        }

        let events = ordered_events(&block)?;

        let scope = self
            .store
            .begin()
            .await
            .map_err(|source| BlockError::Store { height, source })?;

        let applied = match self.apply(&block, &events, scope.clone()).await {
            Ok(applied) => scope
                .commit()
                .await
                .map(|_| applied)
                .map_err(|source| BlockError::Store { height, source }),
            Err(e) => {
                if let Err(rollback_err) = scope.rollback().await {
                    tracing::error!("Failed to roll back block {}: {}", height, rollback_err);
                }
                Err(e)
            }
        };

        let (outputs, handlers, batches) = match applied {
            Ok(applied) => applied,
            Err(e) => {
                tracing::error!("Block {} failed, rolled back: {}", height, e);
                self.restore_caches().await;
                return Err(e);
            }
        };

        self.block_cache.advance(height);

        let output_count = outputs.len();
        if !outputs.is_empty() {
            self.publisher
                .publish(OutputBatch {
                    height,
                    events: outputs,
                })
                .await
                .map_err(|source| BlockError::Publish { height, source })?;
        }

        Ok(BlockOutcome::Processed {
            height,
            handlers,
            batches,
            outputs: output_count,
        })
    }

    /// Run every handler of the block inside `scope`. Returns the output
    /// events in event order, the handler count and the batch count.
    async fn apply(
        &self,
        block: &IndexerBlock,
        events: &[&IndexerEvent],
        scope: Arc<dyn TxScope>,
    ) -> Result<(Vec<OutputEvent>, usize, usize), BlockError> {
        let height = block.height;

        let record = insert_block(block.height, block.time).map_err(|source| BlockError::Store { height, source })?;
        scope
            .execute(record)
            .await
            .map_err(|source| BlockError::Store { height, source })?;

        let block_info = Arc::new(BlockInfo::from(block));
        let mut handlers = Vec::with_capacity(events.len());
        for event in events {
            let built = self
                .registry
                .create(event, &block_info, scope.id())
                .map_err(|source| BlockError::Build {
                    subtype: event.subtype.clone(),
                    height,
                    transaction_index: event.transaction_index,
                    event_index: event.event_index,
                    source,
                })?;
            if let Some(handler) = built {
                handlers.push(handler);
            }
        }

        let id_sets: Vec<_> = handlers.iter().map(HandlerInstance::parallelization_ids).collect();
        let batches = partition(&id_sets);
        let handler_count = handlers.len();
        let batch_count = batches.len();

        let precomputed = self.precompute(&handlers, scope.as_ref(), height).await?;

        tracing::debug!(
            "Block {}: {} handlers in {} batches (tx scope {})",
            height,
            handler_count,
            batch_count,
            scope.id()
        );

        let ctx = HandlerContext::new(scope, self.caches.clone(), self.stats.clone());
        let mut pending = handlers.into_iter().zip(precomputed);
        let mut outputs = Vec::new();

        for range in batches {
            let batch: Vec<_> = pending.by_ref().take(range.len()).collect();
            outputs.extend(self.run_batch(batch, &ctx).await?);
        }

        Ok((outputs, handler_count, batch_count))
    }

    /// Results of `ender_block_processor`, aligned with `handlers`, when the
    /// block processor is enabled and every handler is atomic. Otherwise one
    /// `None` per handler.
    async fn precompute(
        &self,
        handlers: &[HandlerInstance],
        scope: &dyn TxScope,
        height: u64,
    ) -> Result<Vec<Option<JsonValue>>, BlockError> {
        let use_processor = self.use_block_processor
            && !handlers.is_empty()
            && handlers.iter().all(|h| h.strategy_kind() == StrategyKind::Atomic);
        if !use_processor {
            return Ok(vec![None; handlers.len()]);
        }

        let entries = handlers
            .iter()
            .map(|h| h.block_processor_entry().map_err(|source| handler_error(h, source)))
            .collect::<Result<Vec<_>, _>>()?;

        let result = scope
            .call_procedure(BLOCK_PROCESSOR, json!({ "height": height, "events": entries }))
            .await
            .map_err(|source| BlockError::Store { height, source })?;

        match result {
            JsonValue::Array(results) if results.len() == handlers.len() => {
                Ok(results.into_iter().map(Some).collect())
            }
            JsonValue::Array(results) => Err(BlockError::BlockProcessor {
                height,
                message: format!("{} results for {} events", results.len(), handlers.len()),
            }),
            other => Err(BlockError::BlockProcessor {
                height,
                message: format!("expected an array, got {}", other),
            }),
        }
    }

    /// Run one batch on the bounded worker pool and return its outputs in
    /// event order. The first failure cancels the rest of the batch.
    async fn run_batch(
        &self,
        batch: Vec<(HandlerInstance, Option<JsonValue>)>,
        ctx: &HandlerContext,
    ) -> Result<Vec<OutputEvent>, BlockError> {
        let semaphore = Arc::new(Semaphore::new(self.handler_concurrency));
        let mut join_set = JoinSet::new();
        let size = batch.len();

        for (index, (mut handler, precomputed)) in batch.into_iter().enumerate() {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| BlockError::PoolClosed)?;
            let ctx = ctx.clone();

            join_set.spawn(async move {
                let _permit = permit;
                let result = handler.internal_handle(&ctx, precomputed).await;
                (index, handler, result)
            });
        }

        let mut results = Vec::with_capacity(size);
        while let Some(joined) = join_set.join_next().await {
            let (index, handler, result) = match joined {
                Ok(joined) => joined,
                Err(e) => {
                    join_set.shutdown().await;
                    return Err(BlockError::Join(e));
                }
            };

            match result {
                Ok(events) => results.push((index, events)),
                Err(source) => {
                    join_set.shutdown().await;
                    return Err(handler_error(&handler, source));
                }
            }
        }

        results.sort_by_key(|(index, _)| *index);
        Ok(results.into_iter().flat_map(|(_, events)| events).collect())
    }

    /// Rebuild the caches from committed state after a rollback. If that
    /// fails the caches are emptied rather than left holding rolled-back rows.
    async fn restore_caches(&self) {
        if let Err(e) = self.caches.refresh_all(self.store.as_ref()).await {
            tracing::error!("Failed to refresh caches after rollback, clearing them: {}", e);
            self.caches.clear_all();
        }
    }
}

fn handler_error(handler: &HandlerInstance, source: HandlerError) -> BlockError {
    BlockError::Handler {
        handler: handler.name(),
        event_type: handler.event_type(),
        coordinates: handler.coordinates().clone(),
        source,
    }
}

/// The block's events sorted by (transaction index, event index), after
/// checking every position is unique and has a transaction hash.
fn ordered_events(block: &IndexerBlock) -> Result<Vec<&IndexerEvent>, BlockError> {
    let mut events: Vec<&IndexerEvent> = block.events.iter().collect();
    events.sort_by_key(|e| e.order_key());

    for pair in events.windows(2) {
        if pair[0].order_key() == pair[1].order_key() {
            return Err(BlockError::InvalidBlock {
                height: block.height,
                message: format!(
                    "duplicate event at tx {} event {}",
                    pair[1].transaction_index, pair[1].event_index
                ),
            });
        }
    }

    if let Some(event) = events
        .iter()
        .find(|e| e.transaction_index as usize >= block.tx_hashes.len())
    {
        return Err(BlockError::InvalidBlock {
            height: block.height,
            message: format!("no transaction hash for transaction index {}", event.transaction_index),
        });
    }

    Ok(events)
}
