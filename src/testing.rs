//! Shared test fixtures: seed data, event and block builders, recording
//! stats and publisher.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};

use crate::cache::Caches;
use crate::db::{MemoryStore, Store};
use crate::dispatcher::BlockDispatcher;
use crate::handlers::HandlerContext;
use crate::publish::{OutputBatch, PublishError, Publisher};
use crate::stats::{Stats, TimingTags};
use crate::types::block::{IndexerBlock, IndexerEvent};
use crate::types::config::handlers::StrategyConfig;
use crate::types::config::indexer::IndexerConfig;
use crate::types::entities::{Asset, LiquidityTier, Market, PerpetualMarket, PerpetualMarketStatus};

pub fn perpetual_market_row(id: i64, clob_pair_id: i64, ticker: &str) -> PerpetualMarket {
    PerpetualMarket {
        id,
        clob_pair_id,
        ticker: ticker.to_string(),
        market_id: id as i32,
        status: PerpetualMarketStatus::Active,
        atomic_resolution: -10,
        quantum_conversion_exponent: -8,
        subticks_per_tick: 100,
        step_base_quantums: 10,
        liquidity_tier_id: 0,
    }
}

fn rows<T: serde::Serialize>(entities: &[T]) -> Vec<JsonValue> {
    entities
        .iter()
        .map(|e| serde_json::to_value(e).unwrap())
        .collect()
}

/// BTC-USD on clob pair 0 and ETH-USD on clob pair 1, their oracle markets,
/// two liquidity tiers and the USDC asset.
pub fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();

    let mut eth = perpetual_market_row(1, 1, "ETH-USD");
    eth.liquidity_tier_id = 1;
    store
        .seed(
            "perpetual_markets",
            rows(&[perpetual_market_row(0, 0, "BTC-USD"), eth]),
        )
        .unwrap();

    store
        .seed(
            "markets",
            rows(&[
                Market {
                    id: 0,
                    pair: "BTC-USD".to_string(),
                    exponent: -5,
                    min_price_change_ppm: 50,
                },
                Market {
                    id: 1,
                    pair: "ETH-USD".to_string(),
                    exponent: -6,
                    min_price_change_ppm: 50,
                },
            ]),
        )
        .unwrap();

    store
        .seed(
            "liquidity_tiers",
            rows(&[
                LiquidityTier {
                    id: 0,
                    name: "Large-Cap".to_string(),
                    initial_margin_ppm: 50_000,
                    maintenance_fraction_ppm: 600_000,
                    open_interest_lower_cap: None,
                    open_interest_upper_cap: None,
                },
                LiquidityTier {
                    id: 1,
                    name: "Mid-Cap".to_string(),
                    initial_margin_ppm: 100_000,
                    maintenance_fraction_ppm: 500_000,
                    open_interest_lower_cap: None,
                    open_interest_upper_cap: None,
                },
            ]),
        )
        .unwrap();

    store
        .seed(
            "assets",
            rows(&[Asset {
                id: 0,
                symbol: "USDC".to_string(),
                atomic_resolution: -6,
                has_market: false,
                market_id: None,
            }]),
        )
        .unwrap();

    store
}

/// A handler context on a fresh seeded store with loaded caches and an open
/// scope.
pub async fn context(stats: Arc<RecordingStats>) -> (MemoryStore, HandlerContext) {
    let store = seeded_store();
    let caches = Arc::new(Caches::new());
    caches.refresh_all(&store).await.unwrap();
    let scope = store.begin().await.unwrap();
    (store, HandlerContext::new(scope, caches, stats))
}

pub fn event(subtype: &str, version: u32, transaction_index: u32, event_index: u32, data: JsonValue) -> IndexerEvent {
    IndexerEvent {
        subtype: subtype.to_string(),
        version,
        transaction_index,
        event_index,
        data,
    }
}

/// A block with one transaction hash per transaction index its events use.
pub fn block(height: u64, events: Vec<IndexerEvent>) -> IndexerBlock {
    let tx_count = events
        .iter()
        .map(|e| e.transaction_index as usize + 1)
        .max()
        .unwrap_or(0);

    IndexerBlock {
        height,
        time: 1_700_000_000 + height,
        tx_hashes: (0..tx_count).map(|i| format!("0x{:064x}", height * 1000 + i as u64)).collect(),
        events,
    }
}

pub fn update_clob_pair_data(clob_pair_id: u32, status: &str) -> JsonValue {
    json!({
        "clob_pair_id": clob_pair_id,
        "status": status,
        "quantum_conversion_exponent": -7,
        "subticks_per_tick": 5,
        "step_base_quantums": 1000
    })
}

#[derive(Default)]
pub struct RecordingStats {
    timings: Mutex<Vec<(String, TimingTags)>>,
}

impl RecordingStats {
    pub fn recorded(&self) -> Vec<TimingTags> {
        self.timings
            .lock()
            .unwrap()
            .iter()
            .map(|(_, tags)| tags.clone())
            .collect()
    }

    pub fn stat_names(&self) -> Vec<String> {
        self.timings
            .lock()
            .unwrap()
            .iter()
            .map(|(stat, _)| stat.clone())
            .collect()
    }
}

impl Stats for RecordingStats {
    fn timing(&self, stat: &str, _duration: Duration, tags: &TimingTags) {
        self.timings
            .lock()
            .unwrap()
            .push((stat.to_string(), tags.clone()));
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    batches: Mutex<Vec<OutputBatch>>,
    fail: bool,
}

impl RecordingPublisher {
    pub fn failing() -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn batches(&self) -> Vec<OutputBatch> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, batch: OutputBatch) -> Result<(), PublishError> {
        if self.fail {
            return Err(PublishError::ChannelClosed);
        }
        self.batches.lock().unwrap().push(batch);
        Ok(())
    }
}

/// A dispatcher over `store` with everything it touches exposed for
/// assertions.
pub struct Harness {
    pub dispatcher: BlockDispatcher,
    pub store: Arc<MemoryStore>,
    pub caches: Arc<Caches>,
    pub stats: Arc<RecordingStats>,
    pub publisher: Arc<RecordingPublisher>,
}

impl Harness {
    pub async fn new(store: MemoryStore, strategies: StrategyConfig, use_block_processor: bool) -> Self {
        Self::with_publisher(store, strategies, use_block_processor, RecordingPublisher::default()).await
    }

    pub async fn with_publisher(
        store: MemoryStore,
        strategies: StrategyConfig,
        use_block_processor: bool,
        publisher: RecordingPublisher,
    ) -> Self {
        let store = Arc::new(store);
        let caches = Arc::new(Caches::new());
        let stats = Arc::new(RecordingStats::default());
        let publisher = Arc::new(publisher);

        let config = IndexerConfig {
            strategies,
            use_block_processor_procedure: use_block_processor,
            handler_concurrency: 2,
            ..IndexerConfig::default()
        };

        let mut dispatcher = BlockDispatcher::new(
            store.clone(),
            caches.clone(),
            stats.clone(),
            publisher.clone(),
            &config,
        );
        dispatcher.initialize().await.unwrap();

        Self {
            dispatcher,
            store,
            caches,
            stats,
            publisher,
        }
    }
}
