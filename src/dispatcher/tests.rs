//! End-to-end block processing against the in-memory store, plus an opt-in
//! run against Postgres.

use std::sync::Arc;

use serde_json::{json, Value as JsonValue};

use super::{BlockDispatcher, BlockError, BlockOutcome};
use crate::cache::Caches;
use crate::db::Store;
use crate::publish::OutputBatch;
use crate::stats::STEP_TIMING_STAT;
use crate::testing::{
    block, event, seeded_store, update_clob_pair_data, Harness, RecordingPublisher, RecordingStats,
};
use crate::types::block::IndexerBlock;
use crate::types::config::handlers::StrategyConfig;
use crate::types::config::indexer::IndexerConfig;
use crate::types::entities::{Asset, LiquidityTier, Market, PerpetualMarket, PerpetualMarketStatus};

/// Everything observable after a run: committed tables, cache contents and
/// published batches.
#[derive(Debug, PartialEq)]
struct Snapshot {
    tables: Vec<Vec<JsonValue>>,
    perpetual_markets: Vec<PerpetualMarket>,
    assets: Vec<Asset>,
    markets: Vec<Market>,
    liquidity_tiers: Vec<LiquidityTier>,
    published: Vec<OutputBatch>,
}

async fn snapshot(harness: &Harness) -> Snapshot {
    let mut tables = Vec::new();
    for table in ["blocks", "perpetual_markets", "assets", "markets", "liquidity_tiers"] {
        tables.push(harness.store.load_table(table).await.unwrap());
    }

    let mut perpetual_markets = harness.caches.perpetual_markets.values();
    perpetual_markets.sort_by_key(|m| m.id);
    let mut assets = harness.caches.assets.values();
    assets.sort_by_key(|a| a.id);
    let mut markets = harness.caches.markets.values();
    markets.sort_by_key(|m| m.id);
    let mut liquidity_tiers = harness.caches.liquidity_tiers.values();
    liquidity_tiers.sort_by_key(|t| t.id);

    Snapshot {
        tables,
        perpetual_markets,
        assets,
        markets,
        liquidity_tiers,
        published: harness.publisher.batches(),
    }
}

/// Two blocks touching every handler kind, with a repeated update of one
/// clob pair.
fn blocks() -> Vec<IndexerBlock> {
    vec![
        block(
            1,
            vec![
                event(
                    "market",
                    1,
                    0,
                    0,
                    json!({"id": 2, "pair": "SOL-USD", "exponent": -8, "min_price_change_ppm": 100}),
                ),
                event(
                    "asset",
                    1,
                    0,
                    1,
                    json!({"id": 1, "symbol": "SOL", "has_market": true, "market_id": 2, "atomic_resolution": -9}),
                ),
                event("update_clob_pair", 1, 1, 0, update_clob_pair_data(0, "PAUSED")),
                event(
                    "liquidity_tier",
                    2,
                    1,
                    1,
                    json!({
                        "id": 2, "name": "Long-Tail", "initial_margin_ppm": 200000,
                        "maintenance_fraction_ppm": 500000,
                        "open_interest_lower_cap": 1000, "open_interest_upper_cap": 5000
                    }),
                ),
                event("update_clob_pair", 1, 2, 0, update_clob_pair_data(1, "CANCEL_ONLY")),
            ],
        ),
        block(
            2,
            vec![
                event("update_clob_pair", 1, 0, 0, update_clob_pair_data(0, "ACTIVE")),
                event("update_clob_pair", 1, 0, 1, update_clob_pair_data(0, "FINAL_SETTLEMENT")),
                event(
                    "liquidity_tier",
                    1,
                    1,
                    0,
                    json!({"id": 0, "name": "Large-Cap", "initial_margin_ppm": 20000, "maintenance_fraction_ppm": 500000}),
                ),
            ],
        ),
    ]
}

async fn run_blocks(strategies: StrategyConfig, use_block_processor: bool) -> Snapshot {
    let mut harness = Harness::new(seeded_store(), strategies, use_block_processor).await;
    for b in blocks() {
        harness.dispatcher.process_block(b).await.unwrap();
    }
    snapshot(&harness).await
}

#[tokio::test]
async fn test_strategies_produce_identical_state() {
    let sequential = run_blocks(StrategyConfig::all(false), false).await;
    let atomic = run_blocks(StrategyConfig::all(true), false).await;
    let block_processor = run_blocks(StrategyConfig::all(true), true).await;
    let mixed = run_blocks(
        StrategyConfig {
            use_atomic_strategy_for_update_clob_pair: true,
            use_atomic_strategy_for_market_create: true,
            ..StrategyConfig::default()
        },
        true,
    )
    .await;

    assert_eq!(sequential, atomic);
    assert_eq!(sequential, block_processor);
    assert_eq!(sequential, mixed);

    let btc = &sequential.perpetual_markets[0];
    assert_eq!(btc.status, PerpetualMarketStatus::FinalSettlement);
    assert_eq!(sequential.perpetual_markets[1].status, PerpetualMarketStatus::CancelOnly);
    assert_eq!(sequential.assets[1].market_id, Some(2));
    assert_eq!(sequential.liquidity_tiers[0].initial_margin_ppm, 20_000);
    assert_eq!(sequential.liquidity_tiers[2].open_interest_upper_cap, Some(5000));
}

#[tokio::test]
async fn test_cache_matches_committed_rows() {
    let snapshot = run_blocks(StrategyConfig::all(false), false).await;

    let mut stored: Vec<PerpetualMarket> = snapshot.tables[1]
        .iter()
        .map(|row| serde_json::from_value(row.clone()).unwrap())
        .collect();
    stored.sort_by_key(|m| m.id);
    assert_eq!(stored, snapshot.perpetual_markets);

    let mut tiers: Vec<LiquidityTier> = snapshot.tables[4]
        .iter()
        .map(|row| serde_json::from_value(row.clone()).unwrap())
        .collect();
    tiers.sort_by_key(|t| t.id);
    assert_eq!(tiers, snapshot.liquidity_tiers);
}

#[tokio::test]
async fn test_outputs_follow_event_order() {
    let mut harness = Harness::new(seeded_store(), StrategyConfig::all(false), false).await;

    // Listed out of order on purpose.
    let b = block(
        1,
        vec![
            event("update_clob_pair", 1, 2, 0, update_clob_pair_data(1, "ACTIVE")),
            event(
                "liquidity_tier",
                1,
                1,
                0,
                json!({"id": 1, "name": "Mid-Cap", "initial_margin_ppm": 100000, "maintenance_fraction_ppm": 400000}),
            ),
            event("update_clob_pair", 1, 0, 0, update_clob_pair_data(0, "POST_ONLY")),
        ],
    );
    harness.dispatcher.process_block(b).await.unwrap();

    let batches = harness.publisher.batches();
    assert_eq!(batches.len(), 1);
    let keys: Vec<&str> = batches[0].events.iter().map(|e| e.key.as_str()).collect();
    assert_eq!(keys, vec!["0", "1", "1"]);
    assert!(batches[0].events[0].payload["trading"]["BTC-USD"].is_object());
    assert!(batches[0].events[1].payload["liquidity_tiers"]["1"].is_object());
    assert!(batches[0].events[2].payload["trading"]["ETH-USD"].is_object());
}

#[tokio::test]
async fn test_conflicting_updates_run_in_separate_batches() {
    let mut harness = Harness::new(seeded_store(), StrategyConfig::all(false), false).await;

    let b = block(
        1,
        vec![
            event("update_clob_pair", 1, 0, 0, update_clob_pair_data(0, "PAUSED")),
            event("update_clob_pair", 1, 0, 1, update_clob_pair_data(1, "PAUSED")),
            event("update_clob_pair", 1, 1, 0, update_clob_pair_data(0, "CANCEL_ONLY")),
        ],
    );
    let outcome = harness.dispatcher.process_block(b).await.unwrap();

    assert_eq!(
        outcome,
        BlockOutcome::Processed {
            height: 1,
            handlers: 3,
            batches: 2,
            outputs: 3,
        }
    );
    let btc = harness.caches.perpetual_markets.lookup_by_clob_pair_id(0).unwrap();
    assert_eq!(btc.status, PerpetualMarketStatus::CancelOnly);

    let batches = harness.publisher.batches();
    let statuses: Vec<&JsonValue> = batches[0]
        .events
        .iter()
        .map(|e| &e.payload["trading"])
        .collect();
    assert_eq!(statuses[0]["BTC-USD"]["status"], json!("PAUSED"));
    assert_eq!(statuses[2]["BTC-USD"]["status"], json!("CANCEL_ONLY"));
}

#[tokio::test]
async fn test_failed_block_rolls_back_everything() {
    for strategies in [StrategyConfig::all(false), StrategyConfig::all(true)] {
        let mut harness = Harness::new(seeded_store(), strategies, false).await;
        let before = snapshot(&harness).await;

        let b = block(
            1,
            vec![
                event("update_clob_pair", 1, 0, 0, update_clob_pair_data(0, "PAUSED")),
                event(
                    "market",
                    1,
                    0,
                    1,
                    json!({"id": 7, "pair": "AVAX-USD", "exponent": -8, "min_price_change_ppm": 100}),
                ),
                event("update_clob_pair", 1, 1, 0, update_clob_pair_data(0, "ACTIVE")),
                event("update_clob_pair", 1, 2, 0, update_clob_pair_data(99, "ACTIVE")),
            ],
        );

        let err = harness.dispatcher.process_block(b).await.unwrap_err();
        assert!(matches!(err, BlockError::Handler { .. }));

        assert_eq!(snapshot(&harness).await, before);
        assert!(harness.caches.markets.lookup(&7).is_none());
        assert_eq!(
            harness.caches.perpetual_markets.lookup_by_clob_pair_id(0).unwrap().status,
            PerpetualMarketStatus::Active
        );
        assert_eq!(harness.dispatcher.last_height(), None);
    }
}

#[tokio::test]
async fn test_failed_block_processor_call_rolls_back() {
    let mut harness = Harness::new(seeded_store(), StrategyConfig::all(true), true).await;
    let before = snapshot(&harness).await;

    let b = block(
        1,
        vec![
            event("update_clob_pair", 1, 0, 0, update_clob_pair_data(0, "PAUSED")),
            event("update_clob_pair", 1, 1, 0, update_clob_pair_data(42, "PAUSED")),
        ],
    );

    let err = harness.dispatcher.process_block(b).await.unwrap_err();
    assert!(matches!(err, BlockError::Store { height: 1, .. }));
    assert_eq!(snapshot(&harness).await, before);
}

#[tokio::test]
async fn test_failed_block_can_be_reprocessed() {
    let mut harness = Harness::new(seeded_store(), StrategyConfig::all(false), false).await;

    let bad = block(1, vec![event("update_clob_pair", 1, 0, 0, update_clob_pair_data(99, "ACTIVE"))]);
    assert!(harness.dispatcher.process_block(bad).await.is_err());

    let good = block(1, vec![event("update_clob_pair", 1, 0, 0, update_clob_pair_data(0, "PAUSED"))]);
    harness.dispatcher.process_block(good).await.unwrap();
    assert_eq!(harness.dispatcher.last_height(), Some(1));
}

#[tokio::test]
async fn test_unspecified_status_fails_block() {
    let mut harness = Harness::new(seeded_store(), StrategyConfig::all(true), false).await;
    let b = block(1, vec![event("update_clob_pair", 1, 0, 0, update_clob_pair_data(0, "UNSPECIFIED"))]);

    let err = harness.dispatcher.process_block(b).await.unwrap_err();
    assert!(matches!(err, BlockError::Build { .. }));
    assert!(harness.publisher.batches().is_empty());
}

#[tokio::test]
async fn test_duplicate_block_skipped() {
    let mut harness = Harness::new(seeded_store(), StrategyConfig::all(false), false).await;
    let b = block(1, vec![event("update_clob_pair", 1, 0, 0, update_clob_pair_data(0, "PAUSED"))]);

    harness.dispatcher.process_block(b.clone()).await.unwrap();
    let outcome = harness.dispatcher.process_block(b).await.unwrap();

    assert_eq!(outcome, BlockOutcome::AlreadyProcessed { height: 1 });
    assert_eq!(harness.publisher.batches().len(), 1);
}

#[tokio::test]
async fn test_height_gap_rejected() {
    let mut harness = Harness::new(seeded_store(), StrategyConfig::all(false), false).await;
    harness.dispatcher.process_block(block(1, vec![])).await.unwrap();

    let err = harness.dispatcher.process_block(block(3, vec![])).await.unwrap_err();
    assert!(matches!(err, BlockError::HeightGap { height: 3, last: 1 }));
}

#[tokio::test]
async fn test_restart_resumes_after_committed_height() {
    let mut harness = Harness::new(seeded_store(), StrategyConfig::all(false), false).await;
    harness
        .dispatcher
        .process_block(block(1, vec![event("update_clob_pair", 1, 0, 0, update_clob_pair_data(0, "PAUSED"))]))
        .await
        .unwrap();

    // A fresh dispatcher over the same committed state.
    let caches = Arc::new(Caches::new());
    let mut restarted = BlockDispatcher::new(
        harness.store.clone(),
        caches.clone(),
        Arc::new(RecordingStats::default()),
        Arc::new(RecordingPublisher::default()),
        &IndexerConfig::default(),
    );
    restarted.initialize().await.unwrap();

    assert_eq!(restarted.last_height(), Some(1));
    assert_eq!(
        caches.perpetual_markets.lookup_by_clob_pair_id(0).unwrap().status,
        PerpetualMarketStatus::Paused
    );
    assert_eq!(
        restarted.process_block(block(1, vec![])).await.unwrap(),
        BlockOutcome::AlreadyProcessed { height: 1 }
    );
}

#[tokio::test]
async fn test_timing_stats_only_for_sequential_strategy() {
    let events = || {
        vec![
            event("update_clob_pair", 1, 0, 0, update_clob_pair_data(0, "PAUSED")),
            event(
                "market",
                1,
                0,
                1,
                json!({"id": 3, "pair": "DOGE-USD", "exponent": -10, "min_price_change_ppm": 100}),
            ),
        ]
    };

    let mut sequential = Harness::new(seeded_store(), StrategyConfig::all(false), false).await;
    sequential.dispatcher.process_block(block(1, events())).await.unwrap();
    let mut fn_names: Vec<&str> = sequential.stats.recorded().iter().map(|t| t.fn_name).collect();
    fn_names.sort_unstable();
    assert_eq!(fn_names, vec!["create_market", "update_clob_pair"]);
    assert!(sequential
        .stats
        .stat_names()
        .iter()
        .all(|s| s == STEP_TIMING_STAT));

    let mut atomic = Harness::new(seeded_store(), StrategyConfig::all(true), false).await;
    atomic.dispatcher.process_block(block(1, events())).await.unwrap();
    assert!(atomic.stats.recorded().is_empty());
}

#[tokio::test]
async fn test_asset_referencing_absent_market_succeeds() {
    for strategies in [StrategyConfig::all(false), StrategyConfig::all(true)] {
        let mut harness = Harness::new(seeded_store(), strategies, false).await;
        let b = block(
            1,
            vec![event(
                "asset",
                1,
                0,
                0,
                json!({"id": 9, "symbol": "NEW", "has_market": true, "market_id": 77, "atomic_resolution": -8}),
            )],
        );

        let outcome = harness.dispatcher.process_block(b).await.unwrap();
        assert!(matches!(outcome, BlockOutcome::Processed { outputs: 0, .. }));
        assert_eq!(harness.caches.assets.lookup(&9).unwrap().market_id, Some(77));
        assert!(harness.publisher.batches().is_empty());
    }
}

#[tokio::test]
async fn test_unknown_subtype_skipped() {
    let mut harness = Harness::new(seeded_store(), StrategyConfig::all(false), false).await;
    let b = block(
        1,
        vec![
            event("transfer", 1, 0, 0, json!({"amount": 5})),
            event("update_clob_pair", 1, 0, 1, update_clob_pair_data(0, "PAUSED")),
        ],
    );

    let outcome = harness.dispatcher.process_block(b).await.unwrap();
    assert!(matches!(outcome, BlockOutcome::Processed { handlers: 1, outputs: 1, .. }));
}

#[tokio::test]
async fn test_publish_failure_reported_after_commit() {
    let mut harness = Harness::with_publisher(
        seeded_store(),
        StrategyConfig::all(false),
        false,
        RecordingPublisher::failing(),
    )
    .await;
    let b = block(1, vec![event("update_clob_pair", 1, 0, 0, update_clob_pair_data(0, "PAUSED"))]);

    let err = harness.dispatcher.process_block(b).await.unwrap_err();
    assert!(matches!(err, BlockError::Publish { height: 1, .. }));
    assert_eq!(harness.dispatcher.last_height(), Some(1));
    assert_eq!(harness.store.latest_block_height().await.unwrap(), Some(1));
}

#[tokio::test]
async fn test_run_drains_channel() {
    let harness = Harness::new(seeded_store(), StrategyConfig::all(false), false).await;
    let (tx, rx) = tokio::sync::mpsc::channel(4);
    for b in blocks() {
        tx.send(b).await.unwrap();
    }
    drop(tx);

    harness.dispatcher.run(rx).await.unwrap();
    assert_eq!(harness.store.latest_block_height().await.unwrap(), Some(2));
    assert_eq!(harness.publisher.batches().len(), 2);
}

#[tokio::test]
async fn test_v1_tier_upsert_keeps_open_interest_caps() {
    let runs = [
        (StrategyConfig::all(false), false),
        (StrategyConfig::all(true), false),
        (StrategyConfig::all(true), true),
    ];

    for (strategies, use_block_processor) in runs {
        let mut harness = Harness::new(seeded_store(), strategies, use_block_processor).await;
        let v2 = json!({
            "id": 1, "name": "Mid-Cap", "initial_margin_ppm": 100000,
            "maintenance_fraction_ppm": 500000,
            "open_interest_lower_cap": 25, "open_interest_upper_cap": 50
        });
        let v1 = json!({
            "id": 1, "name": "Mid-Cap", "initial_margin_ppm": 120000,
            "maintenance_fraction_ppm": 500000
        });
        harness
            .dispatcher
            .process_block(block(1, vec![event("liquidity_tier", 2, 0, 0, v2)]))
            .await
            .unwrap();
        harness
            .dispatcher
            .process_block(block(2, vec![event("liquidity_tier", 1, 0, 0, v1)]))
            .await
            .unwrap();

        let cached = harness.caches.liquidity_tiers.lookup(&1).unwrap();
        assert_eq!(cached.initial_margin_ppm, 120_000);
        assert_eq!(cached.open_interest_lower_cap, Some(25));
        assert_eq!(cached.open_interest_upper_cap, Some(50));

        let stored: Vec<LiquidityTier> = harness
            .store
            .load_table("liquidity_tiers")
            .await
            .unwrap()
            .into_iter()
            .map(|row| serde_json::from_value(row).unwrap())
            .collect();
        assert!(stored.contains(&cached));

        let published = harness.publisher.batches();
        assert_eq!(
            published[1].events[0].payload["liquidity_tiers"]["1"]["open_interest_lower_cap"],
            json!(25)
        );
    }
}

/// Runs the same blocks on Postgres and on the in-memory store. Needs a
/// scratch database in `ENDER_TEST_DATABASE_URL`; its indexer tables are
/// truncated.
mod postgres {
    use super::*;
    use crate::db::DbPool;
    use crate::publish::Publisher;

    const TABLES: [&str; 5] = ["blocks", "perpetual_markets", "assets", "markets", "liquidity_tiers"];
    const SEEDED_TABLES: [&str; 4] = ["perpetual_markets", "assets", "markets", "liquidity_tiers"];

    type Observed = (Vec<Vec<JsonValue>>, Vec<OutputBatch>);

    /// An asset whose market was never indexed and a version 1 upsert of a
    /// tier that has caps.
    fn extra_block() -> IndexerBlock {
        block(
            3,
            vec![
                event(
                    "asset",
                    1,
                    0,
                    0,
                    json!({"id": 9, "symbol": "NEW", "has_market": true, "market_id": 77, "atomic_resolution": -8}),
                ),
                event(
                    "liquidity_tier",
                    1,
                    0,
                    1,
                    json!({"id": 2, "name": "Long-Tail", "initial_margin_ppm": 250000, "maintenance_fraction_ppm": 500000}),
                ),
            ],
        )
    }

    async fn reset(client: &tokio_postgres::Client) {
        client
            .batch_execute("TRUNCATE blocks, assets, markets, liquidity_tiers, perpetual_markets")
            .await
            .unwrap();

        let seed = seeded_store();
        for table in SEEDED_TABLES {
            let rows = JsonValue::Array(seed.load_table(table).await.unwrap());
            let sql = format!(
                "INSERT INTO {table} SELECT * FROM jsonb_populate_recordset(NULL::{table}, $1)"
            );
            client.execute(sql.as_str(), &[&rows]).await.unwrap();
        }
    }

    async fn run_on(store: Arc<dyn Store>, strategies: StrategyConfig, use_block_processor: bool) -> Observed {
        let publisher = Arc::new(RecordingPublisher::default());
        let config = IndexerConfig {
            strategies,
            use_block_processor_procedure: use_block_processor,
            handler_concurrency: 2,
            ..IndexerConfig::default()
        };
        let mut dispatcher = BlockDispatcher::new(
            store.clone(),
            Arc::new(Caches::new()),
            Arc::new(RecordingStats::default()),
            publisher.clone() as Arc<dyn Publisher>,
            &config,
        );
        dispatcher.initialize().await.unwrap();

        for b in blocks().into_iter().chain([extra_block()]) {
            dispatcher.process_block(b).await.unwrap();
        }

        let mut tables = Vec::new();
        for table in TABLES {
            let mut rows = store.load_table(table).await.unwrap();
            rows.sort_by_key(|row| row.to_string());
            tables.push(rows);
        }
        (tables, publisher.batches())
    }

    #[tokio::test]
    #[ignore]
    async fn test_postgres_store_matches_memory_store() {
        let Ok(url) = std::env::var("ENDER_TEST_DATABASE_URL") else {
            return;
        };

        let (client, connection) = tokio_postgres::connect(&url, tokio_postgres::NoTls).await.unwrap();
        tokio::spawn(connection);

        let pool: Arc<dyn Store> = {
            let pool = DbPool::new(&url, 4).await.unwrap();
            pool.run_migrations().await.unwrap();
            Arc::new(pool)
        };

        let memory: Arc<dyn Store> = Arc::new(seeded_store());
        let expected = run_on(memory, StrategyConfig::all(false), false).await;
        let absent_market_asset = expected.0[2].iter().find(|row| row["id"] == json!(9)).unwrap();
        assert_eq!(absent_market_asset["market_id"], json!(77));

        let runs = [
            (StrategyConfig::all(false), false),
            (StrategyConfig::all(true), false),
            (StrategyConfig::all(true), true),
        ];
        for (strategies, use_block_processor) in runs {
            reset(&client).await;
            let observed = run_on(pool.clone(), strategies, use_block_processor).await;
            assert_eq!(observed, expected);
        }
    }
}
