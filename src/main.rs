use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

use ender_indexer::cache::Caches;
use ender_indexer::db::{DbPool, MemoryStore, Store};
use ender_indexer::dispatcher::BlockDispatcher;
use ender_indexer::publish::{to_json_lines, ChannelPublisher, OutputBatch};
use ender_indexer::source::read_blocks_from;
use ender_indexer::stats::{CsvStats, Stats, TracingStats};
use ender_indexer::types::config::indexer::IndexerConfig;

const CHANNEL_CAPACITY: usize = 64;
const DB_POOL_SIZE: usize = 4;

struct Args {
    config_path: PathBuf,
    in_memory: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args {
        config_path: PathBuf::from("config/config.json"),
        in_memory: false,
    };

    let mut iter = env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter.next().context("--config requires a path")?;
                args.config_path = PathBuf::from(path);
            }
            "--in-memory" => args.in_memory = true,
            other => anyhow::bail!("Unknown argument: {}", other),
        }
    }

    Ok(args)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = parse_args()?;
    let config = IndexerConfig::load(&args.config_path)?;

    let store: Arc<dyn Store> = if args.in_memory {
        tracing::info!("Running on the in-memory store, nothing will be persisted");
        Arc::new(MemoryStore::new())
    } else {
        let database_url = load_database_url(&config)?;
        let pool = DbPool::new(&database_url, DB_POOL_SIZE)
            .await
            .context("failed to create database pool")?;
        pool.run_migrations()
            .await
            .context("failed to run database migrations")?;

        tracing::info!("Database pool initialized and migrations complete");
        Arc::new(pool)
    };

    let stats: Arc<dyn Stats> = match &config.timing_csv_path {
        Some(path) => {
            tracing::info!("Writing handler timings to {}", path.display());
            Arc::new(CsvStats::create(path).with_context(|| {
                format!("failed to create timing file {}", path.display())
            })?)
        }
        None => Arc::new(TracingStats),
    };

    let (blocks_tx, blocks_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (outputs_tx, outputs_rx) = mpsc::channel(CHANNEL_CAPACITY);

    let mut dispatcher = BlockDispatcher::new(
        store,
        Arc::new(Caches::new()),
        stats,
        Arc::new(ChannelPublisher::new(outputs_tx)),
        &config,
    );
    dispatcher
        .initialize()
        .await
        .context("failed to initialize block dispatcher")?;

    let mut tasks: JoinSet<anyhow::Result<()>> = JoinSet::new();

    tasks.spawn({
        let blocks_path = config.blocks_path.clone();
        async move {
            let sent = read_blocks_from(blocks_path.as_deref(), blocks_tx)
                .await
                .map_err(|e| anyhow::anyhow!("block source error: {}", e))?;
            tracing::info!("Block source finished after {} blocks", sent);
            Ok(())
        }
    });

    tasks.spawn(async move {
        dispatcher
            .run(blocks_rx)
            .await
            .map_err(|e| anyhow::anyhow!("block dispatcher error: {}", e))
    });

    tasks.spawn({
        let output_path = config.output_path.clone();
        async move { write_outputs(output_path.as_deref(), outputs_rx).await }
    });

    while let Some(result) = tasks.join_next().await {
        result.context("indexer task panicked")??;
    }

    tracing::info!("All blocks processed");
    Ok(())
}

/// Reads the database URL from the configured env var, loading .env if needed.
fn load_database_url(config: &IndexerConfig) -> anyhow::Result<String> {
    let var = config.database_url_env_var.as_str();
    if let Ok(url) = env::var(var) {
        return Ok(url);
    }

    dotenvy::dotenv()
        .with_context(|| format!("Missing env var {} and failed to load .env file", var))?;

    env::var(var).with_context(|| format!("Missing required env var {} after loading .env", var))
}

/// Append every published batch as JSON lines to `path`, or stdout.
async fn write_outputs(
    path: Option<&Path>,
    mut outputs_rx: mpsc::Receiver<OutputBatch>,
) -> anyhow::Result<()> {
    let mut writer: Box<dyn AsyncWrite + Unpin + Send> = match path {
        Some(path) => Box::new(
            tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await
                .with_context(|| format!("failed to open output file {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdout()),
    };

    while let Some(batch) = outputs_rx.recv().await {
        let lines = to_json_lines(&batch)?;
        writer.write_all(lines.as_bytes()).await?;
        writer.flush().await?;
        tracing::debug!("Published {} output events for block {}", batch.events.len(), batch.height);
    }

    Ok(())
}
