use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use serde_json::Value as JsonValue;
use tokio_postgres::NoTls;

use super::error::DbError;
use super::scope::PgTxScope;
use super::store::{Store, TxScope};

/// Postgres-backed [`Store`].
pub struct DbPool {
    pool: Pool,
    next_tx_id: AtomicU64,
}

impl DbPool {
    pub async fn new(database_url: &str, max_size: usize) -> Result<Self, DbError> {
        let config = database_url
            .parse::<tokio_postgres::Config>()
            .map_err(|e| DbError::InvalidConnectionString(e.to_string()))?;

        let manager_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let manager = Manager::from_config(config, NoTls, manager_config);

        let pool = Pool::builder(manager)
            .max_size(max_size)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(DbError::BuildError)?;

        let _conn = pool.get().await?;
        tracing::info!("Database connection pool created successfully");

        Ok(Self {
            pool,
            next_tx_id: AtomicU64::new(1),
        })
    }

    pub async fn run_migrations(&self) -> Result<(), DbError> {
        super::migrations::run(&self.pool).await
    }
}

#[async_trait]
impl Store for DbPool {
    async fn begin(&self) -> Result<Arc<dyn TxScope>, DbError> {
        let client = self.pool.get().await?;
        client.batch_execute("BEGIN").await?;

        let id = self.next_tx_id.fetch_add(1, Ordering::Relaxed);
        tracing::trace!("Opened transaction scope {}", id);
        Ok(Arc::new(PgTxScope::new(id, client)))
    }

    async fn load_table(&self, table: &str) -> Result<Vec<JsonValue>, DbError> {
        if !is_identifier(table) {
            return Err(DbError::UnknownTable(table.to_string()));
        }

        let client = self.pool.get().await?;
        let rows = client
            .query(
                &format!("SELECT row_to_json(t)::jsonb FROM {} t", table),
                &[],
            )
            .await?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    async fn latest_block_height(&self) -> Result<Option<u64>, DbError> {
        let client = self.pool.get().await?;
        let row = client
            .query_one("SELECT MAX(block_height) FROM blocks", &[])
            .await?;
        let height: Option<i64> = row.get(0);
        Ok(height.map(|h| h as u64))
    }
}

/// Table and procedure names are interpolated into SQL, so only plain
/// identifiers are accepted.
pub(crate) fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit())
}
