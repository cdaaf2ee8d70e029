//! In-memory [`Store`] with the same observable semantics as the Postgres
//! store: rows come back as `row_to_json`-shaped documents, primary and
//! unique keys are enforced, a scope works on a private snapshot that only
//! becomes visible on commit, and the server-side handler procedures are
//! emulated by [`procedures`].
//!
//! Only one scope is expected to be open at a time (one block at a time); if
//! two scopes overlap, the last one to commit wins.

mod procedures;
mod table;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use super::error::DbError;
use super::store::{Store, TxId, TxScope};
use super::types::{DbOperation, WhereClause};

pub(crate) use table::Table;

/// Schema of the tables the indexer writes: (name, columns, primary key,
/// unique columns). Mirrors `migrations/001_tables.sql`, which has no foreign
/// keys: an asset may reference a market that was never indexed.
const SCHEMA: &[(&str, &[&str], &str, &[&str])] = &[
    ("blocks", &["block_height", "time"], "block_height", &[]),
    (
        "markets",
        &["id", "pair", "exponent", "min_price_change_ppm"],
        "id",
        &[],
    ),
    (
        "assets",
        &["id", "symbol", "atomic_resolution", "has_market", "market_id"],
        "id",
        &[],
    ),
    (
        "liquidity_tiers",
        &[
            "id",
            "name",
            "initial_margin_ppm",
            "maintenance_fraction_ppm",
            "open_interest_lower_cap",
            "open_interest_upper_cap",
        ],
        "id",
        &[],
    ),
    (
        "perpetual_markets",
        &[
            "id",
            "clob_pair_id",
            "ticker",
            "market_id",
            "status",
            "atomic_resolution",
            "quantum_conversion_exponent",
            "subticks_per_tick",
            "step_base_quantums",
            "liquidity_tier_id",
        ],
        "id",
        &["clob_pair_id"],
    ),
];

/// All tables of one database state.
#[derive(Debug, Clone)]
pub(crate) struct Tables {
    tables: BTreeMap<String, Table>,
}

impl Tables {
    fn new() -> Self {
        let tables = SCHEMA
            .iter()
            .map(|(name, columns, pk, unique)| {
                (name.to_string(), Table::new(name, columns, pk, unique))
            })
            .collect();
        Self { tables }
    }

    pub(crate) fn table(&self, name: &str) -> Result<&Table, DbError> {
        self.tables
            .get(name)
            .ok_or_else(|| DbError::UnknownTable(name.to_string()))
    }

    pub(crate) fn table_mut(&mut self, name: &str) -> Result<&mut Table, DbError> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| DbError::UnknownTable(name.to_string()))
    }

    pub(crate) fn execute(&mut self, operation: DbOperation) -> Result<Vec<JsonValue>, DbError> {
        match operation {
            DbOperation::Insert {
                table,
                columns,
                values,
            } => {
                let row = self.table(&table)?.row_from(&columns, &values)?;
                let inserted = self.table_mut(&table)?.insert(row)?;
                Ok(vec![inserted])
            }
            DbOperation::Upsert {
                table,
                columns,
                values,
                conflict_columns,
                update_columns,
            } => {
                let row = self.table(&table)?.row_from(&columns, &values)?;
                let affected =
                    self.table_mut(&table)?
                        .upsert(row, &conflict_columns, &update_columns)?;
                Ok(affected.into_iter().collect())
            }
            DbOperation::Update {
                table,
                set_columns,
                where_clause,
            } => self.table_mut(&table)?.update(&set_columns, &where_clause),
        }
    }
}

/// In-memory store.
pub struct MemoryStore {
    committed: Arc<RwLock<Tables>>,
    next_tx_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            committed: Arc::new(RwLock::new(Tables::new())),
            next_tx_id: AtomicU64::new(1),
        }
    }

    /// Insert committed rows directly, bypassing any scope.
    pub fn seed(&self, table: &str, rows: Vec<JsonValue>) -> Result<(), DbError> {
        let mut tables = self.committed.write().unwrap_or_else(|e| e.into_inner());
        let table = tables.table_mut(table)?;
        for row in rows {
            let row = table.normalize(row)?;
            table.insert(row)?;
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Arc<dyn TxScope>, DbError> {
        let snapshot = self
            .committed
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let id = self.next_tx_id.fetch_add(1, Ordering::Relaxed);

        Ok(Arc::new(MemoryTxScope {
            id,
            committed: self.committed.clone(),
            staged: Mutex::new(Some(snapshot)),
        }))
    }

    async fn load_table(&self, table: &str) -> Result<Vec<JsonValue>, DbError> {
        let tables = self.committed.read().unwrap_or_else(|e| e.into_inner());
        Ok(tables.table(table)?.rows())
    }

    async fn latest_block_height(&self) -> Result<Option<u64>, DbError> {
        let tables = self.committed.read().unwrap_or_else(|e| e.into_inner());
        Ok(tables
            .table("blocks")?
            .rows()
            .iter()
            .filter_map(|row| row.get("block_height").and_then(JsonValue::as_u64))
            .max())
    }
}

/// Scope over a private snapshot of the committed tables.
pub struct MemoryTxScope {
    id: TxId,
    committed: Arc<RwLock<Tables>>,
    staged: Mutex<Option<Tables>>,
}

impl MemoryTxScope {
    fn with_staged<T>(
        &self,
        f: impl FnOnce(&mut Tables) -> Result<T, DbError>,
    ) -> Result<T, DbError> {
        let mut guard = self.staged.lock().unwrap_or_else(|e| e.into_inner());
        let tables = guard.as_mut().ok_or(DbError::ScopeClosed(self.id))?;
        f(tables)
    }

    fn take_staged(&self) -> Result<Tables, DbError> {
        self.staged
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or(DbError::ScopeClosed(self.id))
    }
}

#[async_trait]
impl TxScope for MemoryTxScope {
    fn id(&self) -> TxId {
        self.id
    }

    async fn call_procedure(
        &self,
        procedure: &str,
        payload: JsonValue,
    ) -> Result<JsonValue, DbError> {
        self.with_staged(|tables| procedures::call(tables, procedure, &payload))
    }

    async fn execute(&self, operation: DbOperation) -> Result<Vec<JsonValue>, DbError> {
        self.with_staged(|tables| tables.execute(operation))
    }

    async fn select(
        &self,
        table: &str,
        where_clause: &WhereClause,
    ) -> Result<Vec<JsonValue>, DbError> {
        self.with_staged(|tables| Ok(tables.table(table)?.select(where_clause)))
    }

    async fn commit(&self) -> Result<(), DbError> {
        let staged = self.take_staged()?;
        *self.committed.write().unwrap_or_else(|e| e.into_inner()) = staged;
        tracing::trace!("In-memory scope {} committed", self.id);
        Ok(())
    }

    async fn rollback(&self) -> Result<(), DbError> {
        self.take_staged()?;
        tracing::trace!("In-memory scope {} rolled back", self.id);
        Ok(())
    }
}
