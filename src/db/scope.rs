use std::sync::atomic::{AtomicU8, Ordering};

use async_trait::async_trait;
use deadpool_postgres::Object;
use serde_json::Value as JsonValue;
use tokio_postgres::types::ToSql;

use super::error::DbError;
use super::pool::is_identifier;
use super::sql::{build_operation_sql, build_select_sql, SqlParam};
use super::store::{TxId, TxScope};
use super::types::{DbOperation, WhereClause};

const OPEN: u8 = 0;
const RELEASING: u8 = 1;
const RELEASED: u8 = 2;

/// Where a scope is between BEGIN and a completed COMMIT or ROLLBACK.
struct Lifecycle(AtomicU8);

impl Lifecycle {
    fn new() -> Self {
        Self(AtomicU8::new(OPEN))
    }

    fn is_open(&self) -> bool {
        self.0.load(Ordering::Acquire) == OPEN
    }

    /// Claims the single COMMIT or ROLLBACK. False if one was already issued.
    fn begin_release(&self) -> bool {
        self.0
            .compare_exchange(OPEN, RELEASING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn mark_released(&self) {
        self.0.store(RELEASED, Ordering::Release);
    }

    /// Only a connection whose COMMIT or ROLLBACK went through is clean.
    fn returns_to_pool(&self) -> bool {
        self.0.load(Ordering::Acquire) == RELEASED
    }
}

/// A block-wide Postgres transaction on one pooled connection.
///
/// Handlers of the same batch issue their statements concurrently on the
/// shared connection; tokio-postgres pipelines them. If the scope is dropped
/// without a successful `commit` or `rollback` the connection is detached
/// from the pool and closed, which makes the server abort the open
/// transaction.
pub struct PgTxScope {
    id: TxId,
    client: Option<Object>,
    lifecycle: Lifecycle,
}

impl PgTxScope {
    pub(crate) fn new(id: TxId, client: Object) -> Self {
        Self {
            id,
            client: Some(client),
            lifecycle: Lifecycle::new(),
        }
    }

    fn client(&self) -> Result<&Object, DbError> {
        if !self.lifecycle.is_open() {
            return Err(DbError::ScopeClosed(self.id));
        }
        self.client.as_ref().ok_or(DbError::ScopeClosed(self.id))
    }

    async fn query_json(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<JsonValue>, DbError> {
        let params_refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let rows = self
            .client()?
            .query(sql, &params_refs[..])
            .await
            .map_err(|e| {
                let db_err: DbError = e.into();
                tracing::error!("SQL execution failed\n  SQL: {}\n  Error: {}", sql, db_err);
                db_err
            })?;

        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    async fn finish(&self, statement: &str) -> Result<(), DbError> {
        let client = self.client()?;
        if !self.lifecycle.begin_release() {
            return Err(DbError::ScopeClosed(self.id));
        }

        client.batch_execute(statement).await?;
        self.lifecycle.mark_released();
        tracing::trace!("Transaction scope {} finished with {}", self.id, statement);
        Ok(())
    }
}

#[async_trait]
impl TxScope for PgTxScope {
    fn id(&self) -> TxId {
        self.id
    }

    async fn call_procedure(
        &self,
        procedure: &str,
        payload: JsonValue,
    ) -> Result<JsonValue, DbError> {
        if !is_identifier(procedure) {
            return Err(DbError::UnknownProcedure(procedure.to_string()));
        }

        let sql = format!("SELECT {}($1::jsonb) AS result", procedure);
        let row = self
            .client()?
            .query_one(&sql, &[&payload])
            .await?;
        let result: Option<JsonValue> = row.get(0);
        Ok(result.unwrap_or(JsonValue::Null))
    }

    async fn execute(&self, operation: DbOperation) -> Result<Vec<JsonValue>, DbError> {
        let (sql, params) = build_operation_sql(&operation);
        self.query_json(&sql, &params).await
    }

    async fn select(
        &self,
        table: &str,
        where_clause: &WhereClause,
    ) -> Result<Vec<JsonValue>, DbError> {
        if !is_identifier(table) {
            return Err(DbError::UnknownTable(table.to_string()));
        }
        let (sql, params) = build_select_sql(table, where_clause);
        self.query_json(&sql, &params).await
    }

    async fn commit(&self) -> Result<(), DbError> {
        self.finish("COMMIT").await
    }

    async fn rollback(&self) -> Result<(), DbError> {
        self.finish("ROLLBACK").await
    }
}

impl Drop for PgTxScope {
    fn drop(&mut self) {
        if self.lifecycle.returns_to_pool() {
            return;
        }
        if self.lifecycle.is_open() {
            tracing::warn!(
                "Transaction scope {} dropped without commit or rollback, discarding connection",
                self.id
            );
        } else {
            tracing::warn!(
                "Transaction scope {} failed to release, discarding connection",
                self.id
            );
        }
        if let Some(client) = self.client.take() {
            drop(Object::take(client));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_returns_only_after_release() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.is_open());
        assert!(!lifecycle.returns_to_pool());

        assert!(lifecycle.begin_release());
        assert!(!lifecycle.is_open());
        // COMMIT or ROLLBACK not yet through, e.g. the connection broke.
        assert!(!lifecycle.returns_to_pool());

        lifecycle.mark_released();
        assert!(lifecycle.returns_to_pool());
    }

    #[test]
    fn test_release_claimed_once() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.begin_release());
        assert!(!lifecycle.begin_release());
    }
}
