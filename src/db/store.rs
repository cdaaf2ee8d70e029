//! Store collaborator traits.
//!
//! A [`Store`] hands out one [`TxScope`] per block. Every write a handler
//! issues, whether a server-side procedure call or a plain operation, goes
//! through that scope, and the scope is released exactly once by `commit` or
//! `rollback`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use super::error::DbError;
use super::types::{DbOperation, WhereClause};

/// Identifier of a block-wide transaction scope.
pub type TxId = u64;

#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Open a new transaction scope.
    async fn begin(&self) -> Result<Arc<dyn TxScope>, DbError>;

    /// Read every committed row of `table` as JSON documents.
    async fn load_table(&self, table: &str) -> Result<Vec<JsonValue>, DbError>;

    /// Height of the most recently committed block, if any.
    async fn latest_block_height(&self) -> Result<Option<u64>, DbError>;
}

#[async_trait]
pub trait TxScope: Send + Sync + 'static {
    fn id(&self) -> TxId;

    /// Invoke a server-side procedure with a JSON payload and return its
    /// JSON result.
    async fn call_procedure(
        &self,
        procedure: &str,
        payload: JsonValue,
    ) -> Result<JsonValue, DbError>;

    /// Execute a write and return the affected rows.
    async fn execute(&self, operation: DbOperation) -> Result<Vec<JsonValue>, DbError>;

    /// Read rows of `table` matching `where_clause`, including uncommitted
    /// writes made through this scope.
    async fn select(
        &self,
        table: &str,
        where_clause: &WhereClause,
    ) -> Result<Vec<JsonValue>, DbError>;

    async fn commit(&self) -> Result<(), DbError>;

    async fn rollback(&self) -> Result<(), DbError>;
}
