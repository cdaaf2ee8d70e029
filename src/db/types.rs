use serde_json::Value as JsonValue;

/// A value that can be written to the store.
///
/// The variant must match the column type: `Int64` for BIGINT columns,
/// `Int32` for INTEGER columns.
#[derive(Debug, Clone, PartialEq)]
pub enum DbValue {
    /// NULL value
    Null,
    /// Boolean
    Bool(bool),
    /// Signed 64-bit integer (BIGINT)
    Int64(i64),
    /// Signed 32-bit integer (INTEGER)
    Int32(i32),
    /// Text (unlimited length)
    Text(String),
}

impl DbValue {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, DbValue::Null)
    }

    /// Nullable BIGINT.
    pub fn opt_i64(value: Option<i64>) -> Self {
        value.map(DbValue::Int64).unwrap_or(DbValue::Null)
    }

    /// Nullable INTEGER.
    pub fn opt_i32(value: Option<i32>) -> Self {
        value.map(DbValue::Int32).unwrap_or(DbValue::Null)
    }

    /// The JSON representation `row_to_json` would produce for this value.
    pub fn to_json(&self) -> JsonValue {
        match self {
            DbValue::Null => JsonValue::Null,
            DbValue::Bool(v) => JsonValue::Bool(*v),
            DbValue::Int64(v) => JsonValue::from(*v),
            DbValue::Int32(v) => JsonValue::from(*v),
            DbValue::Text(v) => JsonValue::String(v.clone()),
        }
    }
}

/// Database operation issued by the sequential execution strategy.
///
/// Every variant returns the affected rows as JSON documents when executed
/// through a [`TxScope`](super::TxScope).
#[derive(Debug, Clone)]
pub enum DbOperation {
    /// INSERT with ON CONFLICT DO UPDATE (upsert)
    Upsert {
        table: String,
        columns: Vec<String>,
        values: Vec<DbValue>,
        /// Columns that form the unique constraint
        conflict_columns: Vec<String>,
        /// Columns to update on conflict
        update_columns: Vec<String>,
    },
    /// Simple INSERT
    Insert {
        table: String,
        columns: Vec<String>,
        values: Vec<DbValue>,
    },
    /// UPDATE with WHERE clause
    Update {
        table: String,
        set_columns: Vec<(String, DbValue)>,
        where_clause: WhereClause,
    },
}

/// WHERE clause for UPDATE and SELECT operations.
#[derive(Debug, Clone)]
pub enum WhereClause {
    /// column = value
    Eq(String, DbValue),
}
