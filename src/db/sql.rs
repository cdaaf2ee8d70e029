//! SQL generation for [`DbOperation`]s.
//!
//! Write statements are wrapped in a data-modifying CTE so the affected rows
//! come back as `row_to_json` documents, the same shape the in-memory store
//! and the server-side procedures produce.

use bytes::BytesMut;
use tokio_postgres::types::{IsNull, ToSql, Type};

use super::types::{DbOperation, DbValue, WhereClause};

#[derive(Debug)]
pub(crate) enum SqlParam {
    Null,
    Bool(bool),
    Int64(i64),
    Int32(i32),
    Text(String),
}

impl ToSql for SqlParam {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            SqlParam::Null => Ok(IsNull::Yes),
            SqlParam::Bool(v) => v.to_sql(ty, out),
            SqlParam::Int64(v) => v.to_sql(ty, out),
            SqlParam::Int32(v) => v.to_sql(ty, out),
            SqlParam::Text(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(ty: &Type) -> bool {
        <bool as ToSql>::accepts(ty)
            || <i64 as ToSql>::accepts(ty)
            || <i32 as ToSql>::accepts(ty)
            || <String as ToSql>::accepts(ty)
    }

    tokio_postgres::types::to_sql_checked!();
}

fn convert_db_value(value: &DbValue) -> SqlParam {
    match value {
        DbValue::Null => SqlParam::Null,
        DbValue::Bool(v) => SqlParam::Bool(*v),
        DbValue::Int64(v) => SqlParam::Int64(*v),
        DbValue::Int32(v) => SqlParam::Int32(*v),
        DbValue::Text(v) => SqlParam::Text(v.clone()),
    }
}

fn convert_values_to_params(values: &[DbValue]) -> Vec<SqlParam> {
    values.iter().map(convert_db_value).collect()
}

fn placeholder(param_idx: usize) -> String {
    format!("${}", param_idx)
}

/// Wrap a column name in double quotes to handle reserved keywords.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name)
}

fn quote_cols(columns: &[String]) -> String {
    columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ")
}

/// Build the statement for `operation`. The statement yields one JSON
/// document per affected row.
pub(crate) fn build_operation_sql(operation: &DbOperation) -> (String, Vec<SqlParam>) {
    let (sql, params) = match operation {
        DbOperation::Upsert {
            table,
            columns,
            values,
            conflict_columns,
            update_columns,
        } => build_upsert_sql(table, columns, values, conflict_columns, update_columns),
        DbOperation::Insert {
            table,
            columns,
            values,
        } => build_insert_sql(table, columns, values),
        DbOperation::Update {
            table,
            set_columns,
            where_clause,
        } => build_update_sql(table, set_columns, where_clause),
    };

    (returning_json(&sql), params)
}

fn returning_json(sql: &str) -> String {
    format!(
        "WITH affected AS ({} RETURNING *) SELECT row_to_json(affected)::jsonb FROM affected",
        sql
    )
}

pub(crate) fn build_select_sql(table: &str, where_clause: &WhereClause) -> (String, Vec<SqlParam>) {
    let mut params = Vec::new();
    let mut param_idx = 1;
    let where_str = build_where_sql(where_clause, &mut params, &mut param_idx);

    let sql = format!(
        "SELECT row_to_json(t)::jsonb FROM {} t WHERE {}",
        table, where_str
    );
    (sql, params)
}

fn build_insert_sql(table: &str, columns: &[String], values: &[DbValue]) -> (String, Vec<SqlParam>) {
    let cols = quote_cols(columns);
    let placeholders: Vec<String> = values
        .iter()
        .enumerate()
        .map(|(i, v)| placeholder(i + 1))
        .collect();

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        cols,
        placeholders.join(", ")
    );
    (sql, convert_values_to_params(values))
}

fn build_upsert_sql(
    table: &str,
    columns: &[String],
    values: &[DbValue],
    conflict_columns: &[String],
    update_columns: &[String],
) -> (String, Vec<SqlParam>) {
    let (insert, params) = build_insert_sql(table, columns, values);
    let conflict_cols = quote_cols(conflict_columns);

    let sql = if update_columns.is_empty() {
        format!("{} ON CONFLICT ({}) DO NOTHING", insert, conflict_cols)
    } else {
        let updates: Vec<String> = update_columns
            .iter()
            .map(|c| format!("{} = EXCLUDED.{}", quote_ident(c), quote_ident(c)))
            .collect();
        format!(
            "{} ON CONFLICT ({}) DO UPDATE SET {}",
            insert,
            conflict_cols,
            updates.join(", ")
        )
    };

    (sql, params)
}

fn build_update_sql(
    table: &str,
    set_columns: &[(String, DbValue)],
    where_clause: &WhereClause,
) -> (String, Vec<SqlParam>) {
    let mut params = Vec::new();
    let mut param_idx = 1;

    let sets: Vec<String> = set_columns
        .iter()
        .map(|(col, val)| {
            let ph = placeholder(param_idx);
            params.push(convert_db_value(val));
            param_idx += 1;
            format!("{} = {}", quote_ident(col), ph)
        })
        .collect();

    let where_str = build_where_sql(where_clause, &mut params, &mut param_idx);

    let sql = format!("UPDATE {} SET {} WHERE {}", table, sets.join(", "), where_str);
    (sql, params)
}

fn build_where_sql(
    where_clause: &WhereClause,
    params: &mut Vec<SqlParam>,
    param_idx: &mut usize,
) -> String {
    let WhereClause::Eq(col, val) = where_clause;
    if val.is_null() {
        return format!("{} IS NULL", quote_ident(col));
    }
    let ph = placeholder(*param_idx);
    params.push(convert_db_value(val));
    *param_idx += 1;
    format!("{} = {}", quote_ident(col), ph)
}
