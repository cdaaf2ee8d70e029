use std::collections::BTreeMap;

use serde_json::{Map, Value as JsonValue};

use crate::db::error::DbError;
use crate::db::types::{DbValue, WhereClause};

type Row = Map<String, JsonValue>;

/// One table: rows keyed by the JSON rendering of their primary key.
#[derive(Debug, Clone)]
pub(crate) struct Table {
    name: String,
    columns: Vec<String>,
    primary_key: String,
    unique: Vec<String>,
    rows: BTreeMap<String, Row>,
}

impl Table {
    pub(crate) fn new(name: &str, columns: &[&str], primary_key: &str, unique: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            primary_key: primary_key.to_string(),
            unique: unique.iter().map(|c| c.to_string()).collect(),
            rows: BTreeMap::new(),
        }
    }

    fn check_column(&self, column: &str) -> Result<(), DbError> {
        if self.columns.iter().any(|c| c == column) {
            Ok(())
        } else {
            Err(DbError::Unsupported(format!(
                "column {} does not exist on {}",
                column, self.name
            )))
        }
    }

    /// Build a full row from a column/value list, filling absent columns with NULL.
    pub(crate) fn row_from(&self, columns: &[String], values: &[DbValue]) -> Result<Row, DbError> {
        if columns.len() != values.len() {
            return Err(DbError::Unsupported(format!(
                "{} columns but {} values for {}",
                columns.len(),
                values.len(),
                self.name
            )));
        }

        let mut row = self.empty_row();
        for (column, value) in columns.iter().zip(values) {
            self.check_column(column)?;
            row.insert(column.clone(), value.to_json());
        }
        Ok(row)
    }

    /// Validate a JSON object against the column list.
    pub(crate) fn normalize(&self, value: JsonValue) -> Result<Row, DbError> {
        let JsonValue::Object(object) = value else {
            return Err(DbError::Unsupported(format!(
                "row for {} must be a JSON object",
                self.name
            )));
        };

        let mut row = self.empty_row();
        for (column, value) in object {
            self.check_column(&column)?;
            row.insert(column, value);
        }
        Ok(row)
    }

    fn empty_row(&self) -> Row {
        self.columns
            .iter()
            .map(|c| (c.clone(), JsonValue::Null))
            .collect()
    }

    fn key_of(&self, row: &Row) -> Result<String, DbError> {
        match row.get(&self.primary_key) {
            Some(JsonValue::Null) | None => Err(self.violation(format!(
                "null value in column \"{}\"",
                self.primary_key
            ))),
            Some(value) => Ok(value.to_string()),
        }
    }

    fn violation(&self, message: String) -> DbError {
        DbError::ConstraintViolation {
            table: self.name.clone(),
            message,
        }
    }

    fn check_unique(&self, row: &Row, own_key: &str) -> Result<(), DbError> {
        for column in &self.unique {
            let value = row.get(column).unwrap_or(&JsonValue::Null);
            if value.is_null() {
                continue;
            }
            let clash = self
                .rows
                .iter()
                .any(|(key, other)| key != own_key && other.get(column) == Some(value));
            if clash {
                return Err(self.violation(format!(
                    "duplicate key value violates unique constraint on \"{}\" = {}",
                    column, value
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn insert(&mut self, row: Row) -> Result<JsonValue, DbError> {
        let key = self.key_of(&row)?;
        if self.rows.contains_key(&key) {
            return Err(self.violation(format!(
                "duplicate key value violates primary key \"{}\" = {}",
                self.primary_key, key
            )));
        }
        self.check_unique(&row, &key)?;

        self.rows.insert(key, row.clone());
        Ok(JsonValue::Object(row))
    }

    /// INSERT ... ON CONFLICT semantics. `DO NOTHING` on conflict returns no row.
    pub(crate) fn upsert(
        &mut self,
        row: Row,
        conflict_columns: &[String],
        update_columns: &[String],
    ) -> Result<Option<JsonValue>, DbError> {
        let existing = self
            .rows
            .iter()
            .find(|(_, other)| {
                conflict_columns
                    .iter()
                    .all(|c| other.get(c) == row.get(c))
            })
            .map(|(key, _)| key.clone());

        let Some(key) = existing else {
            return self.insert(row).map(Some);
        };
        if update_columns.is_empty() {
            return Ok(None);
        }

        let mut updated = self.rows[&key].clone();
        for column in update_columns {
            self.check_column(column)?;
            let value = row.get(column).cloned().unwrap_or(JsonValue::Null);
            updated.insert(column.clone(), value);
        }
        self.check_unique(&updated, &key)?;
        self.rows.insert(key, updated.clone());
        Ok(Some(JsonValue::Object(updated)))
    }

    pub(crate) fn update(
        &mut self,
        set_columns: &[(String, DbValue)],
        where_clause: &WhereClause,
    ) -> Result<Vec<JsonValue>, DbError> {
        for (column, _) in set_columns {
            self.check_column(column)?;
            if *column == self.primary_key {
                return Err(DbError::Unsupported(format!(
                    "updating primary key {} of {}",
                    column, self.name
                )));
            }
        }

        let keys: Vec<String> = self
            .rows
            .iter()
            .filter(|(_, row)| matches(row, where_clause))
            .map(|(key, _)| key.clone())
            .collect();

        let mut affected = Vec::with_capacity(keys.len());
        for key in keys {
            let mut updated = self.rows[&key].clone();
            for (column, value) in set_columns {
                updated.insert(column.clone(), value.to_json());
            }
            self.check_unique(&updated, &key)?;
            self.rows.insert(key, updated.clone());
            affected.push(JsonValue::Object(updated));
        }
        Ok(affected)
    }

    pub(crate) fn select(&self, where_clause: &WhereClause) -> Vec<JsonValue> {
        self.rows
            .values()
            .filter(|row| matches(row, where_clause))
            .cloned()
            .map(JsonValue::Object)
            .collect()
    }

    pub(crate) fn rows(&self) -> Vec<JsonValue> {
        self.rows.values().cloned().map(JsonValue::Object).collect()
    }
}

fn matches(row: &Row, where_clause: &WhereClause) -> bool {
    let WhereClause::Eq(column, value) = where_clause;
    row.get(column).unwrap_or(&JsonValue::Null) == &value.to_json()
}
