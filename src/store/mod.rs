//! Store handles: the persisted side of a merge.
//!
//! A [`TableStore`] owns named tables with a declared primary key. Reads go
//! straight through the handle; every mutation of an existing table's rows
//! happens inside a [`StoreTransaction`], which becomes visible only on
//! [`StoreTransaction::commit`]. Dropping a transaction without committing
//! discards its work.
//!
//! Two implementations ship with the crate: [`memory::MemoryStore`] for
//! embedding and tests, and [`csv::CsvTableStore`], a directory of CSV tables
//! that commits by atomically swapping in a rewritten data file.

pub mod csv;
pub mod memory;

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    data::{Row, Value},
    error::StoreError,
    schema::TableSchema,
};

pub trait TableStore {
    /// Returns whether `name` has been created.
    fn table_exists(&self, name: &str) -> Result<bool, StoreError>;

    /// Creates an empty table. Fails if it already exists.
    fn create_table(&mut self, name: &str, schema: &TableSchema) -> Result<(), StoreError>;

    /// Removes a table with its rows. Fails if it does not exist.
    fn drop_table(&mut self, name: &str) -> Result<(), StoreError>;

    fn table_schema(&self, name: &str) -> Result<TableSchema, StoreError>;

    /// Reads the full rows whose primary key is in `keys`. Keys with no
    /// persisted row are absent from the result.
    fn read_columns(
        &self,
        name: &str,
        keys: &BTreeSet<Value>,
    ) -> Result<BTreeMap<Value, Row>, StoreError>;

    /// Every row of the table in primary-key order.
    fn scan(&self, name: &str) -> Result<Vec<Row>, StoreError>;

    /// Opens a unit of work over one table.
    fn begin<'a>(&'a mut self, name: &str)
    -> Result<Box<dyn StoreTransaction + 'a>, StoreError>;
}

pub trait StoreTransaction {
    /// Removes rows whose key is in `keys`; returns how many were removed.
    fn delete_where(&mut self, keys: &BTreeSet<Value>) -> Result<usize, StoreError>;

    /// Inserts rows, enforcing the table's shape and primary key.
    fn bulk_load(&mut self, rows: &[Row]) -> Result<usize, StoreError>;

    /// Publishes all work done in this transaction.
    fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Rows keyed by primary key, the working copy both stores operate on.
pub(crate) type KeyedRows = BTreeMap<Value, Row>;

/// Checks a row against a table schema and returns its key.
pub(crate) fn checked_key(
    table: &str,
    schema: &TableSchema,
    row: &Row,
) -> Result<Value, StoreError> {
    let key = row
        .first()
        .and_then(|cell| cell.clone())
        .ok_or_else(|| StoreError::RowMismatch {
            table: table.to_string(),
            key: "NULL".to_string(),
            message: "primary key is NULL".to_string(),
        })?;
    if row.len() != schema.columns.len() {
        return Err(StoreError::RowMismatch {
            table: table.to_string(),
            key: key.to_string(),
            message: format!(
                "{} cell(s) for {} column(s)",
                row.len(),
                schema.columns.len()
            ),
        });
    }
    for (column, cell) in schema.columns.iter().zip(row.iter()) {
        if let Some(value) = cell {
            if !column.storage_type.accepts(value) {
                return Err(StoreError::RowMismatch {
                    table: table.to_string(),
                    key: key.to_string(),
                    message: format!(
                        "value '{value}' cannot be stored in {} column '{}'",
                        column.storage_type, column.name
                    ),
                });
            }
        }
    }
    Ok(key)
}

/// Inserts `rows` into `target`, rejecting keys that are already present.
pub(crate) fn insert_rows(
    table: &str,
    schema: &TableSchema,
    target: &mut KeyedRows,
    rows: &[Row],
) -> Result<usize, StoreError> {
    for row in rows {
        let key = checked_key(table, schema, row)?;
        if target.contains_key(&key) {
            return Err(StoreError::DuplicateKey {
                table: table.to_string(),
                key: key.to_string(),
            });
        }
        target.insert(key, row.clone());
    }
    Ok(rows.len())
}

pub(crate) fn delete_keys(target: &mut KeyedRows, keys: &BTreeSet<Value>) -> usize {
    let before = target.len();
    target.retain(|key, _| !keys.contains(key));
    before - target.len()
}
