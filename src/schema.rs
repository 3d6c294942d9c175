//! Storage schema inference for persisted tables.
//!
//! [`infer_table_schema`] turns a batch's column type tags into the ordered
//! column definitions used to create a table on first load. The mapping is
//! fixed:
//!
//! | batch type  | storage type                                       |
//! |-------------|----------------------------------------------------|
//! | `timestamp` | `DATE` when every value is at midnight, else `TIMESTAMP` |
//! | `integer`   | `INTEGER`                                          |
//! | `float`     | `DOUBLE`                                           |
//! | `boolean`   | `BOOLEAN`                                          |
//! | `text`      | `TEXT`                                             |
//!
//! The first column is always flagged as the primary key.

use std::{collections::HashSet, fmt};

use serde::{Deserialize, Serialize};

use crate::{
    data::{DATE_FORMAT, Value},
    dataset::{DataType, Dataset},
    error::{SyncError, SyncResult},
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum StorageType {
    Date,
    Timestamp,
    Integer,
    Double,
    Boolean,
    Text,
}

impl StorageType {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageType::Date => "DATE",
            StorageType::Timestamp => "TIMESTAMP",
            StorageType::Integer => "INTEGER",
            StorageType::Double => "DOUBLE",
            StorageType::Boolean => "BOOLEAN",
            StorageType::Text => "TEXT",
        }
    }

    /// The batch type whose values this storage type holds.
    pub fn data_type(self) -> DataType {
        match self {
            StorageType::Date | StorageType::Timestamp => DataType::Timestamp,
            StorageType::Integer => DataType::Integer,
            StorageType::Double => DataType::Float,
            StorageType::Boolean => DataType::Boolean,
            StorageType::Text => DataType::Text,
        }
    }

    /// Whether a value can be stored without loss.
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            StorageType::Date => value.is_midnight(),
            other => value.data_type() == other.data_type(),
        }
    }

    /// Text form of a stored value; `DATE` columns drop the time of day.
    pub fn render(self, value: &Value) -> String {
        match (self, value) {
            (StorageType::Date, Value::Timestamp(ts)) => ts.format(DATE_FORMAT).to_string(),
            _ => value.as_display(),
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub storage_type: StorageType,
    #[serde(default)]
    pub primary_key: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableSchema {
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    pub fn primary_key(&self) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.primary_key)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Describes the first mismatch between this schema and a batch, if any.
    ///
    /// Columns are matched by position and name; `DATE` and `TIMESTAMP` both
    /// accept timestamp batches.
    pub fn mismatch_with(&self, dataset: &Dataset) -> Option<String> {
        let incoming = dataset.columns();
        if incoming.len() != self.columns.len() {
            return Some(format!(
                "batch has {} column(s) but the table has {}",
                incoming.len(),
                self.columns.len()
            ));
        }
        self.columns
            .iter()
            .zip(incoming.iter())
            .enumerate()
            .find_map(|(idx, (stored, column))| {
                if stored.name != column.name {
                    Some(format!(
                        "column {} is '{}' in the batch but '{}' in the table",
                        idx + 1,
                        column.name,
                        stored.name
                    ))
                } else if stored.storage_type.data_type() != column.data_type {
                    Some(format!(
                        "column '{}' is {} in the batch but stored as {}",
                        column.name, column.data_type, stored.storage_type
                    ))
                } else {
                    None
                }
            })
    }
}

/// Derives the storage schema used to bootstrap `table` from `dataset`.
pub fn infer_table_schema(table: &str, dataset: &Dataset) -> SyncResult<TableSchema> {
    let columns = dataset.columns();
    if columns.is_empty() {
        return Err(SyncError::schema(table, "batch declares no columns"));
    }

    let mut seen = HashSet::with_capacity(columns.len());
    let mut defs = Vec::with_capacity(columns.len());
    for (idx, column) in columns.iter().enumerate() {
        let name = column.name.trim();
        if name.is_empty() {
            return Err(SyncError::schema(
                table,
                format!("column {} has a blank name", idx + 1),
            ));
        }
        if !seen.insert(name.to_ascii_lowercase()) {
            return Err(SyncError::schema(
                table,
                format!("column '{name}' is declared more than once"),
            ));
        }
        let is_key = idx == 0;
        if is_key && column.data_type == DataType::Float {
            return Err(SyncError::schema(
                table,
                format!("primary key column '{name}' cannot be a float"),
            ));
        }
        defs.push(ColumnDef {
            name: column.name.clone(),
            storage_type: storage_type_for(dataset, idx, column.data_type),
            primary_key: is_key,
        });
    }
    Ok(TableSchema { columns: defs })
}

fn storage_type_for(dataset: &Dataset, idx: usize, data_type: DataType) -> StorageType {
    match data_type {
        DataType::Timestamp => {
            let date_only = dataset
                .rows()
                .iter()
                .filter_map(|row| row.get(idx).and_then(|cell| cell.as_ref()))
                .all(Value::is_midnight);
            if date_only {
                StorageType::Date
            } else {
                StorageType::Timestamp
            }
        }
        DataType::Integer => StorageType::Integer,
        DataType::Float => StorageType::Double,
        DataType::Boolean => StorageType::Boolean,
        DataType::Text => StorageType::Text,
    }
}
