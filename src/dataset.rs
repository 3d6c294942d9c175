//! In-memory batches handed to the engine by upstream stages.
//!
//! A [`Dataset`] is an ordered set of named, typed columns plus its rows. The
//! first column is the primary key. Construction checks shape and cell types;
//! key uniqueness and non-nullness are checked by the merge call itself so the
//! failure carries the target table.

use std::{fmt, str::FromStr};

use anyhow::{Result, anyhow, ensure};
use serde::{Deserialize, Serialize};

use crate::data::{Row, Value};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DataType {
    Integer,
    Float,
    Boolean,
    Timestamp,
    Text,
}

impl DataType {
    pub fn as_str(self) -> &'static str {
        match self {
            DataType::Integer => "integer",
            DataType::Float => "float",
            DataType::Boolean => "boolean",
            DataType::Timestamp => "timestamp",
            DataType::Text => "text",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "integer" | "int" => Ok(DataType::Integer),
            "float" | "double" => Ok(DataType::Float),
            "boolean" | "bool" => Ok(DataType::Boolean),
            "timestamp" | "datetime" | "date" => Ok(DataType::Timestamp),
            "text" | "string" => Ok(DataType::Text),
            other => Err(anyhow!("Unknown data type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dataset {
    columns: Vec<Column>,
    rows: Vec<Row>,
}

impl Dataset {
    /// Builds a dataset, rejecting rows whose width or cell types disagree
    /// with the column list.
    pub fn new(columns: Vec<Column>, rows: Vec<Row>) -> Result<Self> {
        for (row_idx, row) in rows.iter().enumerate() {
            ensure!(
                row.len() == columns.len(),
                "Row {} has {} cell(s) but {} column(s) are declared",
                row_idx + 1,
                row.len(),
                columns.len()
            );
            for (column, cell) in columns.iter().zip(row.iter()) {
                if let Some(value) = cell {
                    ensure!(
                        value.data_type() == column.data_type,
                        "Row {} column '{}' holds a {} value but is declared {}",
                        row_idx + 1,
                        column.name,
                        value.data_type(),
                        column.data_type
                    );
                }
            }
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn primary_key(&self) -> Option<&Column> {
        self.columns.first()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Primary-key cells in row order; `None` marks a NULL key.
    pub fn keys(&self) -> impl Iterator<Item = Option<&Value>> + '_ {
        self.rows.iter().map(|row| row.first().and_then(|cell| cell.as_ref()))
    }
}
