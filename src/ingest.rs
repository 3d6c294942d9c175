//! Reading a delimited file into a typed [`Dataset`].
//!
//! Column types are inferred from a sample of rows; every row is then parsed
//! with the inferred types. Empty fields are NULL.

use std::path::Path;

use anyhow::{Context, Result, ensure};
use log::debug;

use crate::{
    data::{parse_boolean, parse_naive_datetime, parse_typed_value},
    dataset::{Column, DataType, Dataset},
    io_utils,
};

#[derive(Debug, Clone)]
struct TypeCandidate {
    seen: bool,
    possible_integer: bool,
    possible_float: bool,
    possible_boolean: bool,
    possible_timestamp: bool,
}

impl TypeCandidate {
    fn new() -> Self {
        Self {
            seen: false,
            possible_integer: true,
            possible_float: true,
            possible_boolean: true,
            possible_timestamp: true,
        }
    }

    fn observe(&mut self, value: &str) {
        self.seen = true;
        if self.possible_boolean
            && (value == "1" || value == "0" || parse_boolean(value).is_err())
        {
            self.possible_boolean = false;
        }
        if self.possible_integer && value.parse::<i64>().is_err() {
            self.possible_integer = false;
        }
        if self.possible_float && value.parse::<f64>().is_err() {
            self.possible_float = false;
        }
        if self.possible_timestamp && parse_naive_datetime(value).is_err() {
            self.possible_timestamp = false;
        }
    }

    fn decide(&self) -> DataType {
        if !self.seen {
            DataType::Text
        } else if self.possible_boolean {
            DataType::Boolean
        } else if self.possible_integer {
            DataType::Integer
        } else if self.possible_float {
            DataType::Float
        } else if self.possible_timestamp {
            DataType::Timestamp
        } else {
            DataType::Text
        }
    }
}

/// Infers column types from the first `sample_rows` records (0 scans all).
pub fn infer_types(records: &[Vec<String>], width: usize, sample_rows: usize) -> Vec<DataType> {
    let mut candidates = vec![TypeCandidate::new(); width];
    let limit = if sample_rows == 0 {
        records.len()
    } else {
        sample_rows.min(records.len())
    };
    for record in &records[..limit] {
        for (candidate, field) in candidates.iter_mut().zip(record.iter()) {
            if !field.is_empty() {
                candidate.observe(field);
            }
        }
    }
    candidates.iter().map(TypeCandidate::decide).collect()
}

pub fn read_dataset(
    path: &Path,
    delimiter: Option<u8>,
    encoding: Option<&str>,
    sample_rows: usize,
) -> Result<Dataset> {
    let delimiter = io_utils::resolve_input_delimiter(path, delimiter);
    let encoding = io_utils::resolve_encoding(encoding)?;
    let mut reader = io_utils::open_csv_reader_from_path(path, delimiter, true)?;
    let headers = io_utils::reader_headers(&mut reader, encoding)
        .with_context(|| format!("Reading headers from {path:?}"))?;
    ensure!(!headers.is_empty(), "Input file {path:?} has no header row");

    let mut records = Vec::new();
    let mut record = csv::ByteRecord::new();
    while reader
        .read_byte_record(&mut record)
        .with_context(|| format!("Reading {path:?}"))?
    {
        let line = records.len() + 2;
        let decoded = io_utils::decode_record(&record, encoding)
            .with_context(|| format!("Decoding line {line} of {path:?}"))?;
        records.push(decoded);
    }

    let types = infer_types(&records, headers.len(), sample_rows);
    debug!(
        "Inferred types for {:?}: {}",
        path,
        headers
            .iter()
            .zip(types.iter())
            .map(|(name, ty)| format!("{name}:{ty}"))
            .collect::<Vec<_>>()
            .join(", ")
    );

    let columns: Vec<Column> = headers
        .iter()
        .zip(types.iter())
        .map(|(name, ty)| Column::new(name.as_str(), *ty))
        .collect();
    let rows = records
        .iter()
        .enumerate()
        .map(|(idx, fields)| {
            columns
                .iter()
                .zip(fields.iter())
                .map(|(column, field)| {
                    parse_typed_value(field, column.data_type).with_context(|| {
                        format!("Line {} column '{}'", idx + 2, column.name)
                    })
                })
                .collect::<Result<Vec<_>>>()
        })
        .collect::<Result<Vec<_>>>()?;

    Dataset::new(columns, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Value;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn infers_types_and_reads_nulls() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("orders.csv");
        fs::write(
            &path,
            "id,name,price,active,ordered_at,note\n\
             1,Widget,2.50,yes,2024-01-01,\n\
             2,,3,no,2024-01-02 10:15:00,hi\n",
        )
        .unwrap();

        let dataset = read_dataset(&path, None, None, 0).unwrap();
        let types: Vec<_> = dataset.columns().iter().map(|c| c.data_type).collect();
        assert_eq!(
            types,
            vec![
                DataType::Integer,
                DataType::Text,
                DataType::Float,
                DataType::Boolean,
                DataType::Timestamp,
                DataType::Text,
            ]
        );
        assert_eq!(dataset.rows()[1][1], None);
        assert_eq!(dataset.rows()[1][2], Some(Value::Float(3.0)));
        assert_eq!(dataset.rows()[0][5], None);
    }

    #[test]
    fn tsv_files_use_tabs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("codes.tsv");
        fs::write(&path, "code\tlabel\nA\tx,y\n").unwrap();
        let dataset = read_dataset(&path, None, None, 10).unwrap();
        assert_eq!(dataset.column_names(), vec!["code", "label"]);
        assert_eq!(dataset.rows()[0][1], Some(Value::Text("x,y".into())));
    }

    #[test]
    fn values_outside_the_sample_must_still_parse() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("late.csv");
        fs::write(&path, "id,qty\n1,5\n2,lots\n").unwrap();
        let err = read_dataset(&path, None, None, 1).unwrap_err();
        assert!(format!("{err:#}").contains("Line 3 column 'qty'"));
    }
}
