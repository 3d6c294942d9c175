//! Append-only CSV ledger of successful loads, plus a per-table summary.
//!
//! Each ledger row carries a load id of the form `YYYYMMDD-N`: the UTC day of
//! the report followed by a per-day sequence number starting at 1. The table
//! summary keeps one row per table id with the table's size after its latest
//! load.

use std::{
    fs::{self, File, OpenOptions},
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
};

use chrono::{DateTime, NaiveDate, Utc};
use encoding_rs::UTF_8;
use log::info;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    data::DATE_FORMAT,
    error::{StoreError, SyncError, SyncResult},
    io_utils,
    report::{LoadLedger, LoadReport},
    store::TableStore,
};

pub const LEDGER_HEADERS: [&str; 7] = [
    "load_id",
    "table_id",
    "table_name",
    "inserted",
    "updated",
    "unchanged",
    "timestamp",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub load_id: String,
    pub table_id: u32,
    pub table_name: String,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub timestamp: DateTime<Utc>,
}

impl LedgerEntry {
    fn from_report(load_id: String, report: &LoadReport) -> Self {
        Self {
            load_id,
            table_id: report.table_id,
            table_name: report.table_name.clone(),
            inserted: report.inserted,
            updated: report.updated,
            unchanged: report.unchanged,
            timestamp: report.timestamp,
        }
    }

    fn to_record(&self) -> Vec<String> {
        vec![
            self.load_id.clone(),
            self.table_id.to_string(),
            self.table_name.clone(),
            self.inserted.to_string(),
            self.updated.to_string(),
            self.unchanged.to_string(),
            self.timestamp.to_rfc3339(),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct CsvLedger {
    path: PathBuf,
}

impl CsvLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every recorded entry in file order. A missing ledger has no entries.
    pub fn entries(&self) -> Result<Vec<LedgerEntry>, StoreError> {
        read_records(&self.path, &LEDGER_HEADERS)
    }

    fn next_load_id(&self, timestamp: &DateTime<Utc>) -> Result<String, StoreError> {
        let day = timestamp.format("%Y%m%d").to_string();
        let prefix = format!("{day}-");
        let last = self
            .entries()?
            .iter()
            .filter_map(|entry| entry.load_id.strip_prefix(&prefix))
            .filter_map(|suffix| suffix.parse::<u32>().ok())
            .max()
            .unwrap_or(0);
        Ok(format!("{day}-{}", last + 1))
    }

    fn append(&self, entry: &LedgerEntry) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let is_new = !self.path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = io_utils::csv_writer(file, b',');
        if is_new {
            writer.write_record(LEDGER_HEADERS)?;
        }
        writer.write_record(entry.to_record())?;
        writer.flush()?;
        Ok(())
    }
}

impl LoadLedger for CsvLedger {
    fn record(&mut self, report: &LoadReport) -> SyncResult<String> {
        let wrap = |source| SyncError::StoreConnectivity {
            table: report.table_name.clone(),
            action: "recording load for",
            source,
        };
        let load_id = self.next_load_id(&report.timestamp).map_err(wrap)?;
        let entry = LedgerEntry::from_report(load_id.clone(), report);
        self.append(&entry).map_err(wrap)?;
        info!(
            "Recorded load {} for table '{}' in {:?}",
            load_id, report.table_name, self.path
        );
        Ok(load_id)
    }
}

pub const TABLE_SUMMARY_HEADERS: [&str; 5] =
    ["table_id", "table_name", "rows", "columns", "last_updated"];

/// Size of one table after its latest load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSummary {
    pub table_id: u32,
    pub table_name: String,
    pub rows: usize,
    pub columns: usize,
    pub last_updated: NaiveDate,
}

impl TableSummary {
    /// Measures the reported table as it stands in `store` after the load.
    pub fn capture<S>(store: &S, report: &LoadReport) -> SyncResult<Self>
    where
        S: TableStore + ?Sized,
    {
        let table = report.table_name.as_str();
        let schema = store
            .table_schema(table)
            .map_err(|err| SyncError::from_read(table, "summarizing", err))?;
        let rows = store
            .scan(table)
            .map_err(|err| SyncError::from_read(table, "summarizing", err))?
            .len();
        Ok(Self {
            table_id: report.table_id,
            table_name: report.table_name.clone(),
            rows,
            columns: schema.columns.len(),
            last_updated: report.timestamp.date_naive(),
        })
    }

    fn to_record(&self) -> Vec<String> {
        vec![
            self.table_id.to_string(),
            self.table_name.clone(),
            self.rows.to_string(),
            self.columns.to_string(),
            self.last_updated.format(DATE_FORMAT).to_string(),
        ]
    }
}

/// CSV file of [`TableSummary`] rows keyed by table id, kept in table id
/// order. Every upsert rewrites the file and renames it into place.
#[derive(Debug, Clone)]
pub struct CsvTableSummary {
    path: PathBuf,
}

impl CsvTableSummary {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file has no entries.
    pub fn entries(&self) -> Result<Vec<TableSummary>, StoreError> {
        read_records(&self.path, &TABLE_SUMMARY_HEADERS)
    }

    /// Inserts `summary`, or replaces the row with the same table id.
    pub fn upsert(&self, summary: TableSummary) -> SyncResult<()> {
        let table = summary.table_name.clone();
        let wrap = |source| SyncError::StoreConnectivity {
            table: table.clone(),
            action: "updating table summary for",
            source,
        };
        let mut entries = self.entries().map_err(wrap)?;
        let replaced = entries.iter().any(|entry| entry.table_id == summary.table_id);
        entries.retain(|entry| entry.table_id != summary.table_id);
        entries.push(summary);
        entries.sort_by_key(|entry| entry.table_id);
        self.rewrite(&entries).map_err(wrap)?;
        info!(
            "{} summary for table '{}' in {:?}",
            if replaced { "Updated" } else { "Inserted" },
            table,
            self.path
        );
        Ok(())
    }

    fn rewrite(&self, entries: &[TableSummary]) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        let mut temp = tempfile::Builder::new()
            .prefix(".summary.")
            .suffix(".swap")
            .tempfile_in(dir)?;
        {
            let mut writer = io_utils::csv_writer(BufWriter::new(temp.as_file_mut()), b',');
            writer.write_record(TABLE_SUMMARY_HEADERS)?;
            for entry in entries {
                writer.write_record(entry.to_record())?;
            }
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(&self.path)
            .map_err(|err| StoreError::Io(err.error))?;
        Ok(())
    }
}

fn read_records<T>(path: &Path, expected: &[&str]) -> Result<Vec<T>, StoreError>
where
    T: DeserializeOwned,
{
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path)?;
    let mut reader = io_utils::open_csv_reader(BufReader::new(file), b',', true);
    let headers = io_utils::reader_headers(&mut reader, UTF_8).map_err(|err| {
        StoreError::Metadata {
            path: path.to_path_buf(),
            message: format!("{err:#}"),
        }
    })?;
    if headers != expected {
        return Err(StoreError::Metadata {
            path: path.to_path_buf(),
            message: format!("unexpected header {headers:?}"),
        });
    }
    let mut entries = Vec::new();
    for record in reader.deserialize() {
        entries.push(record?);
    }
    Ok(entries)
}
