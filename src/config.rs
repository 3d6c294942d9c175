use std::{
    env,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

pub const DEFAULT_STORE_ROOT: &str = "warehouse";
pub const DEFAULT_LEDGER_NAME: &str = "summary_loads.csv";
pub const TABLE_SUMMARY_NAME: &str = "summary_tables.csv";
const STAGING_DIR_NAME: &str = "table-sync-staging";

/// Paths a merge run needs. Passed explicitly to every call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub staging_dir: PathBuf,
    pub store_root: PathBuf,
    /// Ledger file; `<store_root>/summary_loads.csv` when unset.
    pub ledger: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            staging_dir: env::temp_dir().join(STAGING_DIR_NAME),
            store_root: PathBuf::from(DEFAULT_STORE_ROOT),
            ledger: None,
        }
    }
}

impl SyncConfig {
    /// Reads a YAML config file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let config: SyncConfig = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing config file {path:?}"))?;
        Ok(config)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.ledger
            .clone()
            .unwrap_or_else(|| self.store_root.join(DEFAULT_LEDGER_NAME))
    }

    /// The per-table summary lives next to the ledger.
    pub fn table_summary_path(&self) -> PathBuf {
        self.ledger_path().with_file_name(TABLE_SUMMARY_NAME)
    }
}

/// The table a batch is merged into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableTarget {
    pub table_id: u32,
    pub table_name: String,
}

impl TableTarget {
    pub fn new(table_id: u32, table_name: impl Into<String>) -> Self {
        Self {
            table_id,
            table_name: table_name.into(),
        }
    }

    /// Table names double as file names, so only identifiers are allowed.
    pub fn validate(&self) -> SyncResult<()> {
        static NAME: OnceLock<Option<Regex>> = OnceLock::new();
        let pattern = NAME.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").ok());
        if pattern
            .as_ref()
            .is_some_and(|re| re.is_match(&self.table_name))
        {
            Ok(())
        } else {
            Err(SyncError::validation(
                &self.table_name,
                "table name must start with a letter or underscore and contain only letters, digits and underscores",
            ))
        }
    }
}
