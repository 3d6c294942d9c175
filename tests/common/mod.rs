#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use table_sync::{
    config::SyncConfig,
    data::{Row, Value},
    dataset::{Column, DataType, Dataset},
};
use tempfile::{TempDir, tempdir};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.path().join("TEMP")
    }

    pub fn store_root(&self) -> PathBuf {
        self.path().join("warehouse")
    }

    pub fn config(&self) -> SyncConfig {
        SyncConfig {
            staging_dir: self.staging_dir(),
            store_root: self.store_root(),
            ledger: None,
        }
    }

    /// Files left in the staging directory.
    pub fn staged_files(&self) -> Vec<PathBuf> {
        match std::fs::read_dir(self.staging_dir()) {
            Ok(entries) => entries.map(|e| e.expect("dir entry").path()).collect(),
            Err(_) => Vec::new(),
        }
    }
}

/// `(id, name, score)` rows used across the merge scenarios.
pub fn scores(rows: &[(i64, Option<&str>, Option<f64>)]) -> Dataset {
    Dataset::new(
        vec![
            Column::new("id", DataType::Integer),
            Column::new("name", DataType::Text),
            Column::new("score", DataType::Float),
        ],
        rows.iter().map(|(id, name, score)| score_row(*id, *name, *score)).collect(),
    )
    .expect("valid dataset")
}

pub fn score_row(id: i64, name: Option<&str>, score: Option<f64>) -> Row {
    vec![
        Some(Value::Integer(id)),
        name.map(|n| Value::Text(n.to_string())),
        score.map(Value::Float),
    ]
}
