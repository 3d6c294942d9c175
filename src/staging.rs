//! Disposable on-disk snapshots of incoming batches.
//!
//! [`StagingWriter::acquire`] serializes a [`Dataset`] with bincode into a
//! uniquely named file under the staging directory and hands back a
//! [`StagingArtifact`] guard. The guard owns the file: dropping it deletes the
//! file, so every exit path of a merge call (success, error, early return,
//! unwinding) releases the artifact. A partially written file is removed
//! before `acquire` reports the failure.

use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    process,
    sync::atomic::{AtomicU64, Ordering},
};

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    dataset::Dataset,
    error::{SyncError, SyncResult},
};

const STAGING_VERSION: u32 = 1;
const STAGING_EXTENSION: &str = "stage";

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Serialize, Deserialize)]
struct StagedSnapshot {
    version: u32,
    table: String,
    dataset: Dataset,
}

#[derive(Debug, Clone)]
pub struct StagingWriter {
    dir: PathBuf,
}

impl StagingWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `dataset` to a fresh artifact for `table`.
    ///
    /// The name combines the table, the process id, a per-process sequence
    /// number and a random token, so concurrent calls never share a file. A
    /// stale file with the same name is truncated.
    pub fn acquire(&self, table: &str, dataset: &Dataset) -> SyncResult<StagingArtifact> {
        fs::create_dir_all(&self.dir)
            .map_err(|err| SyncError::staging(&self.dir, "creating staging directory", err))?;

        let path = self.dir.join(artifact_name(table));
        let file = File::create(&path)
            .map_err(|err| SyncError::staging(&path, "creating staging artifact", err))?;
        // From here on the guard removes the file if the write fails.
        let artifact = StagingArtifact {
            path,
            rows: dataset.len(),
        };

        let snapshot = StagedSnapshot {
            version: STAGING_VERSION,
            table: table.to_string(),
            dataset: dataset.clone(),
        };
        let mut writer = BufWriter::new(file);
        bincode::serde::encode_into_std_write(&snapshot, &mut writer, bincode::config::standard())
            .map_err(|err| SyncError::staging(&artifact.path, "writing staging artifact", err))?;
        writer
            .flush()
            .map_err(|err| SyncError::staging(&artifact.path, "flushing staging artifact", err))?;
        writer
            .get_ref()
            .sync_all()
            .map_err(|err| SyncError::staging(&artifact.path, "syncing staging artifact", err))?;

        debug!(
            "Staged {} row(s) for '{}' at {:?}",
            artifact.rows, table, artifact.path
        );
        Ok(artifact)
    }
}

/// Scoped handle to one staged batch. Deleted on drop.
#[derive(Debug)]
pub struct StagingArtifact {
    path: PathBuf,
    rows: usize,
}

impl StagingArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Reads the staged batch back.
    pub fn load(&self) -> SyncResult<Dataset> {
        let file = File::open(&self.path)
            .map_err(|err| SyncError::staging(&self.path, "opening staging artifact", err))?;
        let mut reader = BufReader::new(file);
        let snapshot: StagedSnapshot =
            bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())
                .map_err(|err| {
                    SyncError::staging(&self.path, "decoding staging artifact", err)
                })?;
        if snapshot.version != STAGING_VERSION {
            return Err(SyncError::Staging {
                path: self.path.clone(),
                message: format!(
                    "unsupported staging version {} (expected {STAGING_VERSION})",
                    snapshot.version
                ),
                source: None,
            });
        }
        Ok(snapshot.dataset)
    }
}

impl Drop for StagingArtifact {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!("Released staging artifact {:?}", self.path),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!("Could not remove staging artifact {:?}: {err}", self.path),
        }
    }
}

fn artifact_name(table: &str) -> String {
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let token = Uuid::new_v4().simple();
    format!(
        "{table}.{pid}-{seq}-{token}.{STAGING_EXTENSION}",
        pid = process::id()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::Value,
        dataset::{Column, DataType},
        error::ErrorKind,
    };
    use tempfile::tempdir;

    fn sample() -> Dataset {
        Dataset::new(
            vec![
                Column::new("id", DataType::Integer),
                Column::new("name", DataType::Text),
                Column::new("score", DataType::Float),
            ],
            vec![
                vec![
                    Some(Value::Integer(1)),
                    Some(Value::Text("A".into())),
                    Some(Value::Float(10.0)),
                ],
                vec![Some(Value::Integer(2)), None, Some(Value::Float(f64::NAN))],
            ],
        )
        .unwrap()
    }

    fn stage_files(dir: &Path) -> Vec<PathBuf> {
        match fs::read_dir(dir) {
            Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        }
    }

    #[test]
    fn artifact_round_trips_and_is_removed_on_drop() {
        let dir = tempdir().unwrap();
        let writer = StagingWriter::new(dir.path().join("TEMP"));
        let dataset = sample();

        let artifact = writer.acquire("orders", &dataset).unwrap();
        assert!(artifact.path().exists());
        assert_eq!(artifact.rows(), 2);
        assert_eq!(artifact.load().unwrap(), dataset);

        let path = artifact.path().to_path_buf();
        drop(artifact);
        assert!(!path.exists());
        assert!(stage_files(writer.dir()).is_empty());
    }

    #[test]
    fn artifacts_for_the_same_table_never_collide() {
        let dir = tempdir().unwrap();
        let writer = StagingWriter::new(dir.path());
        let first = writer.acquire("orders", &sample()).unwrap();
        let second = writer.acquire("orders", &sample()).unwrap();
        assert_ne!(first.path(), second.path());
        let name = first.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("orders."));
        assert!(name.ends_with(".stage"));
    }

    #[test]
    fn unwritable_staging_directory_is_a_staging_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"occupied").unwrap();
        let writer = StagingWriter::new(blocker.join("TEMP"));

        let err = writer.acquire("orders", &sample()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Staging);
        assert_eq!(stage_files(dir.path()), vec![blocker]);
    }

    #[test]
    fn load_rejects_corrupt_artifacts() {
        let dir = tempdir().unwrap();
        let writer = StagingWriter::new(dir.path());
        let artifact = writer.acquire("orders", &sample()).unwrap();
        fs::write(artifact.path(), b"\x07garbage").unwrap();
        assert_eq!(artifact.load().unwrap_err().kind(), ErrorKind::Staging);
    }
}
