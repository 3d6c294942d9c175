//! The merge entry point.
//!
//! One call moves through
//! `Start -> CheckExistence -> {Bootstrap | Diff} -> Apply -> Report -> End`,
//! dropping to `Failed` from any state. The staging artifact is held by a
//! guard for the whole call, so it is gone by the time `merge` returns no
//! matter which state the call ended in.
//!
//! Nothing here serializes concurrent callers. `merge` borrows the store
//! mutably, which rules out two merges through the same handle; merges from
//! separate handles or processes against the same table need an external lock
//! keyed by table name.

use std::{collections::BTreeSet, fmt};

use log::{debug, info, warn};

use crate::{
    apply,
    config::{SyncConfig, TableTarget},
    data::Value,
    dataset::Dataset,
    diff::{self, KeyPartition},
    error::{SyncError, SyncResult},
    report::LoadReport,
    schema,
    staging::StagingWriter,
    store::TableStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeState {
    Start,
    CheckExistence,
    Bootstrap,
    Diff,
    Apply,
    Report,
    End,
    Failed,
}

impl MergeState {
    pub fn as_str(self) -> &'static str {
        match self {
            MergeState::Start => "START",
            MergeState::CheckExistence => "CHECK_EXISTENCE",
            MergeState::Bootstrap => "BOOTSTRAP",
            MergeState::Diff => "DIFF",
            MergeState::Apply => "APPLY",
            MergeState::Report => "REPORT",
            MergeState::End => "END",
            MergeState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for MergeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a merge call decided to do with the table.
enum Plan {
    Bootstrap(schema::TableSchema),
    Delta,
}

struct Progress<'a> {
    table: &'a str,
    state: MergeState,
}

impl Progress<'_> {
    fn enter(&mut self, next: MergeState) {
        debug!("Merge '{}': {} -> {}", self.table, self.state, next);
        self.state = next;
    }
}

/// Merges `dataset` into the table named by `target`.
///
/// Returns a report only when every step succeeded; otherwise exactly one
/// error, classified by [`SyncError::kind`], and the persisted table is left
/// as it was before the call.
pub fn merge<S>(
    store: &mut S,
    config: &SyncConfig,
    target: &TableTarget,
    dataset: &Dataset,
) -> SyncResult<LoadReport>
where
    S: TableStore + ?Sized,
{
    let mut progress = Progress {
        table: &target.table_name,
        state: MergeState::Start,
    };
    let result = run_merge(store, config, target, dataset, &mut progress);
    match &result {
        Ok(report) => {
            progress.enter(MergeState::End);
            info!(
                "Merged {} row(s) into '{}' (id {}): {} inserted, {} updated, {} unchanged",
                report.total(),
                report.table_name,
                report.table_id,
                report.inserted,
                report.updated,
                report.unchanged
            );
        }
        Err(err) => {
            let failed_in = progress.state;
            progress.enter(MergeState::Failed);
            warn!(
                "Merge into '{}' failed during {} ({}): {}",
                target.table_name,
                failed_in,
                err.kind(),
                err
            );
        }
    }
    result
}

fn run_merge<S>(
    store: &mut S,
    config: &SyncConfig,
    target: &TableTarget,
    dataset: &Dataset,
    progress: &mut Progress<'_>,
) -> SyncResult<LoadReport>
where
    S: TableStore + ?Sized,
{
    let table = target.table_name.as_str();
    let staged_keys = validate(target, dataset)?;

    let artifact = StagingWriter::new(&config.staging_dir).acquire(table, dataset)?;
    let staged = artifact.load()?;

    progress.enter(MergeState::CheckExistence);
    let exists = store
        .table_exists(table)
        .map_err(|err| SyncError::from_read(table, "checking existence of", err))?;

    let (plan, partition) = if exists {
        progress.enter(MergeState::Diff);
        let persisted = store
            .table_schema(table)
            .map_err(|err| SyncError::from_read(table, "reading schema of", err))?;
        if let Some(problem) = persisted.mismatch_with(&staged) {
            return Err(SyncError::schema(table, problem));
        }
        let partition = diff::diff_checked(&*store, table, &staged, &staged_keys)?;
        (Plan::Delta, partition)
    } else {
        progress.enter(MergeState::Bootstrap);
        let table_schema = schema::infer_table_schema(table, &staged)?;
        (
            Plan::Bootstrap(table_schema),
            KeyPartition::all_inserts(staged_keys),
        )
    };
    debug_assert_eq!(partition.total(), staged.len());

    progress.enter(MergeState::Apply);
    match plan {
        Plan::Bootstrap(table_schema) => {
            apply::bootstrap(store, table, &table_schema, &staged)?;
        }
        Plan::Delta => apply::apply_delta(store, table, &partition, &staged)?,
    }

    progress.enter(MergeState::Report);
    Ok(LoadReport::from_partition(target.table_id, table, &partition))
}

/// Checks that need no I/O. Runs before anything is staged and returns the
/// distinct staged keys.
fn validate(target: &TableTarget, dataset: &Dataset) -> SyncResult<BTreeSet<Value>> {
    target.validate()?;
    let table = target.table_name.as_str();
    if dataset.primary_key().is_none() {
        return Err(SyncError::validation(
            table,
            "batch has no columns, so there is no primary key column",
        ));
    }
    if dataset.is_empty() {
        return Err(SyncError::validation(table, "batch has no rows"));
    }
    diff::check_staged_keys(table, dataset)
}

/// Computes the partition a merge would apply without touching the table.
pub fn preview<S>(store: &S, target: &TableTarget, dataset: &Dataset) -> SyncResult<KeyPartition>
where
    S: TableStore + ?Sized,
{
    let staged_keys = validate(target, dataset)?;
    let table = target.table_name.as_str();
    let exists = store
        .table_exists(table)
        .map_err(|err| SyncError::from_read(table, "checking existence of", err))?;
    if !exists {
        return Ok(KeyPartition::all_inserts(staged_keys));
    }
    let persisted = store
        .table_schema(table)
        .map_err(|err| SyncError::from_read(table, "reading schema of", err))?;
    if let Some(problem) = persisted.mismatch_with(dataset) {
        return Err(SyncError::schema(table, problem));
    }
    diff::diff_checked(store, table, dataset, &staged_keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::{Row, Value},
        dataset::{Column, DataType},
        error::ErrorKind,
        store::memory::MemoryStore,
    };
    use tempfile::tempdir;

    fn config(dir: &std::path::Path) -> SyncConfig {
        SyncConfig {
            staging_dir: dir.join("TEMP"),
            store_root: dir.join("wh"),
            ledger: None,
        }
    }

    fn batch(rows: &[(i64, i64)]) -> Dataset {
        let rows: Vec<Row> = rows
            .iter()
            .map(|(k, v)| vec![Some(Value::Integer(*k)), Some(Value::Integer(*v))])
            .collect();
        Dataset::new(
            vec![
                Column::new("id", DataType::Integer),
                Column::new("qty", DataType::Integer),
            ],
            rows,
        )
        .unwrap()
    }

    #[test]
    fn first_merge_bootstraps_then_diffs() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let target = TableTarget::new(4, "stock");
        let mut store = MemoryStore::new();

        let report = merge(&mut store, &config, &target, &batch(&[(1, 1), (2, 2)])).unwrap();
        assert_eq!(report.counts(), (2, 0, 0));

        let report = merge(&mut store, &config, &target, &batch(&[(1, 1), (2, 3)])).unwrap();
        assert_eq!(report.counts(), (0, 1, 1));
        assert_eq!(report.table_id, 4);
        assert_eq!(std::fs::read_dir(&config.staging_dir).unwrap().count(), 0);
    }

    #[test]
    fn empty_batches_and_bad_names_fail_before_staging() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let mut store = MemoryStore::new();

        let err = merge(&mut store, &config, &TableTarget::new(1, "stock"), &batch(&[]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = merge(
            &mut store,
            &config,
            &TableTarget::new(1, "bad-name"),
            &batch(&[(1, 1)]),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(!config.staging_dir.exists());
    }

    #[test]
    fn changed_column_layout_is_a_schema_error() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let target = TableTarget::new(1, "stock");
        let mut store = MemoryStore::new();
        merge(&mut store, &config, &target, &batch(&[(1, 1)])).unwrap();

        let renamed = Dataset::new(
            vec![
                Column::new("id", DataType::Integer),
                Column::new("amount", DataType::Integer),
            ],
            vec![vec![Some(Value::Integer(1)), Some(Value::Integer(9))]],
        )
        .unwrap();
        let err = merge(&mut store, &config, &target, &renamed).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
        assert_eq!(store.scan("stock").unwrap(), batch(&[(1, 1)]).rows().to_vec());
    }

    #[test]
    fn preview_matches_the_merge_outcome_without_writing() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let target = TableTarget::new(1, "stock");
        let mut store = MemoryStore::new();
        merge(&mut store, &config, &target, &batch(&[(1, 1), (2, 2)])).unwrap();

        let next = batch(&[(2, 5), (3, 3)]);
        let partition = preview(&store, &target, &next).unwrap();
        assert_eq!((partition.inserted(), partition.updated(), partition.unchanged()), (1, 1, 0));
        assert_eq!(store.row_count("stock"), Some(2));
    }

    #[test]
    fn state_names_match_the_documented_machine() {
        assert_eq!(MergeState::CheckExistence.to_string(), "CHECK_EXISTENCE");
        assert_eq!(MergeState::Failed.to_string(), "FAILED");
    }
}
