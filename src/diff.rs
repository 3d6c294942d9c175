//! Partitioning a staged batch against the persisted table.
//!
//! Every staged key lands in exactly one of three sets: keys with no persisted
//! row are inserts, keys whose persisted row differs in any non-key column are
//! updates, and the rest are unchanged. Cell comparison is null-aware, so a
//! NULL on both sides is equal and a NULL against a value is a change.

use std::collections::BTreeSet;

use itertools::Itertools;
use log::debug;

use crate::{
    data::{Value, rows_differ},
    dataset::Dataset,
    error::{SyncError, SyncResult},
    store::TableStore,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyPartition {
    pub insert_keys: BTreeSet<Value>,
    pub update_keys: BTreeSet<Value>,
    pub unchanged_keys: BTreeSet<Value>,
}

impl KeyPartition {
    /// The partition for a table that does not exist yet: every key is an
    /// insert.
    pub fn all_inserts(insert_keys: BTreeSet<Value>) -> Self {
        Self {
            insert_keys,
            ..Self::default()
        }
    }

    pub fn inserted(&self) -> usize {
        self.insert_keys.len()
    }

    pub fn updated(&self) -> usize {
        self.update_keys.len()
    }

    pub fn unchanged(&self) -> usize {
        self.unchanged_keys.len()
    }

    pub fn total(&self) -> usize {
        self.inserted() + self.updated() + self.unchanged()
    }

    /// True when applying the partition would not touch the table.
    pub fn is_noop(&self) -> bool {
        self.insert_keys.is_empty() && self.update_keys.is_empty()
    }
}

/// Rejects batches whose primary key is NULL or repeated.
///
/// Returns the distinct staged keys on success.
pub fn check_staged_keys(table: &str, dataset: &Dataset) -> SyncResult<BTreeSet<Value>> {
    let key_name = dataset
        .primary_key()
        .map(|column| column.name.as_str())
        .unwrap_or("<none>");

    let mut keys = Vec::with_capacity(dataset.len());
    for (idx, key) in dataset.keys().enumerate() {
        match key {
            Some(value) => keys.push(value),
            None => {
                return Err(SyncError::validation(
                    table,
                    format!("row {} has a NULL primary key '{key_name}'", idx + 1),
                ));
            }
        }
    }

    let duplicates: Vec<String> = keys
        .iter()
        .sorted()
        .dedup_with_count()
        .filter(|(count, _)| *count > 1)
        .take(5)
        .map(|(_, value)| value.to_string())
        .collect();
    if !duplicates.is_empty() {
        return Err(SyncError::validation(
            table,
            format!(
                "duplicate primary key value(s) in column '{key_name}': {}",
                duplicates.join(", ")
            ),
        ));
    }

    Ok(keys.into_iter().cloned().collect())
}

/// Partitions the staged keys of `dataset` against the persisted rows of
/// `table`. Read-only: the store is never mutated.
///
/// Checks the staged keys first; callers that already hold the result of
/// [`check_staged_keys`] use [`diff_checked`].
pub fn diff<S>(store: &S, table: &str, dataset: &Dataset) -> SyncResult<KeyPartition>
where
    S: TableStore + ?Sized,
{
    let staged_keys = check_staged_keys(table, dataset)?;
    diff_checked(store, table, dataset, &staged_keys)
}

/// [`diff`] over keys already returned by [`check_staged_keys`] for the same
/// dataset.
pub fn diff_checked<S>(
    store: &S,
    table: &str,
    dataset: &Dataset,
    staged_keys: &BTreeSet<Value>,
) -> SyncResult<KeyPartition>
where
    S: TableStore + ?Sized,
{
    let persisted = store
        .read_columns(table, staged_keys)
        .map_err(|err| SyncError::from_read(table, "diffing", err))?;

    let mut partition = KeyPartition::default();
    for row in dataset.rows() {
        let Some(Some(key)) = row.first() else {
            continue;
        };
        match persisted.get(key) {
            None => {
                partition.insert_keys.insert(key.clone());
            }
            Some(existing) if rows_differ(row, existing) => {
                partition.update_keys.insert(key.clone());
            }
            Some(_) => {
                partition.unchanged_keys.insert(key.clone());
            }
        }
    }

    debug!(
        "Diff for '{}': {} insert(s), {} update(s), {} unchanged",
        table,
        partition.inserted(),
        partition.updated(),
        partition.unchanged()
    );
    Ok(partition)
}
