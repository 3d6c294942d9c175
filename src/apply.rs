//! Mutating the persisted table: bootstrap for new tables, delete-then-insert
//! upsert for existing ones.

use std::collections::BTreeSet;

use log::{debug, info, warn};

use crate::{
    data::{Row, Value},
    dataset::Dataset,
    diff::KeyPartition,
    error::{SyncError, SyncResult},
    schema::TableSchema,
    store::TableStore,
};

/// Creates `table` from `schema` and loads every staged row.
///
/// All or nothing: if the load or its commit fails the new table is dropped
/// again, so a retry takes the bootstrap path once more.
pub fn bootstrap<S>(
    store: &mut S,
    table: &str,
    schema: &TableSchema,
    dataset: &Dataset,
) -> SyncResult<usize>
where
    S: TableStore + ?Sized,
{
    store
        .create_table(table, schema)
        .map_err(|err| SyncError::from_apply(table, "create", err))?;
    info!(
        "Created table '{}' with {} column(s)",
        table,
        schema.columns.len()
    );

    match load_new_table(store, table, dataset) {
        Ok(loaded) => {
            debug!("Bootstrapped '{}' with {} row(s)", table, loaded);
            Ok(loaded)
        }
        Err(err) => {
            if let Err(drop_err) = store.drop_table(table) {
                warn!("Could not drop half-created table '{}': {}", table, drop_err);
            }
            Err(err)
        }
    }
}

fn load_new_table<S>(store: &mut S, table: &str, dataset: &Dataset) -> SyncResult<usize>
where
    S: TableStore + ?Sized,
{
    let mut txn = store
        .begin(table)
        .map_err(|err| SyncError::from_apply(table, "begin", err))?;
    let loaded = txn
        .bulk_load(dataset.rows())
        .map_err(|err| SyncError::from_apply(table, "insert", err))?;
    txn.commit()
        .map_err(|err| SyncError::from_apply(table, "commit", err))?;
    Ok(loaded)
}

/// Applies a partition inside one transaction: rows for updated keys are
/// deleted, then the staged rows for updated and inserted keys are loaded.
///
/// Any failure drops the transaction uncommitted, leaving the table as it was.
pub fn apply_delta<S>(
    store: &mut S,
    table: &str,
    partition: &KeyPartition,
    dataset: &Dataset,
) -> SyncResult<()>
where
    S: TableStore + ?Sized,
{
    if partition.is_noop() {
        debug!("Nothing to apply for '{}'", table);
        return Ok(());
    }

    let upserts = rows_for(dataset, &partition.insert_keys, &partition.update_keys);
    let mut txn = store
        .begin(table)
        .map_err(|err| SyncError::from_apply(table, "begin", err))?;
    let removed = txn
        .delete_where(&partition.update_keys)
        .map_err(|err| SyncError::from_apply(table, "delete", err))?;
    let loaded = txn
        .bulk_load(&upserts)
        .map_err(|err| SyncError::from_apply(table, "insert", err))?;
    txn.commit()
        .map_err(|err| SyncError::from_apply(table, "commit", err))?;
    debug!(
        "Applied delta to '{}': removed {} row(s), loaded {} row(s)",
        table, removed, loaded
    );
    Ok(())
}

fn rows_for(dataset: &Dataset, inserts: &BTreeSet<Value>, updates: &BTreeSet<Value>) -> Vec<Row> {
    dataset
        .rows()
        .iter()
        .filter(|row| match row.first() {
            Some(Some(key)) => inserts.contains(key) || updates.contains(key),
            _ => false,
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dataset::{Column, DataType},
        diff::diff,
        error::ErrorKind,
        schema::{StorageType, infer_table_schema},
        store::memory::MemoryStore,
    };

    fn batch(rows: &[(i64, &str)]) -> Dataset {
        Dataset::new(
            vec![
                Column::new("id", DataType::Integer),
                Column::new("name", DataType::Text),
            ],
            rows.iter()
                .map(|(id, name)| {
                    vec![
                        Some(Value::Integer(*id)),
                        Some(Value::Text(name.to_string())),
                    ]
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn bootstrap_creates_and_loads() {
        let mut store = MemoryStore::new();
        let dataset = batch(&[(1, "a"), (2, "b")]);
        let schema = infer_table_schema("t", &dataset).unwrap();
        assert_eq!(bootstrap(&mut store, "t", &schema, &dataset).unwrap(), 2);
        assert_eq!(store.scan("t").unwrap(), dataset.rows().to_vec());

        let err = bootstrap(&mut store, "t", &schema, &dataset).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Apply);
    }

    #[test]
    fn failed_bootstrap_load_leaves_no_table() {
        let mut store = MemoryStore::new();
        let dataset = batch(&[(1, "a"), (2, "b")]);
        let schema = infer_table_schema("t", &dataset).unwrap();
        let mut mistyped = schema.clone();
        mistyped.columns[1].storage_type = StorageType::Integer;

        let err = bootstrap(&mut store, "t", &mistyped, &dataset).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Apply);
        assert!(!store.table_exists("t").unwrap());

        assert_eq!(bootstrap(&mut store, "t", &schema, &dataset).unwrap(), 2);
        assert_eq!(store.scan("t").unwrap(), dataset.rows().to_vec());
    }

    #[test]
    fn delta_replaces_changed_rows_and_keeps_the_rest() {
        let mut store = MemoryStore::new();
        let first = batch(&[(1, "a"), (2, "b"), (3, "c")]);
        let schema = infer_table_schema("t", &first).unwrap();
        bootstrap(&mut store, "t", &schema, &first).unwrap();

        let second = batch(&[(2, "b"), (3, "C"), (4, "d")]);
        let partition = diff(&store, "t", &second).unwrap();
        apply_delta(&mut store, "t", &partition, &second).unwrap();

        let expected = batch(&[(1, "a"), (2, "b"), (3, "C"), (4, "d")]);
        assert_eq!(store.scan("t").unwrap(), expected.rows().to_vec());
    }

    #[test]
    fn noop_partition_does_not_open_a_transaction() {
        let mut store = MemoryStore::new();
        let partition = KeyPartition::default();
        apply_delta(&mut store, "missing", &partition, &batch(&[])).unwrap();
    }
}
