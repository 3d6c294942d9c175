use std::collections::{BTreeMap, BTreeSet};

use crate::{
    data::{Row, Value},
    error::StoreError,
    schema::TableSchema,
};

use super::{KeyedRows, StoreTransaction, TableStore, delete_keys, insert_rows};

#[derive(Debug, Clone)]
struct MemoryTable {
    schema: TableSchema,
    rows: KeyedRows,
}

/// Tables held in process memory.
///
/// Transactions work on a copy of the table's rows and swap it in on commit.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: BTreeMap<String, MemoryTable>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row_count(&self, name: &str) -> Option<usize> {
        self.tables.get(name).map(|table| table.rows.len())
    }

    fn table(&self, name: &str) -> Result<&MemoryTable, StoreError> {
        self.tables
            .get(name)
            .ok_or_else(|| StoreError::MissingTable(name.to_string()))
    }
}

impl TableStore for MemoryStore {
    fn table_exists(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.tables.contains_key(name))
    }

    fn create_table(&mut self, name: &str, schema: &TableSchema) -> Result<(), StoreError> {
        if self.tables.contains_key(name) {
            return Err(StoreError::TableExists(name.to_string()));
        }
        self.tables.insert(
            name.to_string(),
            MemoryTable {
                schema: schema.clone(),
                rows: KeyedRows::new(),
            },
        );
        Ok(())
    }

    fn drop_table(&mut self, name: &str) -> Result<(), StoreError> {
        self.tables
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::MissingTable(name.to_string()))
    }

    fn table_schema(&self, name: &str) -> Result<TableSchema, StoreError> {
        Ok(self.table(name)?.schema.clone())
    }

    fn read_columns(
        &self,
        name: &str,
        keys: &BTreeSet<Value>,
    ) -> Result<BTreeMap<Value, Row>, StoreError> {
        let table = self.table(name)?;
        Ok(keys
            .iter()
            .filter_map(|key| table.rows.get(key).map(|row| (key.clone(), row.clone())))
            .collect())
    }

    fn scan(&self, name: &str) -> Result<Vec<Row>, StoreError> {
        Ok(self.table(name)?.rows.values().cloned().collect())
    }

    fn begin<'a>(
        &'a mut self,
        name: &str,
    ) -> Result<Box<dyn StoreTransaction + 'a>, StoreError> {
        let working = self.table(name)?.clone();
        Ok(Box::new(MemoryTransaction {
            store: self,
            name: name.to_string(),
            working,
        }))
    }
}

struct MemoryTransaction<'a> {
    store: &'a mut MemoryStore,
    name: String,
    working: MemoryTable,
}

impl StoreTransaction for MemoryTransaction<'_> {
    fn delete_where(&mut self, keys: &BTreeSet<Value>) -> Result<usize, StoreError> {
        Ok(delete_keys(&mut self.working.rows, keys))
    }

    fn bulk_load(&mut self, rows: &[Row]) -> Result<usize, StoreError> {
        insert_rows(
            &self.name,
            &self.working.schema,
            &mut self.working.rows,
            rows,
        )
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTransaction {
            store,
            name,
            working,
        } = *self;
        store.tables.insert(name, working);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDef, StorageType};

    fn schema() -> TableSchema {
        TableSchema {
            columns: vec![
                ColumnDef {
                    name: "id".into(),
                    storage_type: StorageType::Integer,
                    primary_key: true,
                },
                ColumnDef {
                    name: "qty".into(),
                    storage_type: StorageType::Integer,
                    primary_key: false,
                },
            ],
        }
    }

    fn row(id: i64, qty: Option<i64>) -> Row {
        vec![Some(Value::Integer(id)), qty.map(Value::Integer)]
    }

    #[test]
    fn uncommitted_transactions_leave_no_trace() {
        let mut store = MemoryStore::new();
        store.create_table("stock", &schema()).unwrap();
        {
            let mut txn = store.begin("stock").unwrap();
            txn.bulk_load(&[row(1, Some(5))]).unwrap();
        }
        assert_eq!(store.row_count("stock"), Some(0));

        let mut txn = store.begin("stock").unwrap();
        txn.bulk_load(&[row(1, Some(5)), row(2, None)]).unwrap();
        txn.commit().unwrap();
        assert_eq!(store.scan("stock").unwrap(), vec![row(1, Some(5)), row(2, None)]);
    }

    #[test]
    fn bulk_load_enforces_the_primary_key() {
        let mut store = MemoryStore::new();
        store.create_table("stock", &schema()).unwrap();
        let mut txn = store.begin("stock").unwrap();
        let err = txn.bulk_load(&[row(1, None), row(1, Some(2))]).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { .. }));

        let err = txn.bulk_load(&[vec![None, None]]).unwrap_err();
        assert!(matches!(err, StoreError::RowMismatch { .. }));
    }

    #[test]
    fn read_columns_returns_only_the_intersection() {
        let mut store = MemoryStore::new();
        store.create_table("stock", &schema()).unwrap();
        let mut txn = store.begin("stock").unwrap();
        txn.bulk_load(&[row(1, Some(1)), row(2, Some(2))]).unwrap();
        txn.commit().unwrap();

        let keys: BTreeSet<_> = [Value::Integer(2), Value::Integer(9)].into_iter().collect();
        let found = store.read_columns("stock", &keys).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[&Value::Integer(2)], row(2, Some(2)));
    }

    #[test]
    fn creating_twice_fails_and_missing_tables_are_reported() {
        let mut store = MemoryStore::new();
        store.create_table("stock", &schema()).unwrap();
        assert!(matches!(
            store.create_table("stock", &schema()),
            Err(StoreError::TableExists(_))
        ));
        assert!(matches!(store.scan("other"), Err(StoreError::MissingTable(_))));
        assert!(!store.table_exists("other").unwrap());
    }

    #[test]
    fn dropped_tables_can_be_recreated() {
        let mut store = MemoryStore::new();
        store.create_table("stock", &schema()).unwrap();
        store.drop_table("stock").unwrap();
        assert!(!store.table_exists("stock").unwrap());
        assert!(matches!(
            store.drop_table("stock"),
            Err(StoreError::MissingTable(_))
        ));
        store.create_table("stock", &schema()).unwrap();
        assert_eq!(store.row_count("stock"), Some(0));
    }
}
