use std::{
    collections::{BTreeMap, BTreeSet},
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use encoding_rs::UTF_8;
use log::debug;

use crate::{
    data::{Row, Value, parse_present_value},
    error::StoreError,
    io_utils,
    schema::{StorageType, TableSchema},
};

use super::{KeyedRows, StoreTransaction, TableStore, delete_keys, insert_rows};

/// Marker written for NULL cells, so an empty string stays an empty string.
/// Text values starting with a backslash get one extra leading backslash on
/// disk, so the text `\N` never reads back as NULL.
pub const NULL_TOKEN: &str = "\\N";
const ESCAPE: char = '\\';

const SCHEMA_SUFFIX: &str = ".schema.yaml";
const DATA_SUFFIX: &str = ".csv";

/// A directory of tables. Each table is a `<name>.schema.yaml` column list
/// plus a `<name>.csv` data file with rows in primary-key order.
///
/// Transactions load the table into memory and commit by writing a temporary
/// file next to the data file and renaming it into place, so readers see
/// either the old rows or the new rows.
#[derive(Debug, Clone)]
pub struct CsvTableStore {
    root: PathBuf,
}

impl CsvTableStore {
    /// Opens the store, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StoreError::Unavailable {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}{DATA_SUFFIX}"))
    }

    pub fn schema_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}{SCHEMA_SUFFIX}"))
    }

    fn ensure_root(&self) -> Result<(), StoreError> {
        match fs::metadata(&self.root) {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(StoreError::Unavailable {
                path: self.root.clone(),
                source: std::io::Error::other("store root is not a directory"),
            }),
            Err(source) => Err(StoreError::Unavailable {
                path: self.root.clone(),
                source,
            }),
        }
    }

    fn load_schema(&self, name: &str) -> Result<TableSchema, StoreError> {
        self.ensure_root()?;
        let path = self.schema_path(name);
        if !path.is_file() {
            return Err(StoreError::MissingTable(name.to_string()));
        }
        let reader = BufReader::new(File::open(&path)?);
        let schema: TableSchema =
            serde_yaml::from_reader(reader).map_err(|err| StoreError::Metadata {
                path: path.clone(),
                message: err.to_string(),
            })?;
        if schema.columns.first().map(|c| c.primary_key) != Some(true) {
            return Err(StoreError::Metadata {
                path,
                message: "first column must be the primary key".to_string(),
            });
        }
        Ok(schema)
    }

    fn load_rows(&self, name: &str, schema: &TableSchema) -> Result<KeyedRows, StoreError> {
        let path = self.data_path(name);
        let file = File::open(&path)?;
        let mut reader = io_utils::open_csv_reader(BufReader::new(file), b',', true);
        let headers = reader.byte_headers()?.clone();
        let headers = io_utils::decode_record(&headers, UTF_8).map_err(|err| metadata(&path, err))?;
        if headers != schema.column_names() {
            return Err(StoreError::Metadata {
                path,
                message: format!(
                    "data header {:?} does not match schema columns {:?}",
                    headers,
                    schema.column_names()
                ),
            });
        }

        let mut rows = KeyedRows::new();
        let mut record = csv::ByteRecord::new();
        let mut line = 1usize;
        while reader.read_byte_record(&mut record)? {
            line += 1;
            let fields =
                io_utils::decode_record(&record, UTF_8).map_err(|err| metadata(&path, err))?;
            let row = parse_row(&fields, schema)
                .map_err(|err| metadata(&path, err.context(format!("line {line}"))))?;
            insert_rows(name, schema, &mut rows, std::slice::from_ref(&row))?;
        }
        Ok(rows)
    }

    fn write_rows(&self, name: &str, schema: &TableSchema, rows: &KeyedRows) -> Result<(), StoreError> {
        let target = self.data_path(name);
        let mut temp = tempfile::Builder::new()
            .prefix(&format!(".{name}."))
            .suffix(".swap")
            .tempfile_in(&self.root)?;
        {
            let mut writer = io_utils::csv_writer(BufWriter::new(temp.as_file_mut()), b',');
            writer.write_record(schema.column_names())?;
            for row in rows.values() {
                writer.write_record(render_row(row, schema))?;
            }
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(&target).map_err(|err| StoreError::Io(err.error))?;
        debug!("Wrote {} row(s) to {:?}", rows.len(), target);
        Ok(())
    }

    fn write_schema(&self, name: &str, schema: &TableSchema) -> Result<(), StoreError> {
        let target = self.schema_path(name);
        let temp = tempfile::Builder::new()
            .prefix(&format!(".{name}."))
            .suffix(".schema.swap")
            .tempfile_in(&self.root)?;
        let mut writer = BufWriter::new(temp.as_file());
        serde_yaml::to_writer(&mut writer, schema).map_err(|err| StoreError::Metadata {
            path: target.clone(),
            message: err.to_string(),
        })?;
        writer.flush()?;
        drop(writer);
        temp.as_file().sync_all()?;
        temp.persist(&target).map_err(|err| StoreError::Io(err.error))?;
        Ok(())
    }
}

impl TableStore for CsvTableStore {
    fn table_exists(&self, name: &str) -> Result<bool, StoreError> {
        self.ensure_root()?;
        Ok(self.schema_path(name).is_file())
    }

    fn create_table(&mut self, name: &str, schema: &TableSchema) -> Result<(), StoreError> {
        if self.table_exists(name)? {
            return Err(StoreError::TableExists(name.to_string()));
        }
        // The schema file marks the table as existing, so it goes last.
        self.write_rows(name, schema, &KeyedRows::new())?;
        self.write_schema(name, schema)
    }

    fn drop_table(&mut self, name: &str) -> Result<(), StoreError> {
        if !self.table_exists(name)? {
            return Err(StoreError::MissingTable(name.to_string()));
        }
        // Schema first: once it is gone the table no longer exists.
        fs::remove_file(self.schema_path(name))?;
        match fs::remove_file(self.data_path(name)) {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }

    fn table_schema(&self, name: &str) -> Result<TableSchema, StoreError> {
        self.load_schema(name)
    }

    fn read_columns(
        &self,
        name: &str,
        keys: &BTreeSet<Value>,
    ) -> Result<BTreeMap<Value, Row>, StoreError> {
        let schema = self.load_schema(name)?;
        let mut rows = self.load_rows(name, &schema)?;
        rows.retain(|key, _| keys.contains(key));
        Ok(rows)
    }

    fn scan(&self, name: &str) -> Result<Vec<Row>, StoreError> {
        let schema = self.load_schema(name)?;
        Ok(self.load_rows(name, &schema)?.into_values().collect())
    }

    fn begin<'a>(
        &'a mut self,
        name: &str,
    ) -> Result<Box<dyn StoreTransaction + 'a>, StoreError> {
        let schema = self.load_schema(name)?;
        let rows = self.load_rows(name, &schema)?;
        Ok(Box::new(CsvTransaction {
            store: self,
            name: name.to_string(),
            schema,
            rows,
            dirty: false,
        }))
    }
}

struct CsvTransaction<'a> {
    store: &'a CsvTableStore,
    name: String,
    schema: TableSchema,
    rows: KeyedRows,
    dirty: bool,
}

impl StoreTransaction for CsvTransaction<'_> {
    fn delete_where(&mut self, keys: &BTreeSet<Value>) -> Result<usize, StoreError> {
        let removed = delete_keys(&mut self.rows, keys);
        self.dirty |= removed > 0;
        Ok(removed)
    }

    fn bulk_load(&mut self, rows: &[Row]) -> Result<usize, StoreError> {
        let loaded = insert_rows(&self.name, &self.schema, &mut self.rows, rows)?;
        self.dirty |= loaded > 0;
        Ok(loaded)
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        if !self.dirty {
            return Ok(());
        }
        self.store.write_rows(&self.name, &self.schema, &self.rows)
    }
}

fn parse_row(fields: &[String], schema: &TableSchema) -> anyhow::Result<Row> {
    schema
        .columns
        .iter()
        .zip(fields.iter())
        .map(|(column, field)| {
            if field == NULL_TOKEN {
                Ok(None)
            } else if column.storage_type == StorageType::Text {
                Ok(Some(Value::Text(unescape_text(field).to_string())))
            } else {
                parse_present_value(field, column.storage_type.data_type())
                    .map(Some)
                    .map_err(|err| err.context(format!("column '{}'", column.name)))
            }
        })
        .collect()
}

fn render_row(row: &Row, schema: &TableSchema) -> Vec<String> {
    schema
        .columns
        .iter()
        .zip(row.iter())
        .map(|(column, cell)| match cell {
            Some(Value::Text(text)) => escape_text(text),
            Some(value) => column.storage_type.render(value),
            None => NULL_TOKEN.to_string(),
        })
        .collect()
}

fn escape_text(text: &str) -> String {
    if text.starts_with(ESCAPE) {
        format!("{ESCAPE}{text}")
    } else {
        text.to_string()
    }
}

fn unescape_text(field: &str) -> &str {
    field.strip_prefix(ESCAPE).unwrap_or(field)
}

fn metadata(path: &Path, err: anyhow::Error) -> StoreError {
    StoreError::Metadata {
        path: path.to_path_buf(),
        message: format!("{err:#}"),
    }
}
