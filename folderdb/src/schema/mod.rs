mod parser;
mod types;

pub use parser::{parse_columns, parse_schema, parse_schema_str, schema_to_string};
pub use types::{
    format_timestamp, ColumnDescriptor, ColumnType, DateDefault, Schema, SchemaChange,
    NOW_SENTINEL,
};

use crate::document::{self, SCHEMA_FILE};
use crate::error::{FolderDbError, Result};
use crate::store::Database;
use std::io::ErrorKind;
use std::path::PathBuf;

/// Reads and writes the `schema.json` of tables in one database.
/// A table exists exactly when its schema file does.
pub struct SchemaStore<'a> {
    db: &'a Database,
}

impl<'a> SchemaStore<'a> {
    pub(crate) fn new(db: &'a Database) -> Self {
        SchemaStore { db }
    }

    /// Location of the table's schema file, whether or not it exists yet.
    pub fn path(&self, table: &str) -> Result<PathBuf> {
        Ok(self.db.table_dir(table)?.join(SCHEMA_FILE))
    }

    pub fn exists(&self, table: &str) -> Result<bool> {
        Ok(self.path(table)?.is_file())
    }

    /// Load the table's schema. A missing schema file is `TableNotFound`.
    pub fn read(&self, table: &str) -> Result<Schema> {
        let path = self.path(table)?;
        match std::fs::read_to_string(&path) {
            Ok(content) => parse_schema_str(&content),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(FolderDbError::TableNotFound {
                table: table.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Merge `change` into the table's schema and persist it, creating the table
    /// directory and schema on first write. Returns the schema as written.
    pub fn write(&self, table: &str, change: &SchemaChange) -> Result<Schema> {
        let dir = self.db.table_dir(table)?;
        let lock = self.db.table_lock(table);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        std::fs::create_dir_all(&dir)?;
        let path = dir.join(SCHEMA_FILE);

        let schema = if path.is_file() {
            let mut current = parse_schema(&path)?;
            current.merge(change);
            current
        } else {
            change.add.clone()
        };

        document::write_json_atomic(&path, &schema)?;
        log::debug!("Wrote schema for '{}' ({} columns)", table, schema.len());
        Ok(schema)
    }
}
