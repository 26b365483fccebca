use super::Database;
use crate::document::{self, Record};
use crate::error::{FolderDbError, Result};
use crate::schema::Schema;
use crate::validation::{self, CANDIDATE_ID_FIELD, ID_COLUMN};
use rayon::prelude::*;
use serde_json::Value;
use std::path::Path;

/// Creates records in one table.
pub struct Creator<'a> {
    db: &'a Database,
    table: String,
    apply_defaults: bool,
}

impl<'a> Creator<'a> {
    pub(crate) fn new(db: &'a Database, table: &str) -> Self {
        Creator {
            db,
            table: table.to_string(),
            apply_defaults: false,
        }
    }

    /// Fill columns the payload omits from their schema defaults
    /// (`"now"` date defaults resolve to the creation time).
    pub fn with_defaults(&mut self) -> &mut Self {
        self.apply_defaults = true;
        self
    }

    /// Create one record. A caller-chosen id may be passed in the transient `_id`
    /// field; otherwise one is generated. Returns the record as persisted.
    pub fn create(&self, props: Record) -> Result<Record> {
        let dir = self.db.table_dir(&self.table)?;
        let lock = self.db.lock_existing_table(&self.table)?;
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let schema = self.db.schemas().read(&self.table)?;
        let (props, id) = self.check(props, &schema)?;
        let record = self.finish(props, id, &schema)?;
        self.persist_new(&dir, record)
    }

    /// Create several records. Every payload is checked against the schema, and
    /// every caller-chosen id validated, before anything is written; writes then
    /// happen in order and are not rolled back if a later one fails.
    pub fn create_many(&self, entries: Vec<Record>) -> Result<Vec<Record>> {
        let dir = self.db.table_dir(&self.table)?;
        let lock = self.db.lock_existing_table(&self.table)?;
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let schema = self.db.schemas().read(&self.table)?;

        let per_entry: Vec<Vec<String>> = entries
            .par_iter()
            .map(|entry| validation::invalid_columns(entry.keys(), &schema))
            .collect();
        let mut invalid: Vec<String> = Vec::new();
        for column in per_entry.into_iter().flatten() {
            if !invalid.contains(&column) {
                invalid.push(column);
            }
        }
        if !invalid.is_empty() {
            return Err(FolderDbError::InvalidColumns(invalid));
        }

        let checked = entries
            .into_iter()
            .map(|entry| self.check(entry, &schema))
            .collect::<Result<Vec<_>>>()?;

        let mut created = Vec::with_capacity(checked.len());
        for (props, id) in checked {
            let record = self.finish(props, id, &schema)?;
            created.push(self.persist_new(&dir, record)?);
        }
        log::debug!("Created {} records in '{}'", created.len(), self.table);
        Ok(created)
    }

    /// Validate a payload without touching storage. Returns the payload with `_id`
    /// removed and the caller-chosen id, if any.
    fn check(&self, mut props: Record, schema: &Schema) -> Result<(Record, Option<String>)> {
        let id = validation::take_candidate_id(&mut props)?;
        validation::check_columns(&props, schema)?;
        if let Some(id) = &id {
            validation::validate_record_id(id)?;
        }
        Ok((props, id))
    }

    fn finish(&self, mut props: Record, id: Option<String>, schema: &Schema) -> Result<Record> {
        let id = match id {
            Some(id) => id,
            None => {
                let generated = self.db.generate_id();
                validation::validate_record_id(&generated)?;
                generated
            }
        };

        if self.apply_defaults {
            for (column, value) in schema.defaults(chrono::Utc::now()) {
                props.entry(column).or_insert(value);
            }
        }

        props.insert(ID_COLUMN.to_string(), Value::String(id));
        Ok(props)
    }

    fn persist_new(&self, dir: &Path, record: Record) -> Result<Record> {
        let id = record
            .get(ID_COLUMN)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let path = document::record_path(dir, &id);

        if path.exists() || !document::create_json_exclusive(&path, &record)? {
            return Err(FolderDbError::RecordAlreadyExists {
                table: self.table.clone(),
                id,
            });
        }
        Ok(record)
    }
}

/// Updates records in one table.
pub struct Updater<'a> {
    db: &'a Database,
    table: String,
}

impl<'a> Updater<'a> {
    pub(crate) fn new(db: &'a Database, table: &str) -> Self {
        Updater {
            db,
            table: table.to_string(),
        }
    }

    /// Shallow-merge `partial` over the stored record and persist it.
    /// The stored `id` is never changed. Returns the merged record.
    pub fn update(&self, id: &str, mut partial: Record) -> Result<Record> {
        let dir = self.db.table_dir(&self.table)?;
        let lock = self.db.lock_existing_table(&self.table)?;
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let schema = self.db.schemas().read(&self.table)?;
        partial.remove(ID_COLUMN);
        partial.remove(CANDIDATE_ID_FIELD);
        validation::check_columns(&partial, &schema)?;

        let not_found = || FolderDbError::RecordNotFound {
            table: self.table.clone(),
            id: id.to_string(),
        };
        // no record can live under an unusable id
        if validation::validate_record_id(id).is_err() {
            return Err(not_found());
        }

        let path = document::record_path(&dir, id);
        let mut record = document::read_record(&path)?.ok_or_else(not_found)?;

        for (key, value) in partial {
            record.insert(key, value);
        }

        document::write_json_atomic(&path, &record)?;
        Ok(record)
    }
}

/// Deletes records from one table.
pub struct Deleter<'a> {
    db: &'a Database,
    table: String,
}

impl<'a> Deleter<'a> {
    pub(crate) fn new(db: &'a Database, table: &str) -> Self {
        Deleter {
            db,
            table: table.to_string(),
        }
    }

    /// Remove the record file for `id`.
    pub fn delete(&self, id: &str) -> Result<()> {
        let dir = self.db.table_dir(&self.table)?;
        let lock = self.db.lock_existing_table(&self.table)?;
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let not_found = || FolderDbError::RecordNotFound {
            table: self.table.clone(),
            id: id.to_string(),
        };
        if validation::validate_record_id(id).is_err() {
            return Err(not_found());
        }
        if !document::delete_record(&document::record_path(&dir, id))? {
            return Err(not_found());
        }

        log::debug!("Deleted {}/{}", self.table, id);
        Ok(())
    }
}
