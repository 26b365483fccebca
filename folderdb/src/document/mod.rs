// Record file I/O - one JSON object per file, written atomically

use crate::error::{FolderDbError, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// A stored record: a flat JSON object that always carries an `id`.
pub type Record = Map<String, Value>;

pub const SCHEMA_FILE: &str = "schema.json";
pub const RECORD_EXTENSION: &str = "json";

/// Path of the file backing record `id` in `table_dir`.
pub fn record_path(table_dir: &Path, id: &str) -> PathBuf {
    table_dir.join(format!("{id}.{RECORD_EXTENSION}"))
}

/// Read a record file. A missing file is `Ok(None)`, so callers can treat a record
/// deleted after directory enumeration as simply absent.
pub fn read_record(path: &Path) -> Result<Option<Record>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    match serde_json::from_str(&content)? {
        Value::Object(record) => Ok(Some(record)),
        _ => Err(FolderDbError::Other(format!(
            "Record file is not a JSON object: {}",
            path.display()
        ))),
    }
}

/// Replace the file at `path` with `value`, via a temp file renamed into place.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let tmp = write_temp(path, value)?;
    tmp.persist(path).map_err(|e| FolderDbError::Io(e.error))?;
    Ok(())
}

/// Like [`write_json_atomic`] but never replaces an existing file.
/// Returns `false` if `path` already exists.
pub fn create_json_exclusive<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<bool> {
    let tmp = write_temp(path, value)?;
    match tmp.persist_noclobber(path) {
        Ok(_) => Ok(true),
        Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(FolderDbError::Io(e.error)),
    }
}

/// Delete a record file. Returns `false` if there was nothing to delete.
pub fn delete_record(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// List the ids of all records in a table directory, sorted.
/// The schema file and in-flight temp files are skipped.
pub fn list_record_ids(table_dir: &Path) -> Result<Vec<String>> {
    let mut ids = Vec::new();
    for entry in std::fs::read_dir(table_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        if name == SCHEMA_FILE || name.starts_with('.') {
            continue;
        }
        if let Some(id) = name.strip_suffix(&format!(".{RECORD_EXTENSION}")) {
            ids.push(id.to_string());
        }
    }
    ids.sort();
    Ok(ids)
}

fn write_temp<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<NamedTempFile> {
    let dir = path
        .parent()
        .ok_or_else(|| FolderDbError::Other(format!("No parent directory: {}", path.display())))?;
    let mut tmp = tempfile::Builder::new()
        .prefix(".")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    Ok(tmp)
}
