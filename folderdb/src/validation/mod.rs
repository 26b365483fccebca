use crate::document::Record;
use crate::error::{FolderDbError, Result};
use crate::schema::Schema;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Transient payload field carrying a caller-chosen record id.
pub const CANDIDATE_ID_FIELD: &str = "_id";

/// The implicit primary-key column present on every record.
pub const ID_COLUMN: &str = "id";

/// Record ids that would collide with table metadata files.
const RESERVED_IDS: &[&str] = &["schema"];

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_\-][A-Za-z0-9_.\-]*$").expect("name pattern is a valid regex")
    })
}

/// Check that a table name can be used as a directory name.
pub fn validate_table_name(name: &str) -> Result<()> {
    if name_pattern().is_match(name) {
        Ok(())
    } else {
        Err(FolderDbError::InvalidName {
            kind: "table",
            name: name.to_string(),
        })
    }
}

/// Check that a record id can be used as a file name without clobbering the schema.
pub fn validate_record_id(id: &str) -> Result<()> {
    if name_pattern().is_match(id) && !RESERVED_IDS.contains(&id) {
        Ok(())
    } else {
        Err(FolderDbError::InvalidName {
            kind: "record id",
            name: id.to_string(),
        })
    }
}

/// Keys that the schema does not declare, in input order.
/// `id` and `_id` are always accepted.
pub fn invalid_columns<'k, I>(keys: I, schema: &Schema) -> Vec<String>
where
    I: IntoIterator<Item = &'k String>,
{
    keys.into_iter()
        .filter(|key| {
            key.as_str() != ID_COLUMN && key.as_str() != CANDIDATE_ID_FIELD && !schema.contains(key)
        })
        .cloned()
        .collect()
}

/// Fail with `InvalidColumns` listing every undeclared key in `record`.
pub fn check_columns(record: &Record, schema: &Schema) -> Result<()> {
    let invalid = invalid_columns(record.keys(), schema);
    if invalid.is_empty() {
        Ok(())
    } else {
        Err(FolderDbError::InvalidColumns(invalid))
    }
}

/// Remove the transient `_id` field from a payload and return it as a string id.
pub fn take_candidate_id(props: &mut Record) -> Result<Option<String>> {
    match props.remove(CANDIDATE_ID_FIELD) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(id)) => Ok(Some(id)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(FolderDbError::InvalidName {
            kind: "record id",
            name: other.to_string(),
        }),
    }
}
