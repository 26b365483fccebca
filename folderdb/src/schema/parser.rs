use super::types::{ColumnDescriptor, Schema};
use crate::error::{FolderDbError, Result};
use serde_json::{Map, Value};
use std::path::Path;

/// Parse a schema.json file into a Schema
pub fn parse_schema(path: &Path) -> Result<Schema> {
    let content = std::fs::read_to_string(path)?;
    parse_schema_str(&content)
}

/// Parse a schema JSON string into a Schema
pub fn parse_schema_str(content: &str) -> Result<Schema> {
    let value: Value = serde_json::from_str(content)?;
    match value {
        Value::Object(columns) => parse_columns(&columns),
        other => Err(FolderDbError::Schema(format!(
            "schema must be a JSON object, got {}",
            json_type_name(&other)
        ))),
    }
}

/// Parse a mapping of column name to descriptor, naming the column at fault on error.
pub fn parse_columns(columns: &Map<String, Value>) -> Result<Schema> {
    let mut schema = Schema::new();
    for (name, raw) in columns {
        let descriptor: ColumnDescriptor = serde_json::from_value(raw.clone())
            .map_err(|e| FolderDbError::Schema(format!("column '{name}': {e}")))?;
        schema.insert(name.clone(), descriptor);
    }
    Ok(schema)
}

/// Serialize a schema the way it is stored on disk.
pub fn schema_to_string(schema: &Schema) -> Result<String> {
    Ok(serde_json::to_string_pretty(schema)?)
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnType;

    #[test]
    fn test_parse_schema_str() {
        let schema = parse_schema_str(
            r#"{
  "name": { "type": "string", "length": 120 },
  "age": { "type": "number" },
  "active": { "type": "boolean", "default": true }
}"#,
        )
        .unwrap();
        assert_eq!(schema.len(), 3);
        assert_eq!(schema.get("age").unwrap().column_type(), ColumnType::Number);
        assert_eq!(schema.get("name").unwrap().length(), Some(120));
    }

    #[test]
    fn test_error_names_offending_column() {
        let err = parse_schema_str(r#"{ "avatar": { "type": "image" } }"#).unwrap_err();
        assert!(matches!(err, FolderDbError::Schema(_)));
        assert!(err.to_string().contains("avatar"));
    }

    #[test]
    fn test_non_object_rejected() {
        let err = parse_schema_str("[1, 2]").unwrap_err();
        assert!(err.to_string().contains("array"));
    }

    #[test]
    fn test_stored_form_parses_back() {
        let schema = parse_schema_str(r#"{ "id": { "type": "string", "unique": true } }"#).unwrap();
        let text = schema_to_string(&schema).unwrap();
        assert_eq!(parse_schema_str(&text).unwrap(), schema);
    }
}
