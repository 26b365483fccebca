use crate::document::Record;
use crate::error::{FolderDbError, Result};
use crate::query::Direction;
use crate::schema::{
    format_timestamp, parse_columns, ColumnDescriptor, DateDefault, Schema, SchemaChange,
};
use crate::store::Database;
use crate::validation::{CANDIDATE_ID_FIELD, ID_COLUMN};
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Reserved table recording applied migrations, one record per migration id.
pub const MIGRATIONS_TABLE: &str = "migrations";

const NAME_KEY: &str = "name";
const ADD_KEY: &str = "add";
const REMOVE_KEY: &str = "remove";
const DATE_COLUMN: &str = "date";

/// One named schema change for a target table.
///
/// The payload is either flat, `{"name": "users", "age": {"type": "number"}}`,
/// or structured, `{"name": "users", "add": {...}, "remove": ["nickname"]}`.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationDefinition {
    pub id: String,
    pub payload: Map<String, Value>,
}

impl MigrationDefinition {
    pub fn new(id: impl Into<String>, payload: Map<String, Value>) -> Self {
        MigrationDefinition {
            id: id.into(),
            payload,
        }
    }

    /// The table this migration alters.
    pub fn target_table(&self) -> Result<&str> {
        match self.payload.get(NAME_KEY) {
            Some(Value::String(name)) if !name.is_empty() => Ok(name),
            _ => Err(FolderDbError::Migration(format!(
                "Migration {} does not have a name",
                self.id
            ))),
        }
    }

    pub fn is_structured(&self) -> bool {
        self.payload.contains_key(ADD_KEY) || self.payload.contains_key(REMOVE_KEY)
    }

    /// Parse the payload into the change to merge into the target schema.
    pub fn schema_change(&self) -> Result<SchemaChange> {
        if !self.is_structured() {
            let mut columns = self.payload.clone();
            columns.remove(NAME_KEY);
            return Ok(SchemaChange::add(parse_columns(&columns)?));
        }

        let add = match self.payload.get(ADD_KEY) {
            None | Some(Value::Null) => Schema::new(),
            Some(Value::Object(columns)) => parse_columns(columns)?,
            Some(_) => {
                return Err(FolderDbError::Schema(format!(
                    "migration {}: 'add' must be an object",
                    self.id
                )))
            }
        };

        let remove: BTreeSet<String> = match self.payload.get(REMOVE_KEY) {
            None | Some(Value::Null) => BTreeSet::new(),
            Some(Value::Object(columns)) => columns.keys().cloned().collect(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(column) => Ok(column.clone()),
                    _ => Err(FolderDbError::Schema(format!(
                        "migration {}: 'remove' entries must be column names",
                        self.id
                    ))),
                })
                .collect::<Result<_>>()?,
            Some(_) => {
                return Err(FolderDbError::Schema(format!(
                    "migration {}: 'remove' must be an array or object",
                    self.id
                )))
            }
        };

        Ok(SchemaChange::add(add).removing(remove))
    }
}

/// Supplies the pending migration definitions.
pub trait MigrationSource {
    fn load(&self) -> Result<Vec<MigrationDefinition>>;
}

/// Reads `*.json`, `*.yaml` and `*.yml` files from a directory.
/// The migration id is the file name up to its first `.`.
#[derive(Debug, Clone)]
pub struct DirectoryMigrationSource {
    dir: PathBuf,
}

impl DirectoryMigrationSource {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        DirectoryMigrationSource {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read_definition(path: &Path) -> Result<Option<MigrationDefinition>> {
        let Some(file_name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
            return Ok(None);
        };
        let id = file_name.split('.').next().unwrap_or_default().to_string();
        if id.is_empty() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)?;
        let value: Value = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            Some("yaml" | "yml") => serde_yaml::from_str(&content)?,
            _ => return Ok(None),
        };

        match value {
            Value::Object(payload) => Ok(Some(MigrationDefinition::new(id, payload))),
            _ => Err(FolderDbError::Migration(format!(
                "Migration {} must be an object",
                path.display()
            ))),
        }
    }
}

impl MigrationSource for DirectoryMigrationSource {
    fn load(&self) -> Result<Vec<MigrationDefinition>> {
        if !self.dir.is_dir() {
            log::debug!("No migrations directory at {}", self.dir.display());
            return Ok(Vec::new());
        }

        let pattern = format!("{}/*", glob::Pattern::escape(&self.dir.to_string_lossy()));
        let files: Vec<PathBuf> = glob::glob(&pattern)
            .map_err(|e| FolderDbError::Other(format!("Glob error: {e}")))?
            .filter_map(|r| r.ok())
            .filter(|p| p.is_file())
            .collect();

        let mut definitions = Vec::new();
        for path in &files {
            if let Some(definition) = Self::read_definition(path)? {
                definitions.push(definition);
            }
        }
        definitions.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(definitions)
    }
}

/// In-memory definitions, mostly for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticMigrationSource {
    definitions: Vec<MigrationDefinition>,
}

impl StaticMigrationSource {
    pub fn new(definitions: Vec<MigrationDefinition>) -> Self {
        StaticMigrationSource { definitions }
    }
}

impl MigrationSource for StaticMigrationSource {
    fn load(&self) -> Result<Vec<MigrationDefinition>> {
        Ok(self.definitions.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    Uninitialized,
    EnsuringMigrationsTable,
    ApplyingPending,
    Ready,
}

/// What a run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Ids of the migrations applied by this run, in order.
    pub applied: Vec<String>,
}

/// Brings a database's schemas up to date with a migration source.
pub struct MigrationRunner<'a> {
    db: &'a Database,
    source: &'a dyn MigrationSource,
    state: MigrationState,
}

impl<'a> MigrationRunner<'a> {
    pub fn new(db: &'a Database, source: &'a dyn MigrationSource) -> Self {
        MigrationRunner {
            db,
            source,
            state: MigrationState::Uninitialized,
        }
    }

    pub fn state(&self) -> MigrationState {
        self.state
    }

    /// Ensure the migrations table exists, then apply every definition whose id
    /// has not been recorded yet, in id order.
    pub fn run(&mut self) -> Result<MigrationReport> {
        self.state = MigrationState::EnsuringMigrationsTable;
        self.ensure_migrations_table()?;

        self.state = MigrationState::ApplyingPending;
        let mut definitions = self.source.load()?;
        definitions.sort_by(|a, b| a.id.cmp(&b.id));

        let mut report = MigrationReport::default();
        for definition in &definitions {
            let table = definition.target_table()?;
            if self.is_recorded(&definition.id)? {
                continue;
            }

            let change = definition.schema_change()?;
            self.db.schemas().write(table, &change)?;
            self.record(&definition.id)?;

            log::info!("Applied migration '{}' to table '{}'", definition.id, table);
            report.applied.push(definition.id.clone());
        }

        self.state = MigrationState::Ready;
        Ok(report)
    }

    fn ensure_migrations_table(&self) -> Result<()> {
        let latest = self
            .db
            .for_read(MIGRATIONS_TABLE)
            .order_by(DATE_COLUMN, Direction::Desc)
            .limit(1)
            .columns([ID_COLUMN])
            .get();

        match latest {
            Ok(rows) => {
                if let Some(id) = rows.first().and_then(|r| r.get(ID_COLUMN)) {
                    log::debug!("Latest recorded migration: {id}");
                }
                Ok(())
            }
            Err(FolderDbError::TableNotFound { .. }) => {
                log::info!("Creating '{MIGRATIONS_TABLE}' table");
                self.db
                    .schemas()
                    .write(MIGRATIONS_TABLE, &SchemaChange::add(bootstrap_schema()))?;
                self.ensure_migrations_table()
            }
            Err(e) => Err(e),
        }
    }

    fn is_recorded(&self, id: &str) -> Result<bool> {
        let found = self
            .db
            .for_read(MIGRATIONS_TABLE)
            .filter(ID_COLUMN, "=", id)
            .get()?;
        Ok(!found.is_empty())
    }

    fn record(&self, id: &str) -> Result<()> {
        let mut entry = Record::new();
        entry.insert(CANDIDATE_ID_FIELD.to_string(), Value::String(id.to_string()));
        entry.insert(
            DATE_COLUMN.to_string(),
            Value::String(format_timestamp(Utc::now())),
        );

        match self.db.for_create(MIGRATIONS_TABLE).create(entry) {
            Ok(_) => Ok(()),
            Err(FolderDbError::RecordAlreadyExists { .. }) => {
                log::warn!("Migration '{id}' was recorded concurrently");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Schema of the reserved migrations table.
fn bootstrap_schema() -> Schema {
    Schema::new()
        .column(
            ID_COLUMN,
            ColumnDescriptor::string()
                .with_length(255)
                .unique()
                .identifier(),
        )
        .column(
            DATE_COLUMN,
            ColumnDescriptor::date().with_date_default(DateDefault::Now),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::schema::ColumnType;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn definition(id: &str, payload: Value) -> MigrationDefinition {
        MigrationDefinition::new(id, payload.as_object().unwrap().clone())
    }

    fn setup() -> (TempDir, Database) {
        let tmp = TempDir::new().unwrap();
        let db = Database::attach("testDB", tmp.path(), DatabaseConfig::default()).unwrap();
        (tmp, db)
    }

    fn recorded_ids(db: &Database) -> Vec<String> {
        db.for_read(MIGRATIONS_TABLE)
            .get()
            .unwrap()
            .into_iter()
            .map(|r| r["id"].as_str().unwrap().to_string())
            .collect()
    }

    fn users_and_roles() -> StaticMigrationSource {
        StaticMigrationSource::new(vec![
            definition(
                "002_roles",
                json!({ "name": "roles", "title": { "type": "string" } }),
            ),
            definition(
                "001_users",
                json!({ "name": "users", "age": { "type": "number" }, "email": { "type": "string", "length": 120 } }),
            ),
        ])
    }

    #[test]
    fn test_flat_schema_change() {
        let def = definition("001", json!({ "name": "users", "age": { "type": "number" } }));
        assert_eq!(def.target_table().unwrap(), "users");
        let change = def.schema_change().unwrap();
        assert_eq!(change.add.names().collect::<Vec<_>>(), vec!["age"]);
        assert!(change.remove.is_empty());
    }

    #[test]
    fn test_structured_schema_change() {
        let def = definition(
            "003",
            json!({
                "name": "users",
                "add": { "nickname": { "type": "string" } },
                "remove": ["email"]
            }),
        );
        let change = def.schema_change().unwrap();
        assert!(change.add.contains("nickname"));
        assert_eq!(change.remove.into_iter().collect::<Vec<_>>(), vec!["email"]);

        let keyed = definition("004", json!({ "name": "users", "remove": { "age": {} } }));
        assert!(keyed.schema_change().unwrap().remove.contains("age"));
    }

    #[test]
    fn test_bad_descriptor_is_schema_error() {
        let def = definition("001", json!({ "name": "users", "age": { "type": "decimal" } }));
        assert!(matches!(def.schema_change(), Err(FolderDbError::Schema(_))));
    }

    #[test]
    fn test_run_bootstraps_and_applies() {
        let (_tmp, db) = setup();
        let source = users_and_roles();
        let mut runner = MigrationRunner::new(&db, &source);
        assert_eq!(runner.state(), MigrationState::Uninitialized);

        let report = runner.run().unwrap();
        assert_eq!(runner.state(), MigrationState::Ready);
        assert_eq!(report.applied, vec!["001_users", "002_roles"]);

        let migrations = db.schemas().read(MIGRATIONS_TABLE).unwrap();
        assert_eq!(
            migrations.get("id").unwrap().column_type(),
            ColumnType::String
        );
        assert!(migrations.get("id").unwrap().is_identifier());
        assert_eq!(migrations.get("date").unwrap().column_type(), ColumnType::Date);

        let users = db.schemas().read("users").unwrap();
        assert_eq!(users.names().collect::<Vec<_>>(), vec!["age", "email"]);
        assert_eq!(users.get("email").unwrap().length(), Some(120));
        assert!(db.schemas().exists("roles").unwrap());

        let rows = db.for_read(MIGRATIONS_TABLE).get().unwrap();
        assert!(rows.iter().all(|r| r["date"].is_string()));
    }

    #[test]
    fn test_run_twice_applies_once() {
        let (_tmp, db) = setup();
        let source = users_and_roles();

        MigrationRunner::new(&db, &source).run().unwrap();
        let second = MigrationRunner::new(&db, &source).run().unwrap();

        assert!(second.applied.is_empty());
        assert_eq!(recorded_ids(&db), vec!["001_users", "002_roles"]);
    }

    #[test]
    fn test_later_definitions_are_picked_up() {
        let (_tmp, db) = setup();
        MigrationRunner::new(&db, &users_and_roles()).run().unwrap();

        let mut definitions = users_and_roles().definitions;
        definitions.push(definition(
            "003_users_nickname",
            json!({
                "name": "users",
                "add": { "nickname": { "type": "string" } },
                "remove": ["email"]
            }),
        ));
        let report = MigrationRunner::new(&db, &StaticMigrationSource::new(definitions))
            .run()
            .unwrap();

        assert_eq!(report.applied, vec!["003_users_nickname"]);
        let users = db.schemas().read("users").unwrap();
        assert_eq!(users.names().collect::<Vec<_>>(), vec!["age", "nickname"]);
    }

    #[test]
    fn test_add_does_not_replace_existing_column() {
        let (_tmp, db) = setup();
        let source = StaticMigrationSource::new(vec![
            definition("001", json!({ "name": "users", "age": { "type": "number" } })),
            definition("002", json!({ "name": "users", "age": { "type": "string" } })),
        ]);
        MigrationRunner::new(&db, &source).run().unwrap();

        let users = db.schemas().read("users").unwrap();
        assert_eq!(users.get("age").unwrap().column_type(), ColumnType::Number);
    }

    #[test]
    fn test_missing_name_is_fatal() {
        let (_tmp, db) = setup();
        let source = StaticMigrationSource::new(vec![definition(
            "001_nameless",
            json!({ "age": { "type": "number" } }),
        )]);

        let mut runner = MigrationRunner::new(&db, &source);
        let err = runner.run().unwrap_err();
        assert_eq!(err.to_string(), "Migration 001_nameless does not have a name");
        assert_eq!(runner.state(), MigrationState::ApplyingPending);
        assert!(recorded_ids(&db).is_empty());
    }

    #[test]
    fn test_failed_apply_is_not_recorded() {
        let (_tmp, db) = setup();
        let source = StaticMigrationSource::new(vec![definition(
            "001",
            json!({ "name": "users", "age": { "type": "decimal" } }),
        )]);
        assert!(MigrationRunner::new(&db, &source).run().is_err());
        assert!(recorded_ids(&db).is_empty());
        assert!(!db.schemas().exists("users").unwrap());
    }

    #[test]
    fn test_directory_source() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("migrations");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("002_roles.yaml"),
            "name: roles\ntitle:\n  type: string\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("001_users.json"),
            r#"{ "name": "users", "age": { "type": "number" } }"#,
        )
        .unwrap();
        std::fs::write(dir.join("README.md"), "not a migration").unwrap();

        let definitions = DirectoryMigrationSource::new(&dir).load().unwrap();
        let ids: Vec<&str> = definitions.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["001_users", "002_roles"]);
        assert_eq!(definitions[1].target_table().unwrap(), "roles");
        assert!(definitions[1].schema_change().unwrap().add.contains("title"));
    }

    #[test]
    fn test_directory_source_missing_dir() {
        let tmp = TempDir::new().unwrap();
        let source = DirectoryMigrationSource::new(tmp.path().join("absent"));
        assert!(source.load().unwrap().is_empty());
    }

    #[test]
    fn test_open_applies_directory_migrations() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("migrations");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("001_users.json"),
            r#"{ "name": "users", "title": { "type": "string" } }"#,
        )
        .unwrap();

        let config = DatabaseConfig::default().with_migrations_dir(&dir);
        let db = Database::open_with("testDB", tmp.path().join("data"), config.clone()).unwrap();
        assert!(db.schemas().exists("users").unwrap());
        drop(db);

        let db = Database::open_with("testDB", tmp.path().join("data"), config).unwrap();
        assert_eq!(recorded_ids(&db), vec!["001_users"]);
    }
}
