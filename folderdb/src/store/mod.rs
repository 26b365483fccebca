mod locks;
mod records;

pub use records::{Creator, Deleter, Updater};

use crate::config::DatabaseConfig;
use crate::error::{FolderDbError, Result};
use crate::id::IdGenerator;
use crate::migration::{DirectoryMigrationSource, MigrationRunner, MigrationSource};
use crate::query::Query;
use crate::schema::SchemaStore;
use crate::validation;
use locks::TableLocks;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// The main entry point for folderdb.
/// A database is a directory under a storage root; each table is a subdirectory
/// holding `schema.json` plus one `<id>.json` file per record.
///
/// Writers are serialised per table by locks owned by this handle. Open one
/// `Database` per root in a process and share it; two handles on the same root
/// do not exclude each other.
pub struct Database {
    name: String,
    dir: PathBuf,
    config: DatabaseConfig,
    ids: Box<dyn IdGenerator>,
    locks: TableLocks,
}

impl Database {
    /// Open database `name` under `root` with configuration from the environment,
    /// applying pending migrations from the configured migrations directory.
    pub fn open(name: &str, root: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(name, root, DatabaseConfig::from_env())
    }

    /// Open with an explicit configuration.
    pub fn open_with(name: &str, root: impl AsRef<Path>, config: DatabaseConfig) -> Result<Self> {
        let source = DirectoryMigrationSource::new(&config.migrations_dir);
        Self::open_with_source(name, root, config, &source)
    }

    /// Open with an explicit configuration and migration source.
    pub fn open_with_source(
        name: &str,
        root: impl AsRef<Path>,
        config: DatabaseConfig,
        source: &dyn MigrationSource,
    ) -> Result<Self> {
        let db = Self::attach(name, root, config)?;
        let report = MigrationRunner::new(&db, source).run()?;
        log::info!(
            "Opened database '{}' at {} ({} migrations applied)",
            db.name,
            db.dir.display(),
            report.applied.len()
        );
        Ok(db)
    }

    /// Bind to database `name` under `root` without running migrations.
    /// The database directory is created if needed.
    pub fn attach(name: &str, root: impl AsRef<Path>, config: DatabaseConfig) -> Result<Self> {
        validation::validate_table_name(name)?;
        let dir = root.as_ref().join(name);
        std::fs::create_dir_all(&dir)?;

        Ok(Database {
            name: name.to_string(),
            dir,
            ids: Box::new(config.id_strategy),
            config,
            locks: TableLocks::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The database directory, `<root>/<name>`.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Replace the identifier generator used for records created without `_id`.
    pub fn set_id_generator(&mut self, generator: impl IdGenerator + 'static) {
        self.ids = Box::new(generator);
    }

    /// Schema access for this database's tables.
    pub fn schemas(&self) -> SchemaStore<'_> {
        SchemaStore::new(self)
    }

    /// Record creation bound to `table`.
    pub fn for_create(&self, table: &str) -> Creator<'_> {
        Creator::new(self, table)
    }

    /// A query bound to `table`.
    pub fn for_read(&self, table: &str) -> Query<'_> {
        Query::new(self, table)
    }

    /// Record updates bound to `table`.
    pub fn for_update(&self, table: &str) -> Updater<'_> {
        Updater::new(self, table)
    }

    /// Record deletion bound to `table`.
    pub fn for_delete(&self, table: &str) -> Deleter<'_> {
        Deleter::new(self, table)
    }

    pub(crate) fn table_dir(&self, table: &str) -> Result<PathBuf> {
        validation::validate_table_name(table)?;
        Ok(self.dir.join(table))
    }

    pub(crate) fn table_lock(&self, table: &str) -> Arc<Mutex<()>> {
        log::debug!("Locking table '{table}'");
        self.locks.get(table)
    }

    /// The lock of a table that already has a schema. A missing table is
    /// `TableNotFound` and leaves no lock entry behind.
    pub(crate) fn lock_existing_table(&self, table: &str) -> Result<Arc<Mutex<()>>> {
        if !self.schemas().exists(table)? {
            return Err(FolderDbError::TableNotFound {
                table: table.to_string(),
            });
        }
        Ok(self.table_lock(table))
    }

    pub(crate) fn generate_id(&self) -> String {
        self.ids.generate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::StaticMigrationSource;
    use crate::schema::{ColumnDescriptor, Schema, SchemaChange};
    use tempfile::TempDir;

    #[test]
    fn test_attach_creates_database_dir() {
        let tmp = TempDir::new().unwrap();
        let db = Database::attach("testDB", tmp.path(), DatabaseConfig::default()).unwrap();
        assert_eq!(db.name(), "testDB");
        assert!(tmp.path().join("testDB").is_dir());
        assert_eq!(db.dir(), tmp.path().join("testDB"));
    }

    #[test]
    fn test_invalid_database_name() {
        let tmp = TempDir::new().unwrap();
        let result = Database::attach("a/b", tmp.path(), DatabaseConfig::default());
        assert!(matches!(result, Err(FolderDbError::InvalidName { .. })));
    }

    #[test]
    fn test_open_bootstraps_migrations_table() {
        let tmp = TempDir::new().unwrap();
        let db = Database::open_with_source(
            "testDB",
            tmp.path(),
            DatabaseConfig::default(),
            &StaticMigrationSource::default(),
        )
        .unwrap();

        assert!(db.schemas().exists("migrations").unwrap());
        assert!(db.for_read("migrations").get().unwrap().is_empty());
    }

    #[test]
    fn test_open_with_missing_migrations_dir() {
        let tmp = TempDir::new().unwrap();
        let config = DatabaseConfig::default().with_migrations_dir(tmp.path().join("nope"));
        let db = Database::open_with("testDB", tmp.path(), config).unwrap();
        assert!(db.schemas().exists("migrations").unwrap());
    }

    #[test]
    fn test_custom_id_generator() {
        struct Fixed;
        impl IdGenerator for Fixed {
            fn generate(&self) -> String {
                "fixed-id".to_string()
            }
        }

        let tmp = TempDir::new().unwrap();
        let mut db = Database::attach("testDB", tmp.path(), DatabaseConfig::default()).unwrap();
        db.set_id_generator(Fixed);
        assert_eq!(db.generate_id(), "fixed-id");
    }

    #[test]
    fn test_missing_tables_leave_no_lock_entries() {
        let tmp = TempDir::new().unwrap();
        let db = Database::attach("testDB", tmp.path(), DatabaseConfig::default()).unwrap();

        for table in ["ghosts", "phantoms"] {
            let err = db.lock_existing_table(table).unwrap_err();
            assert!(matches!(err, FolderDbError::TableNotFound { .. }));
        }
        assert!(db.for_update("ghosts").update("1", Default::default()).is_err());
        assert!(db.for_delete("phantoms").delete("1").is_err());
        assert_eq!(db.locks.len(), 0);

        db.schemas()
            .write(
                "users",
                &SchemaChange::add(Schema::new().column("name", ColumnDescriptor::string())),
            )
            .unwrap();
        assert!(db.lock_existing_table("users").is_ok());
        assert_eq!(db.locks.len(), 1);
    }
}
