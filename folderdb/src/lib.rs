pub mod config;
pub mod document;
pub mod error;
pub mod id;
pub mod migration;
pub mod query;
pub mod schema;
pub mod store;
pub mod validation;

pub use config::DatabaseConfig;
pub use document::Record;
pub use error::{FolderDbError, Result};
pub use id::{AutoIdStrategy, IdGenerator};
pub use migration::{
    DirectoryMigrationSource, MigrationDefinition, MigrationReport, MigrationRunner,
    MigrationSource, MigrationState, StaticMigrationSource,
};
pub use query::{Direction, Operator, Query};
pub use schema::{ColumnDescriptor, ColumnType, DateDefault, Schema, SchemaChange};
pub use store::{Creator, Database, Deleter, Updater};
