use crate::id::AutoIdStrategy;
use std::path::PathBuf;

/// Environment variable overriding where migration definitions are read from.
pub const MIGRATIONS_DIR_ENV: &str = "FOLDERDB_MIGRATIONS_DIR";

/// Environment variable selecting the identifier strategy (`uuid`, `ulid`, `nanoid`).
pub const ID_STRATEGY_ENV: &str = "FOLDERDB_ID_STRATEGY";

pub const DEFAULT_MIGRATIONS_DIR: &str = "migrations";

/// Settings applied when a database is opened.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    pub migrations_dir: PathBuf,
    pub id_strategy: AutoIdStrategy,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            migrations_dir: PathBuf::from(DEFAULT_MIGRATIONS_DIR),
            id_strategy: AutoIdStrategy::default(),
        }
    }
}

impl DatabaseConfig {
    /// Build a config from the process environment, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = DatabaseConfig::default();

        if let Some(dir) = lookup(MIGRATIONS_DIR_ENV).filter(|d| !d.trim().is_empty()) {
            config.migrations_dir = PathBuf::from(dir);
        }

        if let Some(raw) = lookup(ID_STRATEGY_ENV) {
            match raw.parse() {
                Ok(strategy) => config.id_strategy = strategy,
                Err(e) => log::warn!("Ignoring {ID_STRATEGY_ENV}: {e}"),
            }
        }

        config
    }

    pub fn with_migrations_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.migrations_dir = dir.into();
        self
    }

    pub fn with_id_strategy(mut self, strategy: AutoIdStrategy) -> Self {
        self.id_strategy = strategy;
        self
    }
}
