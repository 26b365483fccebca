use thiserror::Error;

#[derive(Error, Debug)]
pub enum FolderDbError {
    #[error("{table} - table does not exist")]
    TableNotFound { table: String },

    #[error("{id} does not exist")]
    RecordNotFound { table: String, id: String },

    #[error("{id} already exists")]
    RecordAlreadyExists { table: String, id: String },

    #[error("{}", invalid_columns_message(.0))]
    InvalidColumns(Vec<String>),

    #[error("Invalid {kind} name: '{name}'")]
    InvalidName { kind: &'static str, name: String },

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("{0}")]
    Migration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{0}")]
    Other(String),
}

impl FolderDbError {
    /// True for the missing-table and missing-record conditions.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            FolderDbError::TableNotFound { .. } | FolderDbError::RecordNotFound { .. }
        )
    }

    /// True for errors a caller can recover from by changing its input.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            FolderDbError::TableNotFound { .. }
                | FolderDbError::RecordNotFound { .. }
                | FolderDbError::RecordAlreadyExists { .. }
                | FolderDbError::InvalidColumns(_)
                | FolderDbError::InvalidName { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FolderDbError>;

fn invalid_columns_message(columns: &[String]) -> String {
    let suffix = if columns.len() > 1 { "s" } else { "" };
    format!("Invalid column{suffix} - {}", columns.join(", "))
}
