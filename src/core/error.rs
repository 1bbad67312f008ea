use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Key '{key}' not found for model '{type_name}'")]
    NotFound { key: String, type_name: String },

    #[error("Model type '{0}' is not registered")]
    UnregisteredType(String),

    #[error("Malformed relationship: {0}")]
    MalformedRelationship(String),

    #[error(
        "Cannot save relationship '{field}': related '{type_name}' has no id. Save the related model first"
    )]
    UnsavedReference { field: String, type_name: String },

    #[error(
        "Transaction finished executing but {waiting} callback(s) were still waiting on data that was never sent (dependency cycle or missing publish). Pending data: {pending_keys:?}"
    )]
    DependencyDeadlock {
        waiting: usize,
        pending_keys: Vec<String>,
    },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl DbError {
    pub fn not_found(key: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::NotFound {
            key: key.into(),
            type_name: type_name.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

impl<T> From<std::sync::PoisonError<T>> for DbError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        Self::TypeMismatch(err.to_string())
    }
}
