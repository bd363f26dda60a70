//! Error types for the LSIF dump store.

/// Top-level error enum for the LSIF dump store.
#[derive(Debug, thiserror::Error)]
pub enum LsifError {
    /// No dump file exists for the requested repository and commit.
    #[error("No LSIF data available for {repository}@{commit}.")]
    NoData { repository: String, commit: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Result set cycle detected at {id}")]
    ResultSetCycle { id: String },

    #[error("Corrupt filter: {0}")]
    CorruptFilter(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LsifError {
    pub fn no_data(repository: &str, commit: &str) -> Self {
        Self::NoData {
            repository: repository.to_string(),
            commit: commit.to_string(),
        }
    }

    /// True when the error means "not indexed" rather than a service fault.
    pub fn is_no_data(&self) -> bool {
        matches!(self, Self::NoData { .. })
    }
}

impl From<tempfile::PathPersistError> for LsifError {
    fn from(err: tempfile::PathPersistError) -> Self {
        Self::Io(err.error)
    }
}

pub type LsifResult<T> = Result<T, LsifError>;
