//! Datasource-specific error types.

use thiserror::Error;

/// Result type for datasource operations.
pub type DatasourceResult<T> = Result<T, DatasourceError>;

/// Errors raised while collecting join statistics or scanning a schema.
#[derive(Error, Debug)]
pub enum DatasourceError {
    /// The statistics query failed in the database.
    #[error("query failed: {0}")]
    Query(#[from] rusqlite::Error),

    /// The blocking query task panicked or was aborted.
    #[error("query task failed: {0}")]
    Task(String),

    /// The run was cancelled while the query was in flight.
    #[error("join analysis cancelled")]
    Cancelled,

    /// A referenced table or column does not exist in the datasource.
    #[error("unknown object: {0}")]
    UnknownObject(String),

    /// Unsupported driver in configuration.
    #[error("unsupported datasource driver: {0}")]
    UnsupportedDriver(String),
}

impl DatasourceError {
    /// Check if this error is a cancellation rather than a query failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
            || matches!(
                self,
                Self::Query(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == rusqlite::ErrorCode::OperationInterrupted
            )
    }
}

impl From<tokio::task::JoinError> for DatasourceError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}
