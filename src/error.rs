use thiserror::Error;

/// Reasons an allocation cannot be computed. No partial result is produced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AllocationError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("card '{card}' has invalid data: {reason}")]
    DataIntegrity { card: String, reason: String },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("not signed in")]
    Unauthenticated,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("a user with email '{0}' already exists")]
    UserExists(String),
    #[error("{0} not found")]
    NotFound(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Top-level error for the binaries.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Allocation(#[from] AllocationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Usage(String),
}
