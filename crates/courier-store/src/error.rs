use thiserror::Error;

use courier_shared::IdError;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A lookup expected a live (non-deleted) record but found none.
    #[error("Record not found")]
    NotFound,

    /// A uniqueness rule would be violated (duplicate identity or relationship).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// A stored identifier could not be parsed.
    #[error("Invalid id: {0}")]
    InvalidId(#[from] IdError),

    /// Input rejected by the store itself.
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
