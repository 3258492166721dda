//! Storage error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Preference {name} has non-boolean value: {value}")]
    TypeMismatch { name: String, value: String },
}
