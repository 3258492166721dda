//! Descript Storage Layer
//!
//! SQLite-backed preferences. Each preference has an optional default value
//! and an optional user value; reads return the user value when present.
//! Writers notify observers registered on the preference name.

mod database;
mod error;
mod migrations;
mod preferences;

pub use database::Database;
pub use error::StorageError;
pub use preferences::{ObserverId, Preferences};

pub type Result<T> = std::result::Result<T, StorageError>;
