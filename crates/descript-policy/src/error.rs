//! Policy error types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}
