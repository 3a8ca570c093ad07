//! Errors surfaced by measurement stores.

use thiserror::Error;

/// Failure of the underlying persistence medium.
///
/// Queries that match nothing are not errors; they yield an empty stream.
/// The store never retries on its own, retry policy belongs to the caller.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    /// The storage engine could not be reached, read or written.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl StoreError {
    /// Wraps an engine error with a short description of the failed step.
    pub fn unavailable(context: &str, err: impl std::fmt::Display) -> Self {
        StoreError::StorageUnavailable(format!("{}: {}", context, err))
    }
}

impl From<duckdb::Error> for StoreError {
    fn from(err: duckdb::Error) -> Self {
        StoreError::StorageUnavailable(err.to_string())
    }
}
