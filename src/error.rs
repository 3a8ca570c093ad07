//! Errors surfaced by the ingestion and query surface.

use crate::ingest::ValidationError;
use geosense_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The caller sent something that cannot be stored or queried.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The store failed; nothing from the failed call was persisted.
    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
