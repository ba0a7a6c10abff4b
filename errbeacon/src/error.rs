//! Error types for errbeacon

use thiserror::Error;

use crate::transport::TransportError;

/// Main error type for the errbeacon library
#[derive(Error, Debug)]
pub enum Error {
    /// Session store database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport setup or dispatch error
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Session store error not covered by the database variant
    #[error("store error: {0}")]
    Store(String),
}

/// Result type alias for errbeacon
pub type Result<T> = std::result::Result<T, Error>;
