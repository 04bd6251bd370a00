//! Error types for Hearth.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input to the store or a tool (empty required field,
    /// embedding dimension mismatch). Never retried automatically.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(String),

    /// Embedding provider failure (empty input, transport, empty response).
    #[error("Provider error: {0}")]
    Provider(String),

    /// Tool-call arguments failed validation against the declared schema.
    #[error("Schema error: {0}")]
    Schema(String),

    /// Generative model transport failure. Aborts the whole request.
    #[error("Generation error: {0}")]
    Generation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
