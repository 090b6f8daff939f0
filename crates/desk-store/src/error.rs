//! Error types for desk-store.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Record not found: {0}")]
    NotFound(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::HttpClient(err.to_string())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
