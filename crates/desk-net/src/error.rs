//! Error types for desk-net.

use desk_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Critical action failed on both paths: {0}")]
    CriticalAction(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<reqwest::Error> for NetError {
    fn from(err: reqwest::Error) -> Self {
        NetError::Request(err.to_string())
    }
}

pub type NetResult<T> = std::result::Result<T, NetError>;
