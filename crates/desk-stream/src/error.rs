//! Error types for desk-stream.

use desk_net::NetError;
use desk_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Network error: {0}")]
    Net(#[from] NetError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type StreamResult<T> = std::result::Result<T, StreamError>;
