//! Error types for desk-engine.

use desk_net::NetError;
use desk_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Network error: {0}")]
    Net(#[from] NetError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
