//! Error types for the orchestrator service.

use desk_net::NetError;
use desk_store::StoreError;
use desk_stream::StreamError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Net(#[from] NetError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = std::result::Result<T, AppError>;
