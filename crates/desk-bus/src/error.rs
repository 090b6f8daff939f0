//! Error types for desk-bus.

use desk_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type BusResult<T> = std::result::Result<T, BusError>;
