//! Error types for desk-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Unknown market class: {0}")]
    UnknownMarketClass(String),

    #[error("Unknown timeframe: {0}")]
    UnknownTimeframe(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
