//! Market data stream scheduler.
//!
//! Polls each market class on its own cadence, guards the whole fleet with
//! a shared error budget, and periodically assembles the per-class
//! snapshots plus derived indicators into a composite dataset published on
//! the bus and persisted for consumers.

pub mod calendar;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod indicators;
pub mod scheduler;

pub use config::{ClassConfig, StreamConfig};
pub use error::{StreamError, StreamResult};
pub use fetcher::{MarketDataFetcher, RestFetcher, SyntheticFetcher};
pub use indicators::IndicatorTracker;
pub use scheduler::{StreamScheduler, StreamStatus};
