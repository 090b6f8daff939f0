//! Data orchestration service for the desk dashboard.
//!
//! Wires the connectivity monitor, resilient API gateway, event bus,
//! market stream scheduler, and cycle engine into one lifecycle:
//! - Connectivity transitions become bus events
//! - Streams poll each market class on its own cadence
//! - Cycles derive metrics, track regimes, and scan for patterns

pub mod app;
pub mod config;
pub mod error;

pub use app::{Orchestrator, OrchestratorStatus};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
