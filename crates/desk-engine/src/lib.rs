//! Orchestration cycle engine.
//!
//! Periodic coordination, adaptation, and innovation cycles over the
//! stream scheduler, the event bus, and the control API. See [`CycleEngine`].

pub mod allocation;
pub mod config;
pub mod engine;
pub mod error;
pub mod patterns;

pub use config::EngineConfig;
pub use engine::CycleEngine;
pub use error::{EngineError, EngineResult};
