//! Core domain types for the desk orchestration layer.
//!
//! This crate provides the fundamental types shared across the system:
//! - `MarketClass`, `Timeframe`: partitioning of instruments and bar sizes
//! - `EventRecord`, `EventPayload`: the closed event schema on the bus
//! - `ClassSnapshot`, `CompositeDataset`: per-tick market data aggregates
//! - `CycleSnapshot`, `ResourceAllocation`: orchestration cycle outputs
//! - `AgentRecord`, `AgentGroup`: downstream consumer identities

pub mod agent;
pub mod cycle;
pub mod error;
pub mod event;
pub mod market;

pub use agent::{AgentGroup, AgentRecord};
pub use cycle::{CycleSnapshot, CycleType, DerivedMetrics, ResourceAllocation, ShareByClass};
pub use error::{CoreError, Result};
pub use event::{EventPayload, EventRecord, PatternCandidate, PatternKind, Priority};
pub use market::{
    ClassSnapshot, CompositeDataset, ConnectionMode, DataSource, DerivedIndicators, MarketClass,
    Quote, Regime, Timeframe,
};
