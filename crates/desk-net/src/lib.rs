//! Connectivity and resilient API access.
//!
//! Three pieces: the [`ConnectivityMonitor`] decides live-vs-fallback with
//! debounced health probes, the [`ResilientClient`] wraps HTTP calls in a
//! bounded retry policy, and the [`ControlApi`] gateway resolves every
//! control-plane query through both, tagging results with provenance.

pub mod client;
pub mod error;
pub mod gateway;
pub mod monitor;

pub use client::{ResilientClient, RetryConfig};
pub use error::{NetError, NetResult};
pub use gateway::{ApiConfig, ControlApi, RegimeState, Sourced};
pub use monitor::{ConnectivityMonitor, ModeTransition, MonitorConfig};
