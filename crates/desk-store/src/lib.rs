//! Durable fallback store boundary.
//!
//! The store backs every query when the primary API is unreachable and is
//! the durable append-only log for out-of-process event consumers. Two
//! implementations: `RestStore` speaks PostgREST-style HTTP to a hosted
//! database, `MemoryStore` serves tests and fully offline operation.

pub mod error;
pub mod memory;
pub mod rest;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use desk_core::{AgentGroup, AgentRecord, CompositeDataset, EventRecord};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use rest::{RestConfig, RestStore};

/// Cursor filter for the durable event log.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Only events with `seq` strictly greater than this.
    pub since_seq: Option<u64>,
    /// Only events of this type discriminant.
    pub event_type: Option<String>,
    /// Maximum records returned, newest last.
    pub limit: Option<usize>,
}

/// Kill-switch state persisted under the `killswitch_status` key when the
/// live API path is unavailable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KillswitchState {
    pub enabled: bool,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    pub triggered_by: String,
}

/// Durable store operations used by the orchestration layer.
///
/// Every operation is a single idempotent read or a single append; no
/// multi-step consistency is required of implementations.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Fetch all agent rows, most recent heartbeat first.
    async fn fetch_agents(&self) -> StoreResult<Vec<AgentRecord>>;

    /// Append one event to the durable log.
    async fn append_event(&self, event: &EventRecord) -> StoreResult<()>;

    /// Fetch events matching the filter, ordered by sequence.
    async fn fetch_events(&self, filter: &EventFilter) -> StoreResult<Vec<EventRecord>>;

    /// Mark an event processed (consumer acknowledgment).
    async fn mark_processed(&self, id: Uuid) -> StoreResult<()>;

    /// Upsert a key in the orchestrator key-value state table.
    async fn put_state(&self, key: &str, value: serde_json::Value) -> StoreResult<()>;

    /// Read a key from the orchestrator key-value state table.
    async fn get_state(&self, key: &str) -> StoreResult<Option<serde_json::Value>>;

    /// Persist one composite dataset keyed by its generated stream id.
    async fn put_dataset(&self, dataset: &CompositeDataset) -> StoreResult<()>;

    /// Fetch the most recent composite datasets, newest first.
    async fn recent_datasets(&self, limit: usize) -> StoreResult<Vec<CompositeDataset>>;

    /// Fetch the configuration document for a consumer group.
    async fn group_config(&self, group: AgentGroup) -> StoreResult<Option<serde_json::Value>>;

    /// Replace the configuration document for a consumer group.
    async fn update_group_config(
        &self,
        group: AgentGroup,
        config: serde_json::Value,
    ) -> StoreResult<()>;
}
