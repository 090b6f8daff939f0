//! Event bus schema.
//!
//! Events are append-only records with source/target/priority. The payload
//! is a closed set of tagged variants so consumers dispatch exhaustively
//! instead of parsing free-form JSON blobs. `processed` is the only mutable
//! field, flipped by a consumer acknowledgment.

use crate::cycle::ResourceAllocation;
use crate::market::{MarketClass, Regime, Timeframe};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Advisory delivery priority. The bus never reorders by priority; delivery
/// is FIFO by creation sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Low => f.write_str("low"),
            Priority::Medium => f.write_str("medium"),
            Priority::High => f.write_str("high"),
            Priority::Critical => f.write_str("critical"),
        }
    }
}

/// One candidate surfaced by the innovation cycle's pattern scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternCandidate {
    pub kind: PatternKind,
    /// Classes involved, e.g. the two legs of a correlation.
    pub classes: Vec<MarketClass>,
    /// Confidence score, 0.0..=1.0. Only candidates above the configured
    /// threshold are ever published.
    pub confidence: f64,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Correlation,
    Anomaly,
    Divergence,
}

/// Closed set of event payloads carried on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Primary API probe failed while previously live.
    ApiFailure { error: String },
    /// Primary API probe succeeded while previously in fallback.
    ApiRecovery,
    /// Stream scheduler activated its polling loops.
    StreamActivated {
        classes: Vec<MarketClass>,
        total_symbols: usize,
        timeframes: Vec<Timeframe>,
    },
    /// Stream scheduler deactivated (manual stop or error budget trip).
    StreamDeactivated { reason: String },
    /// Composite dataset assembled and persisted.
    DatasetAssembled {
        dataset_id: String,
        classes: Vec<MarketClass>,
        completeness: f64,
    },
    /// Innovation cycle found candidates above the confidence threshold.
    PatternDiscovery { candidates: Vec<PatternCandidate> },
    /// Adaptation cycle observed a regime change.
    Adaptation { regime: Regime, total_changes: u64 },
    /// Coordination cycle proposed a resource allocation.
    ResourceAllocation { allocation: ResourceAllocation },
    /// Kill-switch engaged, either via the live API or the durable store.
    KillswitchEngaged { reason: String, triggered_by: String },
    /// Consumer agent status change.
    AgentStatus { agent_id: String, status: String },
}

impl EventPayload {
    /// Stable discriminant used for subscription filters and durable-log
    /// type columns.
    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::ApiFailure { .. } => "api_failure",
            EventPayload::ApiRecovery => "api_recovery",
            EventPayload::StreamActivated { .. } => "stream_activated",
            EventPayload::StreamDeactivated { .. } => "stream_deactivated",
            EventPayload::DatasetAssembled { .. } => "dataset_assembled",
            EventPayload::PatternDiscovery { .. } => "pattern_discovery",
            EventPayload::Adaptation { .. } => "adaptation",
            EventPayload::ResourceAllocation { .. } => "resource_allocation",
            EventPayload::KillswitchEngaged { .. } => "killswitch_engaged",
            EventPayload::AgentStatus { .. } => "agent_status",
        }
    }
}

/// Append-only event record.
///
/// Ordering: totally ordered by `seq` per publishing process. Consumers may
/// process out of order but must not lose records (at-least-once delivery);
/// handlers are expected to be idempotent keyed by `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: Uuid,
    /// Monotonic creation sequence assigned by the bus.
    pub seq: u64,
    pub source: String,
    /// `None` means broadcast to every consumer.
    pub target: Option<String>,
    pub payload: EventPayload,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    /// Set by consumer acknowledgment; the only mutable field.
    pub processed: bool,
}

impl EventRecord {
    /// Event type discriminant, mirroring `EventPayload::kind`.
    pub fn event_type(&self) -> &'static str {
        self.payload.kind()
    }

    /// Whether this record is a broadcast (no specific target).
    pub fn is_broadcast(&self) -> bool {
        self.target.is_none()
    }
}
