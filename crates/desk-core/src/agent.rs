//! Downstream consumer ("agent") identities.
//!
//! The orchestration layer's only obligations to consumers: publish typed
//! events with a stable schema, allow per-group configuration documents to
//! be fetched/updated, and never block on a consumer's absence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Consumer group. Group membership selects which configuration document
/// applies to an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentGroup {
    Ingestion,
    Signals,
    Execution,
    Orchestration,
}

impl AgentGroup {
    pub const ALL: [AgentGroup; 4] = [
        AgentGroup::Ingestion,
        AgentGroup::Signals,
        AgentGroup::Execution,
        AgentGroup::Orchestration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentGroup::Ingestion => "ingestion",
            AgentGroup::Signals => "signals",
            AgentGroup::Execution => "execution",
            AgentGroup::Orchestration => "orchestration",
        }
    }
}

impl fmt::Display for AgentGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Agent row as served by the live API or the durable store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: String,
    pub name: String,
    pub group: AgentGroup,
    pub status: String,
    #[serde(default)]
    pub last_beat: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl AgentRecord {
    /// Liveness derived from the last heartbeat.
    pub fn is_alive(&self, threshold: chrono::Duration) -> bool {
        match self.last_beat {
            Some(beat) => Utc::now().signed_duration_since(beat) <= threshold,
            None => false,
        }
    }

    /// Seconds since the last heartbeat, if any heartbeat was seen.
    pub fn seconds_since_beat(&self) -> Option<i64> {
        self.last_beat
            .map(|beat| Utc::now().signed_duration_since(beat).num_seconds())
    }
}
