//! Orchestration cycle records.
//!
//! Every cycle tick produces an immutable `CycleSnapshot`; the history is an
//! append-only sequence used for trend derivation and never mutated after
//! creation. `ResourceAllocation` is ephemeral, recomputed per coordination
//! cycle and distributed only as an event payload.

use crate::market::MarketClass;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The three independently scheduled periodic cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleType {
    Coordination,
    Adaptation,
    Innovation,
}

impl fmt::Display for CycleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleType::Coordination => f.write_str("coordination"),
            CycleType::Adaptation => f.write_str("adaptation"),
            CycleType::Innovation => f.write_str("innovation"),
        }
    }
}

/// Aggregate system metrics derived at a cycle tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DerivedMetrics {
    /// Streams currently active on the scheduler.
    pub active_streams: usize,
    /// Shared error budget counter at snapshot time.
    pub stream_errors: u32,
    /// Events published since process start.
    pub events_published: u64,
    /// Regime changes observed since process start.
    pub regime_changes: u64,
    /// 0.0..=1.0 composite health score (stream liveness x data freshness).
    pub stream_health: f64,
}

/// Immutable record produced once per cycle tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleSnapshot {
    pub cycle: CycleType,
    pub timestamp: DateTime<Utc>,
    pub metrics: DerivedMetrics,
}

impl CycleSnapshot {
    pub fn new(cycle: CycleType, metrics: DerivedMetrics) -> Self {
        Self {
            cycle,
            timestamp: Utc::now(),
            metrics,
        }
    }
}

/// Per-class share of polling attention, 0.0..=1.0, summing to 1.0 across
/// classes when any stream is active.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShareByClass(pub BTreeMap<MarketClass, f64>);

impl ShareByClass {
    pub fn get(&self, class: MarketClass) -> f64 {
        self.0.get(&class).copied().unwrap_or(0.0)
    }
}

/// Resource-allocation proposal computed by the coordination cycle from the
/// latest cycle snapshot and the current stream handle set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceAllocation {
    pub proposed_at: DateTime<Utc>,
    pub shares: ShareByClass,
    /// Health score the proposal was derived from.
    pub derived_from_health: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_share_lookup_defaults_to_zero() {
        let shares = ShareByClass::default();
        assert_eq!(shares.get(MarketClass::Crypto), 0.0);
    }

    #[test]
    fn test_cycle_snapshot_carries_metrics() {
        let snap = CycleSnapshot::new(
            CycleType::Coordination,
            DerivedMetrics {
                active_streams: 4,
                stream_health: 0.95,
                ..Default::default()
            },
        );
        assert_eq!(snap.cycle, CycleType::Coordination);
        assert_eq!(snap.metrics.active_streams, 4);
    }
}
