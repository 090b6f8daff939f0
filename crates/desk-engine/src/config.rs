//! Cycle engine configuration.

use serde::{Deserialize, Serialize};

const DEFAULT_COORDINATION_INTERVAL_MS: u64 = 10_000;
const DEFAULT_ADAPTATION_INTERVAL_MS: u64 = 5_000;
const DEFAULT_INNOVATION_INTERVAL_MS: u64 = 30_000;
/// Pattern candidates below this confidence are never published.
const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_coordination_interval_ms")]
    pub coordination_interval_ms: u64,
    #[serde(default = "default_adaptation_interval_ms")]
    pub adaptation_interval_ms: u64,
    #[serde(default = "default_innovation_interval_ms")]
    pub innovation_interval_ms: u64,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
}

fn default_coordination_interval_ms() -> u64 {
    DEFAULT_COORDINATION_INTERVAL_MS
}

fn default_adaptation_interval_ms() -> u64 {
    DEFAULT_ADAPTATION_INTERVAL_MS
}

fn default_innovation_interval_ms() -> u64 {
    DEFAULT_INNOVATION_INTERVAL_MS
}

fn default_confidence_threshold() -> f64 {
    DEFAULT_CONFIDENCE_THRESHOLD
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            coordination_interval_ms: default_coordination_interval_ms(),
            adaptation_interval_ms: default_adaptation_interval_ms(),
            innovation_interval_ms: default_innovation_interval_ms(),
            confidence_threshold: default_confidence_threshold(),
        }
    }
}
