//! Service configuration.
//!
//! Loaded from a TOML file; every section and field has a default so a
//! missing file still yields a runnable offline configuration (memory
//! store, synthetic market data).

use crate::error::{AppError, AppResult};
use desk_engine::EngineConfig;
use desk_net::{ApiConfig, MonitorConfig, RetryConfig};
use desk_store::RestConfig;
use desk_stream::StreamConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_probe_url() -> String {
    "http://localhost:8000/health".to_string()
}

fn default_debounce_ms() -> u64 {
    30_000
}

fn default_probe_timeout_ms() -> u64 {
    5_000
}

fn default_agent_liveness_secs() -> u64 {
    300
}

/// Live control API and probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_probe_url")]
    pub probe_url: String,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            probe_url: default_probe_url(),
            debounce_ms: default_debounce_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl ApiSection {
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            probe_url: self.probe_url.clone(),
            debounce_ms: self.debounce_ms,
            probe_timeout_ms: self.probe_timeout_ms,
        }
    }

    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            base_url: self.base_url.clone(),
        }
    }
}

/// Durable store selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Rest,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSection {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Required when `backend = "rest"`.
    #[serde(default)]
    pub rest: Option<RestConfig>,
}

/// Market data source selection for the stream scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketSource {
    #[default]
    Synthetic,
    Rest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSection {
    #[serde(default)]
    pub source: MarketSource,
    /// Base URL for the REST market data source.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Seed for the synthetic walk; random when unset.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for DataSection {
    fn default() -> Self {
        Self {
            source: MarketSource::default(),
            base_url: default_base_url(),
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiSection,
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub data: DataSection,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    /// Heartbeat age after which an agent counts as dead.
    #[serde(default = "default_agent_liveness_secs")]
    pub agent_liveness_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiSection::default(),
            store: StoreSection::default(),
            data: DataSection::default(),
            retry: RetryConfig::default(),
            stream: StreamConfig::default(),
            engine: EngineConfig::default(),
            agent_liveness_secs: default_agent_liveness_secs(),
        }
    }
}

impl AppConfig {
    pub fn from_file(path: &Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {}: {e}", path.display()))
        })?;
        let config: AppConfig = toml::from_str(&raw).map_err(|e| {
            AppError::Config(format!(
                "Failed to parse config file {}: {e}",
                path.display()
            ))
        })?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_is_runnable_offline() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.data.source, MarketSource::Synthetic);
        assert_eq!(config.api.debounce_ms, 30_000);
        assert_eq!(config.api.probe_timeout_ms, 5_000);
        assert_eq!(config.agent_liveness_secs, 300);
    }

    #[test]
    fn test_partial_override() {
        let config: AppConfig = toml::from_str(
            r#"
            [api]
            base_url = "https://api.example.com"

            [store]
            backend = "rest"

            [store.rest]
            base_url = "https://db.example.com/rest/v1"
            api_key = "key"

            [engine]
            adaptation_interval_ms = 1000
            "#,
        )
        .unwrap();
        assert_eq!(config.api.base_url, "https://api.example.com");
        assert_eq!(config.api.probe_url, default_probe_url());
        assert_eq!(config.store.backend, StoreBackend::Rest);
        assert_eq!(config.engine.adaptation_interval_ms, 1_000);
        assert_eq!(config.engine.coordination_interval_ms, 10_000);
    }
}
