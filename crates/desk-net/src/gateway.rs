//! Control-plane API gateway.
//!
//! Every read resolves through the connectivity monitor: live mode calls the
//! API with the retrying executor, fallback mode (or a failed live call)
//! serves from the durable store. Results carry a provenance tag so callers
//! can surface data freshness instead of silently mixing sources.

use crate::client::ResilientClient;
use crate::error::{NetError, NetResult};
use crate::monitor::ConnectivityMonitor;
use chrono::{DateTime, Utc};
use desk_core::{AgentRecord, DataSource, EventRecord, Regime};
use desk_store::{EventFilter, KillswitchState, StateStore};
use desk_telemetry::Metrics;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Store key holding the durable kill-switch record.
pub const KILLSWITCH_STATE_KEY: &str = "killswitch_status";
/// Store key holding the last known regime.
pub const REGIME_STATE_KEY: &str = "regime_state";

/// A resolved value tagged with where it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sourced<T> {
    pub data: T,
    pub source: DataSource,
}

impl<T> Sourced<T> {
    pub fn api(data: T) -> Self {
        Self {
            data,
            source: DataSource::Api,
        }
    }

    pub fn fallback(data: T) -> Self {
        Self {
            data,
            source: DataSource::Fallback,
        }
    }
}

/// Regime document served by the API or the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeState {
    pub regime: Regime,
    pub confidence: f64,
    pub updated_at: DateTime<Utc>,
}

impl Default for RegimeState {
    fn default() -> Self {
        Self {
            regime: Regime::Quiet,
            confidence: 0.0,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Serialize)]
struct KillswitchRequest<'a> {
    reason: &'a str,
    triggered_by: &'a str,
}

/// Gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the live control API.
    pub base_url: String,
}

pub struct ControlApi {
    monitor: Arc<ConnectivityMonitor>,
    client: ResilientClient,
    store: Arc<dyn StateStore>,
    base_url: String,
}

impl ControlApi {
    pub fn new(
        monitor: Arc<ConnectivityMonitor>,
        client: ResilientClient,
        store: Arc<dyn StateStore>,
        config: ApiConfig,
    ) -> Self {
        Self {
            monitor,
            client,
            store,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// All agent rows with liveness fields, freshest heartbeat first.
    pub async fn agents_health(&self) -> NetResult<Sourced<Vec<AgentRecord>>> {
        if self.monitor.ensure_connection().await {
            let url = self.endpoint("agents/health");
            match self.client.get_json::<Vec<AgentRecord>>(&url).await {
                Ok(agents) => {
                    Metrics::query_source("api");
                    return Ok(Sourced::api(agents));
                }
                Err(err) => {
                    warn!(error = %err, "Live agents query failed, using fallback store");
                }
            }
        }
        let agents = self.store.fetch_agents().await?;
        Metrics::query_source("fallback");
        Ok(Sourced::fallback(agents))
    }

    /// Durable event log read, cursor-paginated.
    pub async fn bus_events(&self, filter: &EventFilter) -> NetResult<Sourced<Vec<EventRecord>>> {
        if self.monitor.ensure_connection().await {
            let url = self.endpoint("events");
            let mut query: Vec<(&str, String)> = Vec::new();
            if let Some(since) = filter.since_seq {
                query.push(("since_seq", since.to_string()));
            }
            if let Some(event_type) = &filter.event_type {
                query.push(("event_type", event_type.clone()));
            }
            if let Some(limit) = filter.limit {
                query.push(("limit", limit.to_string()));
            }
            match self
                .client
                .get_json_query::<Vec<EventRecord>, _>(&url, &query)
                .await
            {
                Ok(events) => {
                    Metrics::query_source("api");
                    return Ok(Sourced::api(events));
                }
                Err(err) => {
                    warn!(error = %err, "Live events query failed, using fallback store");
                }
            }
        }
        let events = self.store.fetch_events(filter).await?;
        Metrics::query_source("fallback");
        Ok(Sourced::fallback(events))
    }

    /// Current market regime. A missing record on both paths resolves to
    /// the quiet default rather than an error.
    pub async fn regime_state(&self) -> NetResult<Sourced<RegimeState>> {
        if self.monitor.ensure_connection().await {
            let url = self.endpoint("regime/current");
            match self.client.get_json::<RegimeState>(&url).await {
                Ok(state) => {
                    Metrics::query_source("api");
                    return Ok(Sourced::api(state));
                }
                Err(err) => {
                    warn!(error = %err, "Live regime query failed, using fallback store");
                }
            }
        }
        let state = match self.store.get_state(REGIME_STATE_KEY).await? {
            Some(value) => serde_json::from_value(value)?,
            None => RegimeState::default(),
        };
        Metrics::query_source("fallback");
        Ok(Sourced::fallback(state))
    }

    /// Engage the kill switch.
    ///
    /// The live call is made exactly once; a timeout is ambiguous and must
    /// not be retried. If the live path fails, the engaged state is written
    /// durably to the store so the action is never silently lost. Errors
    /// only when both paths fail.
    pub async fn activate_killswitch(
        &self,
        reason: &str,
        triggered_by: &str,
    ) -> NetResult<Sourced<KillswitchState>> {
        if reason.trim().is_empty() {
            return Err(NetError::InvalidRequest(
                "kill switch requires a non-empty reason".into(),
            ));
        }

        let request = KillswitchRequest {
            reason,
            triggered_by,
        };

        if self.monitor.ensure_connection().await {
            let url = self.endpoint("killswitch/activate");
            match self
                .client
                .post_json_once::<KillswitchState, _>(&url, &request)
                .await
            {
                Ok(state) => {
                    info!(reason, triggered_by, "Kill switch engaged via live API");
                    return Ok(Sourced::api(state));
                }
                Err(err) => {
                    error!(error = %err, "Live kill switch call failed, writing durable record");
                }
            }
        }

        let state = KillswitchState {
            enabled: true,
            reason: reason.to_string(),
            timestamp: Utc::now(),
            triggered_by: triggered_by.to_string(),
        };
        let value = serde_json::to_value(&state)?;
        self.store
            .put_state(KILLSWITCH_STATE_KEY, value)
            .await
            .map_err(|e| {
                NetError::CriticalAction(format!(
                    "kill switch unconfirmed: live call failed and durable write failed: {e}"
                ))
            })?;
        info!(reason, triggered_by, "Kill switch engaged via durable store");
        Ok(Sourced::fallback(state))
    }

    /// Current kill-switch record, if one was ever written.
    pub async fn killswitch_state(&self) -> NetResult<Option<KillswitchState>> {
        match self.store.get_state(KILLSWITCH_STATE_KEY).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RetryConfig;
    use crate::monitor::MonitorConfig;
    use desk_store::MemoryStore;

    fn offline_gateway(store: Arc<MemoryStore>) -> ControlApi {
        let monitor = Arc::new(
            ConnectivityMonitor::new(MonitorConfig {
                probe_url: "http://127.0.0.1:1/health".into(),
                debounce_ms: 60_000,
                probe_timeout_ms: 100,
            })
            .unwrap(),
        );
        monitor.set_force_offline(true);
        let client = ResilientClient::new(RetryConfig::default()).unwrap();
        ControlApi::new(
            monitor,
            client,
            store,
            ApiConfig {
                base_url: "http://127.0.0.1:1".into(),
            },
        )
    }

    #[tokio::test]
    async fn test_killswitch_falls_back_to_durable_write() {
        let store = Arc::new(MemoryStore::new());
        let gateway = offline_gateway(store.clone());

        let result = gateway
            .activate_killswitch("drawdown limit breached", "risk_desk")
            .await
            .unwrap();
        assert_eq!(result.source, DataSource::Fallback);
        assert!(result.data.enabled);
        assert_eq!(result.data.triggered_by, "risk_desk");

        let persisted = gateway.killswitch_state().await.unwrap().unwrap();
        assert_eq!(persisted.reason, "drawdown limit breached");
    }

    #[tokio::test]
    async fn test_killswitch_rejects_empty_reason() {
        let store = Arc::new(MemoryStore::new());
        let gateway = offline_gateway(store);
        let result = gateway.activate_killswitch("  ", "risk_desk").await;
        assert!(matches!(result, Err(NetError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_regime_defaults_to_quiet_when_missing() {
        let store = Arc::new(MemoryStore::new());
        let gateway = offline_gateway(store);
        let state = gateway.regime_state().await.unwrap();
        assert_eq!(state.source, DataSource::Fallback);
        assert_eq!(state.data.regime, Regime::Quiet);
    }

    #[tokio::test]
    async fn test_agents_served_from_store_in_fallback() {
        let store = Arc::new(MemoryStore::new());
        store.seed_agents(vec![AgentRecord {
            id: "agent-1".into(),
            name: "Ingestion Agent".into(),
            group: desk_core::AgentGroup::Ingestion,
            status: "active".into(),
            last_beat: Some(Utc::now()),
            last_error: None,
        }]);
        let gateway = offline_gateway(store);
        let agents = gateway.agents_health().await.unwrap();
        assert_eq!(agents.source, DataSource::Fallback);
        assert_eq!(agents.data.len(), 1);
    }
}
