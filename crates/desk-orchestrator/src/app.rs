//! Service wiring and lifecycle.
//!
//! `Orchestrator::new` builds the component graph from configuration;
//! `start`/`stop` bracket the running state. Connectivity transitions are
//! forwarded onto the bus here so the monitor stays free of bus concerns.

use crate::config::{AppConfig, MarketSource, StoreBackend};
use crate::error::{AppError, AppResult};
use chrono::Utc;
use desk_bus::EventBus;
use desk_core::{
    AgentGroup, AgentRecord, ConnectionMode, EventPayload, MarketClass, Priority,
};
use desk_engine::CycleEngine;
use desk_net::{ConnectivityMonitor, ControlApi, ResilientClient, Sourced};
use desk_store::{KillswitchState, MemoryStore, RestStore, StateStore};
use desk_stream::{
    MarketDataFetcher, RestFetcher, StreamScheduler, StreamStatus, SyntheticFetcher,
};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Event source name for lifecycle events published by the service itself.
const SOURCE: &str = "orchestrator";

/// Introspection document served to operators.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatus {
    pub mode: ConnectionMode,
    pub stream: StreamStatus,
    pub engine_running: bool,
    pub events_published: u64,
    pub regime_changes: u64,
}

pub struct Orchestrator {
    config: AppConfig,
    store: Arc<dyn StateStore>,
    monitor: Arc<ConnectivityMonitor>,
    gateway: Arc<ControlApi>,
    bus: Arc<EventBus>,
    scheduler: Arc<StreamScheduler>,
    engine: Arc<CycleEngine>,
    shutdown: CancellationToken,
}

impl Orchestrator {
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let store: Arc<dyn StateStore> = match config.store.backend {
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
            StoreBackend::Rest => {
                let Some(rest) = config.store.rest.clone() else {
                    return Err(AppError::Config(
                        "store.backend = \"rest\" requires a [store.rest] section".into(),
                    ));
                };
                Arc::new(RestStore::new(rest)?)
            }
        };

        let monitor = Arc::new(ConnectivityMonitor::new(config.api.monitor_config())?);
        let client = ResilientClient::new(config.retry.clone())?;
        let gateway = Arc::new(ControlApi::new(
            monitor.clone(),
            client,
            store.clone(),
            config.api.api_config(),
        ));

        let bus = Arc::new(EventBus::new(store.clone()));

        let fetcher: Arc<dyn MarketDataFetcher> = match config.data.source {
            MarketSource::Synthetic => Arc::new(match config.data.seed {
                Some(seed) => SyntheticFetcher::new(seed),
                None => SyntheticFetcher::default(),
            }),
            MarketSource::Rest => {
                let client = ResilientClient::new(config.retry.clone())?;
                Arc::new(RestFetcher::new(client, config.data.base_url.clone()))
            }
        };
        let scheduler = Arc::new(StreamScheduler::new(
            config.stream.clone(),
            fetcher,
            bus.clone(),
            store.clone(),
        ));

        let engine = Arc::new(CycleEngine::new(
            config.engine.clone(),
            bus.clone(),
            scheduler.clone(),
            gateway.clone(),
            store.clone(),
        ));

        Ok(Self {
            config,
            store,
            monitor,
            gateway,
            bus,
            scheduler,
            engine,
            shutdown: CancellationToken::new(),
        })
    }

    /// Bring the service up: forward connectivity transitions onto the bus,
    /// push consumer group configuration, activate streams, start cycles.
    pub async fn start(&self) -> AppResult<()> {
        self.spawn_transition_forwarder();
        self.push_group_configs().await;
        self.scheduler.activate().await?;
        self.engine.start();
        info!("Orchestrator started");
        Ok(())
    }

    pub async fn stop(&self) {
        self.engine.stop();
        self.scheduler.stop("shutdown").await;
        self.shutdown.cancel();
        info!("Orchestrator stopped");
    }

    /// Run until interrupted.
    pub async fn run(&self) -> AppResult<()> {
        self.start().await?;
        tokio::signal::ctrl_c().await?;
        info!("Shutdown signal received");
        self.stop().await;
        Ok(())
    }

    fn spawn_transition_forwarder(&self) {
        let mut rx = self.monitor.subscribe();
        let bus = self.bus.clone();
        let token = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    result = rx.recv() => match result {
                        Ok(transition) => {
                            let (payload, priority) = match transition.to {
                                ConnectionMode::Fallback => (
                                    EventPayload::ApiFailure {
                                        error: transition
                                            .error
                                            .unwrap_or_else(|| "unknown".to_string()),
                                    },
                                    Priority::Critical,
                                ),
                                ConnectionMode::Live => {
                                    (EventPayload::ApiRecovery, Priority::High)
                                }
                            };
                            bus.publish("connectivity_monitor", None, payload, priority)
                                .await;
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Transition forwarder lagged");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
        });
    }

    /// Write each consumer group's configuration document so downstream
    /// agents pick up the stream layout on their next poll.
    async fn push_group_configs(&self) {
        let cadences: BTreeMap<MarketClass, u64> = self
            .config
            .stream
            .classes
            .iter()
            .map(|(class, c)| (*class, c.cadence_ms))
            .collect();
        let doc = json!({
            "stream_active": true,
            "classes": self.config.stream.classes.keys().collect::<Vec<_>>(),
            "cadence_ms": cadences,
            "total_symbols": self.config.stream.total_symbols(),
            "pushed_at": Utc::now(),
        });
        for group in AgentGroup::ALL {
            if let Err(err) = self.store.update_group_config(group, doc.clone()).await {
                warn!(group = %group, error = %err, "Group config push failed");
            }
        }
    }

    /// Engage the kill switch and announce it on the bus. The scheduler is
    /// stopped so no further data flows after the switch.
    pub async fn killswitch(
        &self,
        reason: &str,
        triggered_by: &str,
    ) -> AppResult<Sourced<KillswitchState>> {
        let result = self.gateway.activate_killswitch(reason, triggered_by).await?;
        self.bus
            .publish(
                SOURCE,
                None,
                EventPayload::KillswitchEngaged {
                    reason: reason.to_string(),
                    triggered_by: triggered_by.to_string(),
                },
                Priority::Critical,
            )
            .await;
        self.scheduler.stop("kill switch engaged").await;
        Ok(result)
    }

    /// Announce a consumer agent status change on the bus.
    pub async fn report_agent_status(&self, agent_id: &str, status: &str) {
        self.bus
            .publish(
                SOURCE,
                None,
                EventPayload::AgentStatus {
                    agent_id: agent_id.to_string(),
                    status: status.to_string(),
                },
                Priority::Low,
            )
            .await;
    }

    /// Agent rows annotated against the configured liveness threshold.
    pub async fn agents(&self) -> AppResult<Sourced<Vec<AgentRecord>>> {
        let mut result = self.gateway.agents_health().await?;
        let threshold = chrono::Duration::seconds(self.config.agent_liveness_secs as i64);
        for agent in &mut result.data {
            if !agent.is_alive(threshold) && agent.status == "active" {
                agent.status = "stale".to_string();
            }
        }
        Ok(result)
    }

    pub fn status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            mode: self.monitor.mode(),
            stream: self.scheduler.status(),
            engine_running: self.engine.is_running(),
            events_published: self.bus.published_count(),
            regime_changes: self.engine.regime_changes(),
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.monitor
    }

    pub fn gateway(&self) -> &Arc<ControlApi> {
        &self.gateway
    }

    pub fn scheduler(&self) -> &Arc<StreamScheduler> {
        &self.scheduler
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }
}
