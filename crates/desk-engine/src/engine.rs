//! Orchestration cycle engine.
//!
//! Three independent periodic loops:
//! - coordination: derive system metrics, record a cycle snapshot, propose
//!   a resource allocation
//! - adaptation: poll the market regime and announce changes
//! - innovation: scan recent composite datasets for patterns
//!
//! A failed tick is logged and counted; it never stops its own loop and
//! never touches the other two. Cycle history is append-only.

use crate::allocation;
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::patterns;
use desk_bus::EventBus;
use desk_core::{
    CycleSnapshot, CycleType, DerivedMetrics, EventPayload, MarketClass, PatternCandidate,
    Priority, Regime,
};
use desk_net::ControlApi;
use desk_store::StateStore;
use desk_stream::StreamScheduler;
use desk_telemetry::Metrics;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Event source name used for everything the engine publishes.
const SOURCE: &str = "cycle_engine";
/// Cycle snapshots retained in memory.
const HISTORY_RETENTION: usize = 1_024;
/// Composite datasets examined per innovation tick.
const INNOVATION_WINDOW: usize = 8;

pub struct CycleEngine {
    config: EngineConfig,
    bus: Arc<EventBus>,
    scheduler: Arc<StreamScheduler>,
    gateway: Arc<ControlApi>,
    store: Arc<dyn StateStore>,
    history: RwLock<Vec<CycleSnapshot>>,
    last_regime: RwLock<Option<Regime>>,
    regime_changes: AtomicU64,
    running: AtomicBool,
    cancel: Mutex<Option<CancellationToken>>,
}

impl CycleEngine {
    pub fn new(
        config: EngineConfig,
        bus: Arc<EventBus>,
        scheduler: Arc<StreamScheduler>,
        gateway: Arc<ControlApi>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            config,
            bus,
            scheduler,
            gateway,
            store,
            history: RwLock::new(Vec::new()),
            last_regime: RwLock::new(None),
            regime_changes: AtomicU64::new(0),
            running: AtomicBool::new(false),
            cancel: Mutex::new(None),
        }
    }

    /// Start the three cycle loops. Starting twice is a no-op.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("Cycle engine already running");
            return;
        }
        let token = CancellationToken::new();
        *self.cancel.lock() = Some(token.clone());

        for (cycle, interval_ms) in [
            (CycleType::Coordination, self.config.coordination_interval_ms),
            (CycleType::Adaptation, self.config.adaptation_interval_ms),
            (CycleType::Innovation, self.config.innovation_interval_ms),
        ] {
            tokio::spawn(Self::cycle_loop(
                self.clone(),
                cycle,
                interval_ms,
                token.clone(),
            ));
        }
        info!(
            coordination_ms = self.config.coordination_interval_ms,
            adaptation_ms = self.config.adaptation_interval_ms,
            innovation_ms = self.config.innovation_interval_ms,
            "Cycle engine started"
        );
    }

    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(token) = self.cancel.lock().take() {
            token.cancel();
        }
        info!("Cycle engine stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn cycle_loop(
        engine: Arc<Self>,
        cycle: CycleType,
        interval_ms: u64,
        token: CancellationToken,
    ) {
        let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {
                    match engine.run_once(cycle).await {
                        Ok(()) => Metrics::cycle_tick(cycle.to_string().as_str(), "ok"),
                        Err(err) => {
                            Metrics::cycle_tick(cycle.to_string().as_str(), "error");
                            warn!(cycle = %cycle, error = %err, "Cycle tick failed");
                        }
                    }
                }
            }
        }
        debug!(cycle = %cycle, "Cycle loop stopped");
    }

    /// Run a single tick of one cycle. Exposed so operators can force a
    /// tick out of schedule.
    pub async fn run_once(self: &Arc<Self>, cycle: CycleType) -> EngineResult<()> {
        match cycle {
            CycleType::Coordination => self.coordination_tick().await,
            CycleType::Adaptation => self.adaptation_tick().await,
            CycleType::Innovation => self.innovation_tick().await,
        }
    }

    async fn coordination_tick(&self) -> EngineResult<()> {
        let metrics = self.derive_metrics();
        self.push_history(CycleSnapshot::new(CycleType::Coordination, metrics.clone()));

        let volatility = self
            .scheduler
            .latest_dataset()
            .map(|d| d.indicators.volatility)
            .unwrap_or_default();
        let allocation = allocation::propose(metrics.stream_health, &volatility, &MarketClass::ALL);
        debug!(
            health = metrics.stream_health,
            active_streams = metrics.active_streams,
            "Coordination tick"
        );
        self.bus
            .publish(
                SOURCE,
                None,
                EventPayload::ResourceAllocation { allocation },
                Priority::Medium,
            )
            .await;
        Ok(())
    }

    async fn adaptation_tick(&self) -> EngineResult<()> {
        let state = self.gateway.regime_state().await?;
        let regime = state.data.regime;
        self.push_history(CycleSnapshot::new(
            CycleType::Adaptation,
            self.derive_metrics(),
        ));

        let previous = { *self.last_regime.read() };
        *self.last_regime.write() = Some(regime);

        match previous {
            None => {
                // First observation establishes the baseline, not a change.
                debug!(regime = %regime, "Initial regime observed");
            }
            Some(prev) if prev != regime => {
                let total = self.regime_changes.fetch_add(1, Ordering::SeqCst) + 1;
                info!(from = %prev, to = %regime, total_changes = total, "Regime change");
                self.bus
                    .publish(
                        SOURCE,
                        None,
                        EventPayload::Adaptation {
                            regime,
                            total_changes: total,
                        },
                        Priority::High,
                    )
                    .await;
            }
            Some(_) => {}
        }
        Ok(())
    }

    async fn innovation_tick(&self) -> EngineResult<()> {
        self.push_history(CycleSnapshot::new(
            CycleType::Innovation,
            self.derive_metrics(),
        ));
        let datasets = self.store.recent_datasets(INNOVATION_WINDOW).await?;
        if datasets.is_empty() {
            debug!("Innovation tick with no datasets yet");
            return Ok(());
        }
        // Scan the whole window; a pattern recurring across datasets keeps
        // its strongest observation.
        let mut candidates: Vec<PatternCandidate> = Vec::new();
        for dataset in &datasets {
            for candidate in patterns::scan(&dataset.indicators, self.config.confidence_threshold)
            {
                match candidates
                    .iter_mut()
                    .find(|c| c.kind == candidate.kind && c.classes == candidate.classes)
                {
                    Some(existing) => {
                        if candidate.confidence > existing.confidence {
                            *existing = candidate;
                        }
                    }
                    None => candidates.push(candidate),
                }
            }
        }
        if candidates.is_empty() {
            return Ok(());
        }
        info!(
            candidates = candidates.len(),
            threshold = self.config.confidence_threshold,
            "Pattern candidates discovered"
        );
        self.bus
            .publish(
                SOURCE,
                None,
                EventPayload::PatternDiscovery { candidates },
                Priority::High,
            )
            .await;
        Ok(())
    }

    fn derive_metrics(&self) -> DerivedMetrics {
        DerivedMetrics {
            active_streams: self.scheduler.active_stream_count(),
            stream_errors: self.scheduler.error_count(),
            events_published: self.bus.published_count(),
            regime_changes: self.regime_changes.load(Ordering::SeqCst),
            stream_health: self.scheduler.health_score(),
        }
    }

    fn push_history(&self, snapshot: CycleSnapshot) {
        let mut history = self.history.write();
        history.push(snapshot);
        if history.len() > HISTORY_RETENTION {
            let excess = history.len() - HISTORY_RETENTION;
            history.drain(..excess);
        }
    }

    /// Cycle snapshots recorded so far, oldest first.
    pub fn history(&self) -> Vec<CycleSnapshot> {
        self.history.read().clone()
    }

    pub fn regime_changes(&self) -> u64 {
        self.regime_changes.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use desk_core::{CompositeDataset, DerivedIndicators};
    use desk_net::{
        ApiConfig, ConnectivityMonitor, MonitorConfig, RegimeState, ResilientClient, RetryConfig,
    };
    use desk_store::{EventFilter, MemoryStore};
    use desk_stream::{StreamConfig, SyntheticFetcher};
    use std::collections::BTreeMap;

    async fn engine() -> (Arc<CycleEngine>, Arc<EventBus>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(EventBus::new(store.clone()));
        let scheduler = Arc::new(desk_stream::StreamScheduler::new(
            StreamConfig::default(),
            Arc::new(SyntheticFetcher::new(1)),
            bus.clone(),
            store.clone(),
        ));
        let monitor = Arc::new(
            ConnectivityMonitor::new(MonitorConfig {
                probe_url: "http://127.0.0.1:1/health".into(),
                debounce_ms: 60_000,
                probe_timeout_ms: 100,
            })
            .unwrap(),
        );
        monitor.set_force_offline(true);
        let gateway = Arc::new(ControlApi::new(
            monitor,
            ResilientClient::new(RetryConfig::default()).unwrap(),
            store.clone(),
            ApiConfig {
                base_url: "http://127.0.0.1:1".into(),
            },
        ));
        let engine = Arc::new(CycleEngine::new(
            EngineConfig::default(),
            bus.clone(),
            scheduler,
            gateway,
            store.clone(),
        ));
        (engine, bus, store)
    }

    async fn put_regime(store: &MemoryStore, regime: Regime) {
        let state = RegimeState {
            regime,
            confidence: 0.9,
            updated_at: chrono::Utc::now(),
        };
        store
            .put_state("regime_state", serde_json::to_value(&state).unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_first_regime_observation_is_not_a_change() {
        let (engine, bus, store) = engine().await;
        put_regime(&store, Regime::Trending).await;

        engine.run_once(CycleType::Adaptation).await.unwrap();
        engine.run_once(CycleType::Adaptation).await.unwrap();

        assert_eq!(engine.regime_changes(), 0);
        let events = bus
            .events(&EventFilter {
                event_type: Some("adaptation".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_regime_change_publishes_adaptation() {
        let (engine, bus, store) = engine().await;
        put_regime(&store, Regime::Quiet).await;
        engine.run_once(CycleType::Adaptation).await.unwrap();

        put_regime(&store, Regime::HighVolatility).await;
        engine.run_once(CycleType::Adaptation).await.unwrap();

        assert_eq!(engine.regime_changes(), 1);
        let events = bus
            .events(&EventFilter {
                event_type: Some("adaptation".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_coordination_publishes_allocation_and_records_history() {
        let (engine, bus, _store) = engine().await;
        engine.run_once(CycleType::Coordination).await.unwrap();

        let history = engine.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].cycle, CycleType::Coordination);

        let events = bus
            .events(&EventFilter {
                event_type: Some("resource_allocation".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_innovation_without_dataset_publishes_nothing() {
        let (engine, bus, _store) = engine().await;
        engine.run_once(CycleType::Innovation).await.unwrap();

        let events = bus
            .events(&EventFilter {
                event_type: Some("pattern_discovery".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(events.is_empty());
        assert_eq!(engine.history().len(), 1);
    }

    #[tokio::test]
    async fn test_innovation_scans_recent_datasets_from_store() {
        let (engine, bus, store) = engine().await;

        let mut indicators = DerivedIndicators::default();
        indicators.correlations.insert("crypto/forex".into(), 0.95);
        for i in 0..3 {
            store
                .put_dataset(&CompositeDataset {
                    dataset_id: format!("stream_{i}"),
                    assembled_at: chrono::Utc::now(),
                    indicators: indicators.clone(),
                    markets: BTreeMap::new(),
                    completeness: 1.0,
                })
                .await
                .unwrap();
        }

        engine.run_once(CycleType::Innovation).await.unwrap();

        // The same pattern across the window collapses into one publish.
        let events = bus
            .events(&EventFilter {
                event_type: Some("pattern_discovery".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
    }
}
