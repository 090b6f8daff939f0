//! Market stream scheduler.
//!
//! One polling loop per market class, each on its own cadence, all sharing
//! one error budget. Ticks within a class are strictly sequential: the next
//! tick never starts while a fetch is in flight. Exhausting the shared
//! budget deactivates every loop at once, then reactivates after a fixed
//! delay with the counter reset to zero, so a recovered upstream gets a
//! full budget rather than inheriting the old count.
//!
//! Deactivation is deterministic: loops are cancelled, a fetch that was
//! already in flight completes but its result is discarded.

use crate::calendar;
use crate::config::{ClassConfig, StreamConfig};
use crate::error::StreamResult;
use crate::fetcher::MarketDataFetcher;
use crate::indicators::IndicatorTracker;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use desk_bus::EventBus;
use desk_core::{ClassSnapshot, CompositeDataset, EventPayload, MarketClass, Priority};
use desk_store::StateStore;
use desk_telemetry::Metrics;
use parking_lot::{Mutex, RwLock};
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Event source name used for everything the scheduler publishes.
const SOURCE: &str = "stream_scheduler";

/// Introspection snapshot of the scheduler.
#[derive(Debug, Clone, Serialize)]
pub struct StreamStatus {
    pub active: bool,
    pub error_count: u32,
    pub budget_trips: u64,
    pub total_symbols: usize,
    pub last_fetch: BTreeMap<MarketClass, DateTime<Utc>>,
}

pub struct StreamScheduler {
    config: StreamConfig,
    fetcher: Arc<dyn MarketDataFetcher>,
    bus: Arc<EventBus>,
    store: Arc<dyn StateStore>,
    snapshots: DashMap<MarketClass, ClassSnapshot>,
    tracker: Mutex<IndicatorTracker>,
    latest_dataset: RwLock<Option<CompositeDataset>>,
    /// Loops are running. Cleared first on deactivation so late fetch
    /// results can be discarded.
    active: AtomicBool,
    /// Operator intent. Cleared only by an explicit stop; a budget trip
    /// leaves it set so the delayed reactivation knows to proceed.
    desired: AtomicBool,
    error_count: AtomicU32,
    budget_trips: AtomicU64,
    cancel: Mutex<Option<CancellationToken>>,
    /// Signalled by a budget trip; the supervisor task performs the
    /// delayed restart.
    restart: Notify,
    supervisor_started: AtomicBool,
}

impl StreamScheduler {
    pub fn new(
        config: StreamConfig,
        fetcher: Arc<dyn MarketDataFetcher>,
        bus: Arc<EventBus>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            config,
            fetcher,
            bus,
            store,
            snapshots: DashMap::new(),
            tracker: Mutex::new(IndicatorTracker::new()),
            latest_dataset: RwLock::new(None),
            active: AtomicBool::new(false),
            desired: AtomicBool::new(false),
            error_count: AtomicU32::new(0),
            budget_trips: AtomicU64::new(0),
            cancel: Mutex::new(None),
            restart: Notify::new(),
            supervisor_started: AtomicBool::new(false),
        }
    }

    /// Start all class loops and the composite assembly loop. A second
    /// activation while running is a no-op. The error counter always starts
    /// from zero.
    pub async fn activate(self: &Arc<Self>) -> StreamResult<()> {
        self.desired.store(true, Ordering::SeqCst);
        if !self.supervisor_started.swap(true, Ordering::SeqCst) {
            tokio::spawn(Self::supervisor(self.clone()));
        }
        self.start_streams().await;
        Ok(())
    }

    async fn start_streams(self: &Arc<Self>) {
        if self.active.swap(true, Ordering::SeqCst) {
            debug!("Stream scheduler already active");
            return;
        }
        self.error_count.store(0, Ordering::SeqCst);
        Metrics::error_budget(0);

        let token = CancellationToken::new();
        *self.cancel.lock() = Some(token.clone());

        for (class, class_config) in &self.config.classes {
            tokio::spawn(Self::class_loop(
                self.clone(),
                *class,
                class_config.clone(),
                token.clone(),
            ));
        }
        tokio::spawn(Self::assembly_loop(self.clone(), token));

        let classes: Vec<MarketClass> = self.config.classes.keys().copied().collect();
        info!(
            classes = classes.len(),
            total_symbols = self.config.total_symbols(),
            "Stream scheduler activated"
        );
        self.bus
            .publish(
                SOURCE,
                None,
                EventPayload::StreamActivated {
                    classes,
                    total_symbols: self.config.total_symbols(),
                    timeframes: self.config.all_timeframes(),
                },
                Priority::High,
            )
            .await;
    }

    /// Waits for budget-trip signals and performs the delayed restart.
    /// Lives for the scheduler's lifetime; an operator stop clears
    /// `desired`, turning a pending restart into a no-op.
    async fn supervisor(scheduler: Arc<Self>) {
        loop {
            scheduler.restart.notified().await;
            let delay = Duration::from_millis(scheduler.config.retry_delay_ms);
            tokio::time::sleep(delay).await;
            if scheduler.desired.load(Ordering::SeqCst) {
                info!("Reactivating streams after budget trip");
                scheduler.start_streams().await;
            }
        }
    }

    /// Operator stop. Suppresses any pending automatic reactivation.
    pub async fn stop(&self, reason: &str) {
        self.desired.store(false, Ordering::SeqCst);
        self.deactivate(reason).await;
    }

    async fn deactivate(&self, reason: &str) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(token) = self.cancel.lock().take() {
            token.cancel();
        }
        info!(reason, "Stream scheduler deactivated");
        self.bus
            .publish(
                SOURCE,
                None,
                EventPayload::StreamDeactivated {
                    reason: reason.to_string(),
                },
                Priority::High,
            )
            .await;
    }

    async fn class_loop(
        scheduler: Arc<Self>,
        class: MarketClass,
        config: ClassConfig,
        token: CancellationToken,
    ) {
        let mut interval = tokio::time::interval(Duration::from_millis(config.cadence_ms));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => scheduler.tick(class, &config).await,
            }
        }
        debug!(class = %class, "Class loop stopped");
    }

    async fn tick(self: &Arc<Self>, class: MarketClass, config: &ClassConfig) {
        if class.has_trading_hours() && !calendar::equities_open(Utc::now()) {
            Metrics::stream_tick(class.as_str(), "skipped");
            return;
        }

        let result = self
            .fetcher
            .fetch(class, &config.symbols, &config.timeframes)
            .await;

        // Deactivated while the fetch was in flight: discard whatever came
        // back, success or failure.
        if !self.active.load(Ordering::SeqCst) {
            debug!(class = %class, "Discarding fetch result after deactivation");
            return;
        }

        match result {
            Ok(snapshot) => {
                Metrics::stream_tick(class.as_str(), "ok");
                if let Some(mean) = snapshot.mean_price().and_then(|p| p.to_f64()) {
                    self.tracker.lock().record(class, mean);
                }
                self.snapshots.insert(class, snapshot);
            }
            Err(err) => {
                Metrics::stream_tick(class.as_str(), "error");
                let count = self.error_count.fetch_add(1, Ordering::SeqCst) + 1;
                Metrics::error_budget(count as i64);
                warn!(
                    class = %class,
                    error = %err,
                    error_count = count,
                    max_errors = self.config.max_errors,
                    "Stream fetch failed"
                );
                // The budget is the number of tolerated failures; the trip
                // happens on the failure past it.
                if count > self.config.max_errors {
                    self.trip().await;
                }
            }
        }
    }

    /// Shared budget exhausted: deactivate everything and signal the
    /// supervisor, which restarts after the delay unless the operator stops
    /// the scheduler in the meantime.
    async fn trip(&self) {
        Metrics::budget_trip("max_errors");
        self.budget_trips.fetch_add(1, Ordering::SeqCst);
        warn!(
            max_errors = self.config.max_errors,
            retry_delay_ms = self.config.retry_delay_ms,
            "Error budget exhausted, deactivating all streams"
        );
        self.deactivate("error budget exhausted").await;
        self.restart.notify_one();
    }

    async fn assembly_loop(scheduler: Arc<Self>, token: CancellationToken) {
        let mut interval =
            tokio::time::interval(Duration::from_millis(scheduler.config.dataset_interval_ms));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => scheduler.assemble_and_publish().await,
            }
        }
    }

    async fn assemble_and_publish(&self) {
        let Some(dataset) = self.assemble() else {
            return;
        };
        if let Err(err) = self.store.put_dataset(&dataset).await {
            warn!(error = %err, "Dataset persistence failed");
        }
        let payload = EventPayload::DatasetAssembled {
            dataset_id: dataset.dataset_id.clone(),
            classes: dataset.markets.keys().copied().collect(),
            completeness: dataset.completeness,
        };
        *self.latest_dataset.write() = Some(dataset);
        self.bus.publish(SOURCE, None, payload, Priority::Medium).await;
    }

    /// Merge the latest snapshot of every class with derived indicators.
    /// Returns `None` until at least one class has fetched.
    fn assemble(&self) -> Option<CompositeDataset> {
        if self.snapshots.is_empty() {
            return None;
        }
        let markets: BTreeMap<MarketClass, ClassSnapshot> = self
            .snapshots
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        let completeness = markets.len() as f64 / self.config.classes.len().max(1) as f64;
        Some(CompositeDataset {
            dataset_id: format!("stream_{}", Utc::now().timestamp_millis()),
            assembled_at: Utc::now(),
            indicators: self.tracker.lock().derive(),
            markets,
            completeness,
        })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn error_count(&self) -> u32 {
        self.error_count.load(Ordering::SeqCst)
    }

    pub fn latest_dataset(&self) -> Option<CompositeDataset> {
        self.latest_dataset.read().clone()
    }

    pub fn snapshot(&self, class: MarketClass) -> Option<ClassSnapshot> {
        self.snapshots.get(&class).map(|entry| entry.value().clone())
    }

    /// Configured class count while active, zero otherwise.
    pub fn active_stream_count(&self) -> usize {
        if self.is_active() {
            self.config.classes.len()
        } else {
            0
        }
    }

    /// Fraction of configured classes with a snapshot fresher than three
    /// cadences. Classes gated closed by the calendar are not penalized.
    pub fn health_score(&self) -> f64 {
        let now = Utc::now();
        let mut scored = 0usize;
        let mut fresh = 0usize;
        for (class, config) in &self.config.classes {
            if class.has_trading_hours() && !calendar::equities_open(now) {
                continue;
            }
            scored += 1;
            if let Some(snapshot) = self.snapshots.get(class) {
                let age = now.signed_duration_since(snapshot.fetched_at);
                if age.num_milliseconds() >= 0
                    && (age.num_milliseconds() as u64) < config.cadence_ms * 3
                {
                    fresh += 1;
                }
            }
        }
        if scored == 0 {
            return 1.0;
        }
        fresh as f64 / scored as f64
    }

    pub fn status(&self) -> StreamStatus {
        StreamStatus {
            active: self.is_active(),
            error_count: self.error_count(),
            budget_trips: self.budget_trips.load(Ordering::SeqCst),
            total_symbols: self.config.total_symbols(),
            last_fetch: self
                .snapshots
                .iter()
                .map(|entry| (*entry.key(), entry.value().fetched_at))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StreamError;
    use crate::fetcher::SyntheticFetcher;
    use async_trait::async_trait;
    use desk_core::Timeframe;
    use desk_store::{EventFilter, MemoryStore};

    struct FailingFetcher;

    /// Fails a fixed number of fetches, then delegates to synthetic data.
    struct FlakyFetcher {
        remaining_failures: AtomicU32,
        inner: SyntheticFetcher,
    }

    impl FlakyFetcher {
        fn failing(failures: u32) -> Self {
            Self {
                remaining_failures: AtomicU32::new(failures),
                inner: SyntheticFetcher::new(1),
            }
        }
    }

    #[async_trait]
    impl MarketDataFetcher for FlakyFetcher {
        async fn fetch(
            &self,
            class: MarketClass,
            symbols: &[String],
            timeframes: &[Timeframe],
        ) -> StreamResult<ClassSnapshot> {
            if self.remaining_failures.load(Ordering::SeqCst) > 0 {
                self.remaining_failures.fetch_sub(1, Ordering::SeqCst);
                return Err(StreamError::Fetch("transient outage".into()));
            }
            self.inner.fetch(class, symbols, timeframes).await
        }
    }

    #[async_trait]
    impl MarketDataFetcher for FailingFetcher {
        async fn fetch(
            &self,
            _class: MarketClass,
            _symbols: &[String],
            _timeframes: &[Timeframe],
        ) -> StreamResult<ClassSnapshot> {
            Err(StreamError::Fetch("upstream down".into()))
        }
    }

    struct SlowFetcher {
        inner: SyntheticFetcher,
        delay: Duration,
    }

    #[async_trait]
    impl MarketDataFetcher for SlowFetcher {
        async fn fetch(
            &self,
            class: MarketClass,
            symbols: &[String],
            timeframes: &[Timeframe],
        ) -> StreamResult<ClassSnapshot> {
            tokio::time::sleep(self.delay).await;
            self.inner.fetch(class, symbols, timeframes).await
        }
    }

    fn small_config(cadence_ms: u64, max_errors: u32, retry_delay_ms: u64) -> StreamConfig {
        let mut classes = BTreeMap::new();
        classes.insert(
            MarketClass::Crypto,
            ClassConfig {
                cadence_ms,
                symbols: vec!["BTCUSDT".to_string()],
                timeframes: vec![Timeframe::S1],
            },
        );
        StreamConfig {
            classes,
            max_errors,
            retry_delay_ms,
            dataset_interval_ms: 20,
        }
    }

    fn scheduler(
        config: StreamConfig,
        fetcher: Arc<dyn MarketDataFetcher>,
    ) -> (Arc<StreamScheduler>, Arc<EventBus>) {
        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(EventBus::new(store.clone()));
        let scheduler = Arc::new(StreamScheduler::new(config, fetcher, bus.clone(), store));
        (scheduler, bus)
    }

    #[tokio::test]
    async fn test_activation_is_idempotent() {
        let (s, bus) = scheduler(small_config(1_000, 10, 5_000), Arc::new(SyntheticFetcher::new(1)));
        s.activate().await.unwrap();
        s.activate().await.unwrap();

        let activated = bus
            .events(&EventFilter {
                event_type: Some("stream_activated".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(activated.len(), 1);
        s.stop("test done").await;
    }

    #[tokio::test]
    async fn test_budget_trip_deactivates_then_reactivates() {
        let (s, bus) = scheduler(small_config(5, 2, 100), Arc::new(FailingFetcher));
        s.activate().await.unwrap();

        // The third failing tick exceeds the budget of two well within
        // this window.
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!s.is_active());
        let deactivated = bus
            .events(&EventFilter {
                event_type: Some("stream_deactivated".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(!deactivated.is_empty());

        // After the retry delay the scheduler comes back with a fresh budget.
        tokio::time::sleep(Duration::from_millis(120)).await;
        let activated = bus
            .events(&EventFilter {
                event_type: Some("stream_activated".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(activated.len() >= 2);
        s.stop("test done").await;
    }

    #[tokio::test]
    async fn test_budget_tolerates_exactly_max_errors_failures() {
        let fetcher = Arc::new(FlakyFetcher::failing(2));
        let (s, bus) = scheduler(small_config(5, 2, 50), fetcher);
        s.activate().await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;

        // Two failures against a budget of two: the counter is spent but
        // the streams never went down.
        assert!(s.is_active());
        assert_eq!(s.error_count(), 2);
        let deactivated = bus
            .events(&EventFilter {
                event_type: Some("stream_deactivated".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(deactivated.is_empty());
        s.stop("test done").await;
    }

    #[tokio::test]
    async fn test_repeated_trips_each_get_a_restart() {
        let (s, _bus) = scheduler(small_config(5, 1, 30), Arc::new(FailingFetcher));
        s.activate().await.unwrap();

        // Every restart trips again; the restart path must keep working
        // across trips, not just for the first one.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(s.status().budget_trips >= 2);
        s.stop("test done").await;
    }

    #[tokio::test]
    async fn test_operator_stop_suppresses_reactivation() {
        let (s, bus) = scheduler(small_config(5, 2, 50), Arc::new(FailingFetcher));
        s.activate().await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        s.stop("operator stop").await;

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(!s.is_active());
        let activated = bus
            .events(&EventFilter {
                event_type: Some("stream_activated".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(activated.len(), 1);
    }

    #[tokio::test]
    async fn test_inflight_fetch_discarded_after_stop() {
        let fetcher = Arc::new(SlowFetcher {
            inner: SyntheticFetcher::new(1),
            delay: Duration::from_millis(80),
        });
        let (s, _bus) = scheduler(small_config(5, 10, 5_000), fetcher);
        s.activate().await.unwrap();

        // First tick is in flight; stop before it completes.
        tokio::time::sleep(Duration::from_millis(20)).await;
        s.stop("test stop").await;
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert!(s.snapshot(MarketClass::Crypto).is_none());
    }

    #[tokio::test]
    async fn test_dataset_assembled_and_persisted() {
        let (s, bus) = scheduler(small_config(5, 10, 5_000), Arc::new(SyntheticFetcher::new(3)));
        s.activate().await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;

        let dataset = s.latest_dataset().expect("dataset assembled");
        assert!(dataset.markets.contains_key(&MarketClass::Crypto));
        assert!((dataset.completeness - 1.0).abs() < f64::EPSILON);

        let events = bus
            .events(&EventFilter {
                event_type: Some("dataset_assembled".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(!events.is_empty());
        s.stop("test done").await;
    }
}
