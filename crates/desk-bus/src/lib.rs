//! Event broadcast bus.
//!
//! Delivery contract:
//! - FIFO by creation sequence; priority is advisory metadata, never a
//!   reordering key.
//! - At-least-once: every event is appended to the durable log before
//!   in-process delivery, and consumers acknowledge with `mark_processed`.
//! - Listener isolation: a panicking listener is logged and skipped, it
//!   never poisons delivery to later listeners or future events.
//!
//! Listeners run synchronously on the publisher's task in registration
//! order, so they must stay cheap; slow consumers belong on the durable
//! log with cursor reads.

pub mod error;

use desk_core::{EventPayload, EventRecord, Priority};
use desk_store::{EventFilter, StateStore};
use desk_telemetry::Metrics;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

pub use error::{BusError, BusResult};

/// In-memory tail retained for cheap introspection reads.
const TAIL_RETENTION: usize = 512;

pub type Listener = Box<dyn Fn(&EventRecord) + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription(u64);

struct ListenerEntry {
    id: u64,
    /// `None` subscribes to every event type.
    event_type: Option<String>,
    listener: Listener,
}

pub struct EventBus {
    store: Arc<dyn StateStore>,
    seq: AtomicU64,
    next_listener_id: AtomicU64,
    listeners: RwLock<Vec<ListenerEntry>>,
    tail: RwLock<VecDeque<EventRecord>>,
}

impl EventBus {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            seq: AtomicU64::new(0),
            next_listener_id: AtomicU64::new(0),
            listeners: RwLock::new(Vec::new()),
            tail: RwLock::new(VecDeque::new()),
        }
    }

    /// Register a listener, optionally filtered to one event type.
    /// Delivery order among listeners is registration order.
    pub fn subscribe<F>(&self, event_type: Option<&str>, listener: F) -> Subscription
    where
        F: Fn(&EventRecord) + Send + Sync + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::SeqCst);
        self.listeners.write().push(ListenerEntry {
            id,
            event_type: event_type.map(str::to_string),
            listener: Box::new(listener),
        });
        Subscription(id)
    }

    pub fn unsubscribe(&self, subscription: Subscription) {
        self.listeners.write().retain(|e| e.id != subscription.0);
    }

    /// Publish one event: assign the next sequence, append to the durable
    /// log, then deliver to in-process listeners.
    ///
    /// A failed durable append is logged and does not abort in-process
    /// delivery; the orchestration layer keeps running degraded rather than
    /// dropping the event entirely.
    pub async fn publish(
        &self,
        source: &str,
        target: Option<String>,
        payload: EventPayload,
        priority: Priority,
    ) -> EventRecord {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let record = EventRecord {
            id: Uuid::new_v4(),
            seq,
            source: source.to_string(),
            target,
            payload,
            priority,
            created_at: chrono::Utc::now(),
            processed: false,
        };

        if let Err(err) = self.store.append_event(&record).await {
            warn!(
                seq,
                event_type = record.event_type(),
                error = %err,
                "Durable event append failed, delivering in-process only"
            );
        }

        {
            let mut tail = self.tail.write();
            tail.push_back(record.clone());
            if tail.len() > TAIL_RETENTION {
                tail.pop_front();
            }
        }

        Metrics::event_published(record.event_type());
        debug!(
            seq,
            source = %record.source,
            event_type = record.event_type(),
            priority = %record.priority,
            "Event published"
        );

        self.dispatch(&record);
        record
    }

    fn dispatch(&self, record: &EventRecord) {
        let listeners = self.listeners.read();
        for entry in listeners.iter() {
            if let Some(wanted) = &entry.event_type {
                if wanted != record.event_type() {
                    continue;
                }
            }
            let outcome = catch_unwind(AssertUnwindSafe(|| (entry.listener)(record)));
            if outcome.is_err() {
                warn!(
                    listener_id = entry.id,
                    seq = record.seq,
                    event_type = record.event_type(),
                    "Listener panicked, continuing delivery"
                );
            }
        }
    }

    /// Consumer acknowledgment for at-least-once delivery.
    pub async fn mark_processed(&self, id: Uuid) -> BusResult<()> {
        {
            let mut tail = self.tail.write();
            if let Some(event) = tail.iter_mut().find(|e| e.id == id) {
                event.processed = true;
            }
        }
        self.store.mark_processed(id).await?;
        Ok(())
    }

    /// Durable-log read with cursor pagination.
    pub async fn events(&self, filter: &EventFilter) -> BusResult<Vec<EventRecord>> {
        Ok(self.store.fetch_events(filter).await?)
    }

    /// Recent events from the in-memory tail, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<EventRecord> {
        let tail = self.tail.read();
        let skip = tail.len().saturating_sub(limit);
        tail.iter().skip(skip).cloned().collect()
    }

    /// Events published by this process so far.
    pub fn published_count(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }

    /// Registered listener count.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use desk_store::MemoryStore;
    use parking_lot::Mutex;

    fn bus() -> (EventBus, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (EventBus::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_fifo_delivery_regardless_of_priority() {
        let (bus, _store) = bus();
        let seen: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe(None, move |e| sink.lock().push(e.seq));

        bus.publish("test", None, EventPayload::ApiRecovery, Priority::Low)
            .await;
        bus.publish(
            "test",
            None,
            EventPayload::ApiFailure { error: "x".into() },
            Priority::Critical,
        )
        .await;
        bus.publish("test", None, EventPayload::ApiRecovery, Priority::Medium)
            .await;

        assert_eq!(*seen.lock(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_panicking_listener_does_not_block_others() {
        let (bus, _store) = bus();
        let seen: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe(None, |_| panic!("broken consumer"));
        let sink = seen.clone();
        bus.subscribe(None, move |e| sink.lock().push(e.seq));

        bus.publish("test", None, EventPayload::ApiRecovery, Priority::Medium)
            .await;
        bus.publish("test", None, EventPayload::ApiRecovery, Priority::Medium)
            .await;

        assert_eq!(*seen.lock(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_type_filter_and_unsubscribe() {
        let (bus, _store) = bus();
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let sub = bus.subscribe(Some("api_failure"), move |e| {
            sink.lock().push(e.event_type().to_string())
        });

        bus.publish("test", None, EventPayload::ApiRecovery, Priority::Medium)
            .await;
        bus.publish(
            "test",
            None,
            EventPayload::ApiFailure { error: "x".into() },
            Priority::High,
        )
        .await;
        assert_eq!(*seen.lock(), vec!["api_failure"]);

        bus.unsubscribe(sub);
        bus.publish(
            "test",
            None,
            EventPayload::ApiFailure { error: "y".into() },
            Priority::High,
        )
        .await;
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(bus.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_publish_appends_to_durable_log() {
        let (bus, store) = bus();
        let record = bus
            .publish("monitor", None, EventPayload::ApiRecovery, Priority::High)
            .await;
        assert_eq!(store.event_count(), 1);

        bus.mark_processed(record.id).await.unwrap();
        let events = bus.events(&EventFilter::default()).await.unwrap();
        assert!(events[0].processed);
        assert_eq!(bus.published_count(), 1);
    }
}
