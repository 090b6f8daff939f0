//! In-memory store implementation.
//!
//! Backs tests and fully offline operation. Mirrors the semantics of the
//! REST store: the event log is append-only, `processed` is the only
//! mutable event field, datasets are retained newest-first up to a cap.

use crate::{EventFilter, StateStore, StoreError, StoreResult};
use async_trait::async_trait;
use desk_core::{AgentGroup, AgentRecord, CompositeDataset, EventRecord};
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

/// Retained dataset cap, matching the hosted store's retention policy
/// being out of this layer's hands for the REST variant.
const DATASET_RETENTION: usize = 256;

#[derive(Default)]
pub struct MemoryStore {
    agents: RwLock<Vec<AgentRecord>>,
    events: RwLock<Vec<EventRecord>>,
    state: RwLock<HashMap<String, serde_json::Value>>,
    datasets: RwLock<VecDeque<CompositeDataset>>,
    group_configs: RwLock<HashMap<AgentGroup, serde_json::Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed agent rows (tests and offline bootstrapping).
    pub fn seed_agents(&self, agents: Vec<AgentRecord>) {
        *self.agents.write() = agents;
    }

    /// Number of events currently in the log.
    pub fn event_count(&self) -> usize {
        self.events.read().len()
    }

    /// Number of datasets currently retained.
    pub fn dataset_count(&self) -> usize {
        self.datasets.read().len()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn fetch_agents(&self) -> StoreResult<Vec<AgentRecord>> {
        let mut agents = self.agents.read().clone();
        agents.sort_by(|a, b| b.last_beat.cmp(&a.last_beat));
        Ok(agents)
    }

    async fn append_event(&self, event: &EventRecord) -> StoreResult<()> {
        self.events.write().push(event.clone());
        Ok(())
    }

    async fn fetch_events(&self, filter: &EventFilter) -> StoreResult<Vec<EventRecord>> {
        let events = self.events.read();
        let mut matched: Vec<EventRecord> = events
            .iter()
            .filter(|e| filter.since_seq.map_or(true, |since| e.seq > since))
            .filter(|e| {
                filter
                    .event_type
                    .as_deref()
                    .map_or(true, |t| e.event_type() == t)
            })
            .cloned()
            .collect();
        matched.sort_by_key(|e| e.seq);
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn mark_processed(&self, id: Uuid) -> StoreResult<()> {
        let mut events = self.events.write();
        match events.iter_mut().find(|e| e.id == id) {
            Some(event) => {
                event.processed = true;
                Ok(())
            }
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    async fn put_state(&self, key: &str, value: serde_json::Value) -> StoreResult<()> {
        self.state.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn get_state(&self, key: &str) -> StoreResult<Option<serde_json::Value>> {
        Ok(self.state.read().get(key).cloned())
    }

    async fn put_dataset(&self, dataset: &CompositeDataset) -> StoreResult<()> {
        let mut datasets = self.datasets.write();
        datasets.push_front(dataset.clone());
        datasets.truncate(DATASET_RETENTION);
        Ok(())
    }

    async fn recent_datasets(&self, limit: usize) -> StoreResult<Vec<CompositeDataset>> {
        Ok(self.datasets.read().iter().take(limit).cloned().collect())
    }

    async fn group_config(&self, group: AgentGroup) -> StoreResult<Option<serde_json::Value>> {
        Ok(self.group_configs.read().get(&group).cloned())
    }

    async fn update_group_config(
        &self,
        group: AgentGroup,
        config: serde_json::Value,
    ) -> StoreResult<()> {
        self.group_configs.write().insert(group, config);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use desk_core::{EventPayload, Priority};
    use serde_json::json;

    fn record(seq: u64, payload: EventPayload) -> EventRecord {
        EventRecord {
            id: Uuid::new_v4(),
            seq,
            source: "test".into(),
            target: None,
            payload,
            priority: Priority::Medium,
            created_at: Utc::now(),
            processed: false,
        }
    }

    #[tokio::test]
    async fn test_event_filter_since_and_type() {
        let store = MemoryStore::new();
        store
            .append_event(&record(1, EventPayload::ApiRecovery))
            .await
            .unwrap();
        store
            .append_event(&record(
                2,
                EventPayload::ApiFailure {
                    error: "down".into(),
                },
            ))
            .await
            .unwrap();
        store
            .append_event(&record(
                3,
                EventPayload::ApiFailure {
                    error: "still down".into(),
                },
            ))
            .await
            .unwrap();

        let filter = EventFilter {
            since_seq: Some(1),
            event_type: Some("api_failure".into()),
            limit: Some(10),
        };
        let events = store.fetch_events(&filter).await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.seq > 1));
    }

    #[tokio::test]
    async fn test_mark_processed_mutates_only_processed() {
        let store = MemoryStore::new();
        let rec = record(1, EventPayload::ApiRecovery);
        store.append_event(&rec).await.unwrap();

        store.mark_processed(rec.id).await.unwrap();
        let events = store.fetch_events(&EventFilter::default()).await.unwrap();
        assert!(events[0].processed);
        assert_eq!(events[0].seq, rec.seq);

        let missing = store.mark_processed(Uuid::new_v4()).await;
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_state_roundtrip() {
        let store = MemoryStore::new();
        store
            .put_state("killswitch_status", json!({"enabled": true}))
            .await
            .unwrap();
        let value = store.get_state("killswitch_status").await.unwrap();
        assert_eq!(value.unwrap()["enabled"], true);
        assert!(store.get_state("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_group_config_replace() {
        let store = MemoryStore::new();
        store
            .update_group_config(AgentGroup::Signals, json!({"innovation_mode": "autonomous"}))
            .await
            .unwrap();
        let cfg = store.group_config(AgentGroup::Signals).await.unwrap();
        assert_eq!(cfg.unwrap()["innovation_mode"], "autonomous");
        assert!(store
            .group_config(AgentGroup::Execution)
            .await
            .unwrap()
            .is_none());
    }
}
