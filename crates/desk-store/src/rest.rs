//! PostgREST-style HTTP store implementation.
//!
//! Speaks to a hosted database exposing the `agents`, `events`,
//! `orchestrator_state`, `market_data_stream`, and `agent_groups` tables.
//! Retention of events and datasets is the hosted side's responsibility.

use crate::{EventFilter, StateStore, StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use desk_core::{AgentGroup, AgentRecord, CompositeDataset, EventPayload, EventRecord, Priority};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Default timeout for store requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// REST store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestConfig {
    /// Base URL including the REST prefix (e.g. "https://db.example.com/rest/v1").
    pub base_url: String,
    /// API key sent as both `apikey` and bearer token.
    pub api_key: String,
    /// Request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT.as_millis() as u64
}

/// Event row as stored in the `events` table. The payload column keeps the
/// tagged JSON form so out-of-process consumers can filter on `event_type`
/// without decoding it.
#[derive(Debug, Serialize, Deserialize)]
struct EventRow {
    id: Uuid,
    seq: u64,
    event_type: String,
    source: String,
    target: Option<String>,
    payload: EventPayload,
    priority: Priority,
    created_at: DateTime<Utc>,
    processed: bool,
}

impl From<&EventRecord> for EventRow {
    fn from(e: &EventRecord) -> Self {
        Self {
            id: e.id,
            seq: e.seq,
            event_type: e.event_type().to_string(),
            source: e.source.clone(),
            target: e.target.clone(),
            payload: e.payload.clone(),
            priority: e.priority,
            created_at: e.created_at,
            processed: e.processed,
        }
    }
}

impl From<EventRow> for EventRecord {
    fn from(row: EventRow) -> Self {
        Self {
            id: row.id,
            seq: row.seq,
            source: row.source,
            target: row.target,
            payload: row.payload,
            priority: row.priority,
            created_at: row.created_at,
            processed: row.processed,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StateRow {
    key: String,
    value: serde_json::Value,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DatasetRow {
    stream_id: String,
    assembled_at: DateTime<Utc>,
    payload: CompositeDataset,
}

#[derive(Debug, Serialize, Deserialize)]
struct GroupConfigRow {
    group_type: AgentGroup,
    configuration: serde_json::Value,
    updated_at: DateTime<Utc>,
}

/// Store backed by a PostgREST-style endpoint.
pub struct RestStore {
    client: Client,
    config: RestConfig,
}

impl RestStore {
    pub fn new(config: RestConfig) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| StoreError::HttpClient(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), table)
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
    }

    async fn check_status(response: reqwest::Response) -> StoreResult<reqwest::Response> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl StateStore for RestStore {
    async fn fetch_agents(&self) -> StoreResult<Vec<AgentRecord>> {
        let url = self.table_url("agents");
        let response = self
            .authed(self.client.get(&url))
            .query(&[("select", "*"), ("order", "last_beat.desc.nullslast")])
            .send()
            .await?;
        let agents = Self::check_status(response).await?.json().await?;
        Ok(agents)
    }

    async fn append_event(&self, event: &EventRecord) -> StoreResult<()> {
        let url = self.table_url("events");
        let row = EventRow::from(event);
        let response = self
            .authed(self.client.post(&url))
            .json(&[row])
            .send()
            .await?;
        Self::check_status(response).await?;
        debug!(seq = event.seq, event_type = event.event_type(), "Event appended to durable log");
        Ok(())
    }

    async fn fetch_events(&self, filter: &EventFilter) -> StoreResult<Vec<EventRecord>> {
        let url = self.table_url("events");
        let mut query: Vec<(String, String)> = vec![
            ("select".into(), "*".into()),
            ("order".into(), "seq.asc".into()),
        ];
        if let Some(since) = filter.since_seq {
            query.push(("seq".into(), format!("gt.{since}")));
        }
        if let Some(event_type) = &filter.event_type {
            query.push(("event_type".into(), format!("eq.{event_type}")));
        }
        if let Some(limit) = filter.limit {
            query.push(("limit".into(), limit.to_string()));
        }

        let response = self
            .authed(self.client.get(&url))
            .query(&query)
            .send()
            .await?;
        let rows: Vec<EventRow> = Self::check_status(response).await?.json().await?;
        Ok(rows.into_iter().map(EventRecord::from).collect())
    }

    async fn mark_processed(&self, id: Uuid) -> StoreResult<()> {
        let url = self.table_url("events");
        let response = self
            .authed(self.client.patch(&url))
            .query(&[("id", format!("eq.{id}"))])
            .json(&serde_json::json!({ "processed": true }))
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn put_state(&self, key: &str, value: serde_json::Value) -> StoreResult<()> {
        let url = self.table_url("orchestrator_state");
        let row = StateRow {
            key: key.to_string(),
            value,
            updated_at: Utc::now(),
        };
        let response = self
            .authed(self.client.post(&url))
            .header("Prefer", "resolution=merge-duplicates")
            .json(&[row])
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn get_state(&self, key: &str) -> StoreResult<Option<serde_json::Value>> {
        let url = self.table_url("orchestrator_state");
        let response = self
            .authed(self.client.get(&url))
            .query(&[("select", "*"), ("key", &format!("eq.{key}")[..])])
            .send()
            .await?;
        let rows: Vec<StateRow> = Self::check_status(response).await?.json().await?;
        Ok(rows.into_iter().next().map(|row| row.value))
    }

    async fn put_dataset(&self, dataset: &CompositeDataset) -> StoreResult<()> {
        let url = self.table_url("market_data_stream");
        let row = DatasetRow {
            stream_id: dataset.dataset_id.clone(),
            assembled_at: dataset.assembled_at,
            payload: dataset.clone(),
        };
        let response = self
            .authed(self.client.post(&url))
            .header("Prefer", "resolution=merge-duplicates")
            .json(&[row])
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn recent_datasets(&self, limit: usize) -> StoreResult<Vec<CompositeDataset>> {
        let url = self.table_url("market_data_stream");
        let response = self
            .authed(self.client.get(&url))
            .query(&[
                ("select", "*"),
                ("order", "assembled_at.desc"),
                ("limit", &limit.to_string()[..]),
            ])
            .send()
            .await?;
        let rows: Vec<DatasetRow> = Self::check_status(response).await?.json().await?;
        Ok(rows.into_iter().map(|row| row.payload).collect())
    }

    async fn group_config(&self, group: AgentGroup) -> StoreResult<Option<serde_json::Value>> {
        let url = self.table_url("agent_groups");
        let response = self
            .authed(self.client.get(&url))
            .query(&[
                ("select", "*"),
                ("group_type", &format!("eq.{group}")[..]),
            ])
            .send()
            .await?;
        let rows: Vec<GroupConfigRow> = Self::check_status(response).await?.json().await?;
        Ok(rows.into_iter().next().map(|row| row.configuration))
    }

    async fn update_group_config(
        &self,
        group: AgentGroup,
        config: serde_json::Value,
    ) -> StoreResult<()> {
        let url = self.table_url("agent_groups");
        let row = GroupConfigRow {
            group_type: group,
            configuration: config,
            updated_at: Utc::now(),
        };
        let response = self
            .authed(self.client.post(&url))
            .header("Prefer", "resolution=merge-duplicates")
            .json(&[row])
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }
}
