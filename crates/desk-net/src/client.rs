//! Resilient HTTP call executor.
//!
//! Bounded retry with linear backoff for idempotent reads, a single-attempt
//! path for non-idempotent actions. The per-attempt timeout lives on the
//! underlying client so an attempt can never outlive its budget.

use crate::error::{NetError, NetResult};
use desk_telemetry::Metrics;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Total attempts per idempotent call, including the first.
const DEFAULT_MAX_ATTEMPTS: u32 = 2;
/// Per-attempt deadline.
const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);
/// Backoff unit; the sleep after failed attempt `n` is `n * base_delay`.
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Retry policy for the resilient executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_attempt_timeout_ms() -> u64 {
    DEFAULT_ATTEMPT_TIMEOUT.as_millis() as u64
}

fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY.as_millis() as u64
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

/// HTTP client wrapping every call in the retry policy.
pub struct ResilientClient {
    client: Client,
    config: RetryConfig,
}

impl ResilientClient {
    pub fn new(config: RetryConfig) -> NetResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.attempt_timeout_ms))
            .build()
            .map_err(|e| NetError::HttpClient(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// GET with retry, decoding the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> NetResult<T> {
        self.with_retry(url, || self.client.get(url)).await
    }

    /// GET with retry and query parameters.
    pub async fn get_json_query<T, Q>(&self, url: &str, query: &Q) -> NetResult<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        self.with_retry(url, || self.client.get(url).query(query)).await
    }

    /// POST with retry. Only for idempotent endpoints; non-idempotent
    /// actions must go through [`post_json_once`](Self::post_json_once).
    pub async fn post_json<T, B>(&self, url: &str, body: &B) -> NetResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.with_retry(url, || self.client.post(url).json(body)).await
    }

    /// GET with retry, returning the raw body for endpoints that answer
    /// with plain text instead of JSON.
    pub async fn get_text(&self, url: &str) -> NetResult<String> {
        self.with_retry_raw(url, || self.client.get(url)).await
    }

    /// Single-attempt POST. A timeout here is ambiguous (the action may have
    /// been applied), so the call is never repeated; the caller decides what
    /// an unconfirmed outcome means.
    pub async fn post_json_once<T, B>(&self, url: &str, body: &B) -> NetResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        match Self::execute(self.client.post(url).json(body)).await {
            Ok(value) => {
                Metrics::call_attempt("ok");
                Ok(value)
            }
            Err(err) => {
                Metrics::call_attempt("error");
                Err(err)
            }
        }
    }

    async fn with_retry<T, F>(&self, url: &str, build: F) -> NetResult<T>
    where
        T: DeserializeOwned,
        F: Fn() -> reqwest::RequestBuilder,
    {
        let body = self.with_retry_raw(url, build).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Retry loop over the raw transport. Only transport and status failures
    /// are retried; decoding happens once, after a successful attempt.
    async fn with_retry_raw<F>(&self, url: &str, build: F) -> NetResult<String>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut last_err = None;
        for attempt in 1..=self.config.max_attempts {
            match Self::execute_raw(build()).await {
                Ok(value) => {
                    Metrics::call_attempt("ok");
                    if attempt > 1 {
                        debug!(url, attempt, "Call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    Metrics::call_attempt("error");
                    warn!(
                        url,
                        attempt,
                        max_attempts = self.config.max_attempts,
                        error = %err,
                        "Call attempt failed"
                    );
                    last_err = Some(err);
                    if attempt < self.config.max_attempts {
                        let delay =
                            Duration::from_millis(self.config.base_delay_ms * attempt as u64);
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
        // max_attempts >= 1 guarantees at least one recorded error
        Err(last_err.unwrap_or_else(|| NetError::Request("no attempts made".into())))
    }

    async fn execute<T: DeserializeOwned>(request: reqwest::RequestBuilder) -> NetResult<T> {
        let body = Self::execute_raw(request).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn execute_raw(request: reqwest::RequestBuilder) -> NetResult<String> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NetError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// One-route HTTP server answering every request with a fixed status
    /// and body, counting requests served.
    async fn mock_server(status: u16, body: &'static str, hits: Arc<AtomicUsize>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                hits.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {status} MOCK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{addr}")
    }

    fn fast_client(max_attempts: u32) -> ResilientClient {
        ResilientClient::new(RetryConfig {
            max_attempts,
            attempt_timeout_ms: 500,
            base_delay_ms: 10,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_success_uses_a_single_attempt() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = mock_server(200, r#"{"ok":true}"#, hits.clone()).await;

        let value: serde_json::Value = fast_client(2).get_json(&base).await.unwrap();
        assert_eq!(value["ok"], true);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_exhausts_all_attempts() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = mock_server(500, "boom", hits.clone()).await;

        let result = fast_client(2).get_json::<serde_json::Value>(&base).await;
        assert!(matches!(result, Err(NetError::Status { status: 500, .. })));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_get_text_returns_raw_body() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = mock_server(200, "pong", hits.clone()).await;

        let body = fast_client(2).get_text(&base).await.unwrap();
        assert_eq!(body, "pong");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_post_once_never_retries() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = mock_server(500, "boom", hits.clone()).await;

        let result = fast_client(3)
            .post_json_once::<serde_json::Value, _>(&base, &serde_json::json!({"go": true}))
            .await;
        assert!(result.is_err());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
