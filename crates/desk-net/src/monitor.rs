//! Connectivity monitor.
//!
//! Single source of truth for whether queries hit the live API or the
//! durable fallback store. Probes are debounced and guarded against
//! concurrent re-entry, so at most one probe is in flight and callers
//! inside the debounce window get the cached answer immediately.
//!
//! Transitions are hysteretic: a mode change is announced exactly once per
//! edge on the broadcast channel, never re-announced while the state holds.

use crate::error::{NetError, NetResult};
use chrono::{DateTime, Utc};
use desk_core::ConnectionMode;
use desk_telemetry::Metrics;
use parking_lot::RwLock;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Minimum interval between real probes.
const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(30);
/// Probe request deadline, deliberately tighter than the call executor's.
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connectivity monitor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Health endpoint probed with a HEAD request.
    pub probe_url: String,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE.as_millis() as u64
}

fn default_probe_timeout_ms() -> u64 {
    DEFAULT_PROBE_TIMEOUT.as_millis() as u64
}

/// One mode edge. `error` carries the probe failure that caused a drop to
/// fallback; recoveries carry `None`.
#[derive(Debug, Clone)]
pub struct ModeTransition {
    pub from: ConnectionMode,
    pub to: ConnectionMode,
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

struct MonitorState {
    mode: ConnectionMode,
    last_probe: Option<Instant>,
    last_error: Option<String>,
}

pub struct ConnectivityMonitor {
    client: Client,
    config: MonitorConfig,
    state: RwLock<MonitorState>,
    probing: AtomicBool,
    force_offline: AtomicBool,
    transitions: broadcast::Sender<ModeTransition>,
}

impl ConnectivityMonitor {
    /// Starts optimistic: mode is `Live` until a probe says otherwise.
    pub fn new(config: MonitorConfig) -> NetResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.probe_timeout_ms))
            .build()
            .map_err(|e| NetError::HttpClient(format!("Failed to create probe client: {e}")))?;
        let (transitions, _) = broadcast::channel(64);
        Metrics::connection_mode(true);
        Ok(Self {
            client,
            config,
            state: RwLock::new(MonitorState {
                mode: ConnectionMode::Live,
                last_probe: None,
                last_error: None,
            }),
            probing: AtomicBool::new(false),
            force_offline: AtomicBool::new(false),
            transitions,
        })
    }

    /// Current mode without probing.
    pub fn mode(&self) -> ConnectionMode {
        self.state.read().mode
    }

    /// Most recent probe failure, if the monitor is in fallback.
    pub fn last_error(&self) -> Option<String> {
        self.state.read().last_error.clone()
    }

    /// Subscribe to mode transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<ModeTransition> {
        self.transitions.subscribe()
    }

    /// Pin the monitor to fallback regardless of probe results. Clearing the
    /// pin does not probe immediately; the next `ensure_connection` does.
    pub fn set_force_offline(&self, forced: bool) {
        self.force_offline.store(forced, Ordering::SeqCst);
        if forced {
            info!("Connectivity pinned to fallback");
            self.apply_probe_result(false, Some("forced offline".to_string()));
        } else {
            info!("Connectivity pin released");
            // Invalidate the debounce window so the next call probes.
            self.state.write().last_probe = None;
        }
    }

    /// Whether the live API should be used right now.
    ///
    /// Never returns an error: probe failures resolve to `false`. Inside the
    /// debounce window, or while another caller's probe is in flight, the
    /// cached mode is returned without touching the network.
    pub async fn ensure_connection(&self) -> bool {
        if self.force_offline.load(Ordering::SeqCst) {
            return false;
        }

        {
            let state = self.state.read();
            if let Some(at) = state.last_probe {
                if at.elapsed() < Duration::from_millis(self.config.debounce_ms) {
                    return state.mode == ConnectionMode::Live;
                }
            }
        }

        self.probe_and_apply().await
    }

    /// Probe immediately, ignoring the debounce window. The force-offline
    /// pin and the re-entrancy guard still apply.
    pub async fn check_now(&self) -> bool {
        if self.force_offline.load(Ordering::SeqCst) {
            return false;
        }
        self.probe_and_apply().await
    }

    async fn probe_and_apply(&self) -> bool {
        // Re-entrancy guard: lose the race, use the cached mode.
        if self
            .probing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return self.mode() == ConnectionMode::Live;
        }

        let result = self.probe().await;
        let live = match &result {
            Ok(()) => {
                Metrics::probe("ok");
                self.apply_probe_result(true, None);
                true
            }
            Err(err) => {
                Metrics::probe("error");
                self.apply_probe_result(false, Some(err.to_string()));
                false
            }
        };
        self.probing.store(false, Ordering::SeqCst);
        live
    }

    async fn probe(&self) -> NetResult<()> {
        let response = self.client.head(&self.config.probe_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NetError::Status {
                status: status.as_u16(),
                body: String::new(),
            });
        }
        Ok(())
    }

    /// Update cached state, emitting a transition only on a mode edge.
    fn apply_probe_result(&self, live: bool, error: Option<String>) {
        let new_mode = if live {
            ConnectionMode::Live
        } else {
            ConnectionMode::Fallback
        };

        let previous = {
            let mut state = self.state.write();
            let previous = state.mode;
            state.mode = new_mode;
            state.last_probe = Some(Instant::now());
            state.last_error = error.clone();
            previous
        };

        if previous == new_mode {
            debug!(mode = %new_mode, "Probe confirmed current mode");
            return;
        }

        Metrics::connection_mode(live);
        match new_mode {
            ConnectionMode::Live => info!("API connectivity recovered, leaving fallback"),
            ConnectionMode::Fallback => warn!(
                error = error.as_deref().unwrap_or("unknown"),
                "API unreachable, switching to fallback store"
            ),
        }

        // Receivers may not exist yet; a lagging or absent subscriber never
        // blocks the probe path.
        let _ = self.transitions.send(ModeTransition {
            from: previous,
            to: new_mode,
            error,
            at: Utc::now(),
        });
    }
}
