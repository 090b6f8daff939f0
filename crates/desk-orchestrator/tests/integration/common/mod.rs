//! Shared test fixtures.

use desk_core::{MarketClass, Timeframe};
use desk_orchestrator::AppConfig;
use desk_stream::ClassConfig;
use std::collections::BTreeMap;

/// Offline configuration with millisecond-scale cadences: unreachable API
/// endpoints, in-memory store, seeded synthetic market data.
pub fn offline_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.api.base_url = "http://127.0.0.1:1".to_string();
    config.api.probe_url = "http://127.0.0.1:1/health".to_string();
    config.api.probe_timeout_ms = 100;
    config.data.seed = Some(42);

    let mut classes = BTreeMap::new();
    classes.insert(
        MarketClass::Crypto,
        ClassConfig {
            cadence_ms: 10,
            symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
            timeframes: vec![Timeframe::S1, Timeframe::M1],
        },
    );
    classes.insert(
        MarketClass::Forex,
        ClassConfig {
            cadence_ms: 20,
            symbols: vec!["EURUSD".to_string()],
            timeframes: vec![Timeframe::M1],
        },
    );
    config.stream.classes = classes;
    config.stream.dataset_interval_ms = 20;
    config
}
