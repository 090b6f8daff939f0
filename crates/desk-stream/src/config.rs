//! Stream scheduler configuration.
//!
//! Cadences are per market class; the error budget, reactivation delay,
//! and composite assembly interval are global. Defaults match 24/7 crypto
//! polling at 1s with progressively slower cadences for FX, equities, and
//! commodities.

use desk_core::{MarketClass, Timeframe};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Shared fetch-error budget before the scheduler trips.
const DEFAULT_MAX_ERRORS: u32 = 10;
/// Delay before automatic reactivation after a trip.
const DEFAULT_RETRY_DELAY_MS: u64 = 5_000;
/// Composite dataset assembly interval.
const DEFAULT_DATASET_INTERVAL_MS: u64 = 5_000;

/// Per-class polling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassConfig {
    pub cadence_ms: u64,
    pub symbols: Vec<String>,
    #[serde(default = "default_timeframes")]
    pub timeframes: Vec<Timeframe>,
}

fn default_timeframes() -> Vec<Timeframe> {
    vec![
        Timeframe::S1,
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_classes")]
    pub classes: BTreeMap<MarketClass, ClassConfig>,
    /// Shared across all class loops; tripping it deactivates everything.
    #[serde(default = "default_max_errors")]
    pub max_errors: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_dataset_interval_ms")]
    pub dataset_interval_ms: u64,
}

fn default_max_errors() -> u32 {
    DEFAULT_MAX_ERRORS
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

fn default_dataset_interval_ms() -> u64 {
    DEFAULT_DATASET_INTERVAL_MS
}

fn default_classes() -> BTreeMap<MarketClass, ClassConfig> {
    let mut classes = BTreeMap::new();
    classes.insert(
        MarketClass::Crypto,
        ClassConfig {
            cadence_ms: 1_000,
            symbols: strings(&["BTCUSDT", "ETHUSDT", "SOLUSDT", "BNBUSDT"]),
            timeframes: default_timeframes(),
        },
    );
    classes.insert(
        MarketClass::Forex,
        ClassConfig {
            cadence_ms: 5_000,
            symbols: strings(&["EURUSD", "GBPUSD", "USDJPY", "AUDUSD"]),
            timeframes: default_timeframes(),
        },
    );
    classes.insert(
        MarketClass::Equities,
        ClassConfig {
            cadence_ms: 10_000,
            symbols: strings(&["SPY", "QQQ", "AAPL", "NVDA"]),
            timeframes: default_timeframes(),
        },
    );
    classes.insert(
        MarketClass::Commodities,
        ClassConfig {
            cadence_ms: 15_000,
            symbols: strings(&["XAUUSD", "XAGUSD", "WTIUSD"]),
            timeframes: default_timeframes(),
        },
    );
    classes
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            classes: default_classes(),
            max_errors: default_max_errors(),
            retry_delay_ms: default_retry_delay_ms(),
            dataset_interval_ms: default_dataset_interval_ms(),
        }
    }
}

impl StreamConfig {
    /// Total symbol count across all configured classes.
    pub fn total_symbols(&self) -> usize {
        self.classes.values().map(|c| c.symbols.len()).sum()
    }

    /// Union of timeframes across classes, deduplicated and ordered.
    pub fn all_timeframes(&self) -> Vec<Timeframe> {
        let mut frames: Vec<Timeframe> = self
            .classes
            .values()
            .flat_map(|c| c.timeframes.iter().copied())
            .collect();
        frames.sort();
        frames.dedup();
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cadences() {
        let config = StreamConfig::default();
        assert_eq!(config.classes[&MarketClass::Crypto].cadence_ms, 1_000);
        assert_eq!(config.classes[&MarketClass::Forex].cadence_ms, 5_000);
        assert_eq!(config.classes[&MarketClass::Equities].cadence_ms, 10_000);
        assert_eq!(config.classes[&MarketClass::Commodities].cadence_ms, 15_000);
        assert_eq!(config.max_errors, 10);
        assert_eq!(config.retry_delay_ms, 5_000);
    }

    #[test]
    fn test_total_symbols_counts_all_classes() {
        let config = StreamConfig::default();
        assert_eq!(config.total_symbols(), 15);
    }

    #[test]
    fn test_toml_overrides_keep_defaults_elsewhere() {
        let config: StreamConfig = toml::from_str(
            r#"
            max_errors = 3

            [classes.crypto]
            cadence_ms = 250
            symbols = ["BTCUSDT"]
            "#,
        )
        .unwrap();
        assert_eq!(config.max_errors, 3);
        assert_eq!(config.retry_delay_ms, 5_000);
        assert_eq!(config.classes.len(), 1);
        assert_eq!(config.classes[&MarketClass::Crypto].cadence_ms, 250);
    }
}
