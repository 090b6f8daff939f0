//! Market partitioning and snapshot types.
//!
//! A `MarketClass` is a partition of instruments with its own polling
//! cadence and symbol/timeframe configuration. Each scheduler tick stores
//! the latest `ClassSnapshot` keyed by class; the composite assembly loop
//! merges all classes plus derived indicators into one `CompositeDataset`.

use crate::error::CoreError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Partition of instruments polled by an independent scheduler loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketClass {
    Crypto,
    Forex,
    Equities,
    Commodities,
}

impl MarketClass {
    /// All configured market classes, in scheduler activation order.
    pub const ALL: [MarketClass; 4] = [
        MarketClass::Crypto,
        MarketClass::Forex,
        MarketClass::Equities,
        MarketClass::Commodities,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MarketClass::Crypto => "crypto",
            MarketClass::Forex => "forex",
            MarketClass::Equities => "equities",
            MarketClass::Commodities => "commodities",
        }
    }

    /// Whether this class trades on an exchange calendar.
    ///
    /// Equity loops check the market-open predicate per tick and skip the
    /// fetch (not an error) when closed. Crypto and FX poll around the clock.
    pub fn has_trading_hours(&self) -> bool {
        matches!(self, MarketClass::Equities)
    }
}

impl fmt::Display for MarketClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarketClass {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "crypto" => Ok(MarketClass::Crypto),
            "forex" => Ok(MarketClass::Forex),
            "equities" => Ok(MarketClass::Equities),
            "commodities" => Ok(MarketClass::Commodities),
            other => Err(CoreError::UnknownMarketClass(other.to_string())),
        }
    }
}

/// Bar size fetched per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1s")]
    S1,
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::S1 => "1s",
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1s" => Ok(Timeframe::S1),
            "1m" => Ok(Timeframe::M1),
            "5m" => Ok(Timeframe::M5),
            "15m" => Ok(Timeframe::M15),
            "1h" => Ok(Timeframe::H1),
            "4h" => Ok(Timeframe::H4),
            "1d" => Ok(Timeframe::D1),
            other => Err(CoreError::UnknownTimeframe(other.to_string())),
        }
    }
}

/// Connectivity monitor state: sourcing from the primary API or the
/// durable secondary store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMode {
    Live,
    Fallback,
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionMode::Live => f.write_str("live"),
            ConnectionMode::Fallback => f.write_str("fallback"),
        }
    }
}

/// Provenance tag attached to every resolved query result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Api,
    Fallback,
    Synthetic,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Api => f.write_str("api"),
            DataSource::Fallback => f.write_str("fallback"),
            DataSource::Synthetic => f.write_str("synthetic"),
        }
    }
}

/// Detected market regime, polled by the adaptation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    Trending,
    RangeBound,
    HighVolatility,
    Quiet,
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Regime::Trending => f.write_str("trending"),
            Regime::RangeBound => f.write_str("range_bound"),
            Regime::HighVolatility => f.write_str("high_volatility"),
            Regime::Quiet => f.write_str("quiet"),
        }
    }
}

/// A single symbol quote inside a class snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub price: Decimal,
    pub volume: Decimal,
    pub ts: DateTime<Utc>,
}

/// Latest fetched data for one market class.
///
/// Single-writer invariant: only the owning scheduler loop mutates the
/// cache entry for its class, so snapshots are replaced wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassSnapshot {
    pub class: MarketClass,
    /// Quotes per timeframe, BTreeMap for stable serialization order.
    pub frames: BTreeMap<Timeframe, Vec<Quote>>,
    pub fetched_at: DateTime<Utc>,
    pub source: DataSource,
}

impl ClassSnapshot {
    pub fn new(class: MarketClass, source: DataSource) -> Self {
        Self {
            class,
            frames: BTreeMap::new(),
            fetched_at: Utc::now(),
            source,
        }
    }

    /// Total quote count across all timeframes.
    pub fn quote_count(&self) -> usize {
        self.frames.values().map(Vec::len).sum()
    }

    /// Mean price across the finest available timeframe, if any quotes exist.
    pub fn mean_price(&self) -> Option<Decimal> {
        let quotes = self.frames.values().next().filter(|q| !q.is_empty())?;
        let sum: Decimal = quotes.iter().map(|q| q.price).sum();
        Some(sum / Decimal::from(quotes.len()))
    }
}

/// Indicators derived during composite dataset assembly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DerivedIndicators {
    /// Pairwise return correlation between classes, keyed "a/b".
    pub correlations: BTreeMap<String, f64>,
    /// Return volatility (stddev) per class.
    pub volatility: BTreeMap<MarketClass, f64>,
    /// Latest return z-score per class, for anomaly scanning.
    pub return_zscore: BTreeMap<MarketClass, f64>,
}

/// Per-tick aggregation of all classes' latest snapshots plus derived
/// indicators, published as one event and persisted for consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeDataset {
    pub dataset_id: String,
    pub assembled_at: DateTime<Utc>,
    pub markets: BTreeMap<MarketClass, ClassSnapshot>,
    pub indicators: DerivedIndicators,
    /// Fraction of configured classes with a fresh snapshot, 0.0..=1.0.
    pub completeness: f64,
}

impl CompositeDataset {
    /// Whether all configured classes contributed a snapshot.
    pub fn is_complete(&self) -> bool {
        self.completeness >= 1.0
    }
}
