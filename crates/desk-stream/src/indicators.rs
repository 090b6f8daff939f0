//! Derived indicators for composite dataset assembly.
//!
//! The tracker keeps a short mean-price history per class and derives
//! per-class return volatility, the latest return z-score, and pairwise
//! return correlations between classes. All derivation is pure over the
//! recorded history.

use desk_core::{DerivedIndicators, MarketClass};
use std::collections::{BTreeMap, VecDeque};

/// Price points retained per class.
const HISTORY_LEN: usize = 128;
/// Minimum observations before statistics are emitted for a class.
const MIN_SAMPLES: usize = 3;

#[derive(Default)]
pub struct IndicatorTracker {
    history: BTreeMap<MarketClass, VecDeque<f64>>,
}

impl IndicatorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the latest mean price for a class.
    pub fn record(&mut self, class: MarketClass, mean_price: f64) {
        if !mean_price.is_finite() || mean_price <= 0.0 {
            return;
        }
        let series = self.history.entry(class).or_default();
        series.push_back(mean_price);
        if series.len() > HISTORY_LEN {
            series.pop_front();
        }
    }

    /// Derive indicators from the current history.
    pub fn derive(&self) -> DerivedIndicators {
        let returns: BTreeMap<MarketClass, Vec<f64>> = self
            .history
            .iter()
            .filter(|(_, series)| series.len() >= MIN_SAMPLES)
            .map(|(class, series)| (*class, pct_returns(series)))
            .collect();

        let mut indicators = DerivedIndicators::default();
        for (class, series) in &returns {
            let vol = stddev(series);
            indicators.volatility.insert(*class, vol);
            if let Some(last) = series.last() {
                let z = if vol > f64::EPSILON {
                    (last - mean(series)) / vol
                } else {
                    0.0
                };
                indicators.return_zscore.insert(*class, z);
            }
        }

        let classes: Vec<MarketClass> = returns.keys().copied().collect();
        for (i, a) in classes.iter().enumerate() {
            for b in classes.iter().skip(i + 1) {
                let corr = correlation(&returns[a], &returns[b]);
                indicators.correlations.insert(format!("{a}/{b}"), corr);
            }
        }
        indicators
    }
}

fn pct_returns(series: &VecDeque<f64>) -> Vec<f64> {
    series
        .iter()
        .zip(series.iter().skip(1))
        .map(|(prev, next)| (next - prev) / prev)
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn stddev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

/// Pearson correlation over the overlapping tail of two return series.
fn correlation(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n < 2 {
        return 0.0;
    }
    let a = &a[a.len() - n..];
    let b = &b[b.len() - n..];
    let (ma, mb) = (mean(a), mean(b));
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for i in 0..n {
        let da = a[i] - ma;
        let db = b[i] - mb;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    let denom = (var_a * var_b).sqrt();
    if denom <= f64::EPSILON {
        0.0
    } else {
        cov / denom
    }
}
