//! Pattern scan over derived indicators.
//!
//! Pure functions: the innovation cycle feeds the latest composite
//! dataset's indicators in and publishes whatever clears the confidence
//! threshold. Confidence mapping:
//! - correlation / divergence: |r| of the pair
//! - anomaly: |z| / 4 capped at 1, so a four-sigma move scores 1.0

use desk_core::{DerivedIndicators, MarketClass, PatternCandidate, PatternKind};
use std::str::FromStr;

/// Scale factor from |z-score| to confidence.
const ANOMALY_Z_SCALE: f64 = 4.0;

/// Scan indicators for candidates at or above `threshold`.
pub fn scan(indicators: &DerivedIndicators, threshold: f64) -> Vec<PatternCandidate> {
    let mut candidates = Vec::new();

    for (pair, corr) in &indicators.correlations {
        let confidence = corr.abs();
        if confidence < threshold {
            continue;
        }
        let Some(classes) = parse_pair(pair) else {
            continue;
        };
        let kind = if *corr >= 0.0 {
            PatternKind::Correlation
        } else {
            PatternKind::Divergence
        };
        candidates.push(PatternCandidate {
            kind,
            classes,
            confidence,
            detail: format!("{pair} return correlation {corr:.3}"),
        });
    }

    for (class, z) in &indicators.return_zscore {
        let confidence = (z.abs() / ANOMALY_Z_SCALE).min(1.0);
        if confidence < threshold {
            continue;
        }
        candidates.push(PatternCandidate {
            kind: PatternKind::Anomaly,
            classes: vec![*class],
            confidence,
            detail: format!("{class} return z-score {z:.2}"),
        });
    }

    candidates
}

fn parse_pair(pair: &str) -> Option<Vec<MarketClass>> {
    let (a, b) = pair.split_once('/')?;
    Some(vec![
        MarketClass::from_str(a).ok()?,
        MarketClass::from_str(b).ok()?,
    ])
}
