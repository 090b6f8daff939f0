//! Resource allocation proposal.
//!
//! Pure: the coordination cycle passes in the stream health score and the
//! latest per-class volatility; more volatile classes get a larger share of
//! polling attention. Shares always sum to 1 across the given classes.

use chrono::Utc;
use desk_core::{MarketClass, ResourceAllocation, ShareByClass};
use std::collections::BTreeMap;

/// Baseline weight so a zero-volatility class still gets a share.
const BASE_WEIGHT: f64 = 1.0;

pub fn propose(
    health: f64,
    volatility: &BTreeMap<MarketClass, f64>,
    classes: &[MarketClass],
) -> ResourceAllocation {
    let max_vol = volatility
        .values()
        .copied()
        .fold(0.0_f64, f64::max)
        .max(f64::EPSILON);

    let weights: BTreeMap<MarketClass, f64> = classes
        .iter()
        .map(|class| {
            let vol = volatility.get(class).copied().unwrap_or(0.0);
            (*class, BASE_WEIGHT + vol / max_vol)
        })
        .collect();

    let total: f64 = weights.values().sum();
    let shares = if total > f64::EPSILON {
        ShareByClass(
            weights
                .into_iter()
                .map(|(class, w)| (class, w / total))
                .collect(),
        )
    } else {
        ShareByClass::default()
    };

    ResourceAllocation {
        proposed_at: Utc::now(),
        shares,
        derived_from_health: health,
    }
}
