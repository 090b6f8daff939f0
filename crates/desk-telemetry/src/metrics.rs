//! Prometheus metrics for the orchestration layer.
//!
//! Covers:
//! - Connectivity probes and mode transitions
//! - Resilient call attempts and fallback usage
//! - Stream ticks, fetch errors, and budget trips
//! - Bus publishes and cycle errors
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. Registration failure
//! means duplicate metric names, a fatal configuration error that should
//! crash at startup rather than fail silently. These panics only occur
//! during static initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_int_gauge, CounterVec, Gauge, IntGauge,
};

/// Connection mode gauge (1 = live, 0 = fallback).
pub static CONNECTION_LIVE: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("desk_connection_live", "Connection mode (1=live)").unwrap()
});

/// Total health probes by outcome.
pub static PROBES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "desk_probes_total",
        "Total health probes",
        &["outcome"]
    )
    .unwrap()
});

/// Total resilient call attempts by endpoint and outcome.
pub static CALL_ATTEMPTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "desk_call_attempts_total",
        "Total resilient call attempts",
        &["outcome"]
    )
    .unwrap()
});

/// Total queries resolved by provenance (api / fallback).
pub static QUERY_SOURCE_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "desk_query_source_total",
        "Queries resolved by source",
        &["source"]
    )
    .unwrap()
});

/// Stream ticks per market class by outcome (ok / error / skipped).
pub static STREAM_TICKS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "desk_stream_ticks_total",
        "Stream scheduler ticks",
        &["class", "outcome"]
    )
    .unwrap()
});

/// Current shared stream error budget counter.
pub static STREAM_ERROR_BUDGET: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "desk_stream_error_budget",
        "Shared stream fetch error counter"
    )
    .unwrap()
});

/// Total global error budget trips.
pub static STREAM_TRIPS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "desk_stream_trips_total",
        "Error budget circuit trips",
        &["reason"]
    )
    .unwrap()
});

/// Total events published by type.
pub static EVENTS_PUBLISHED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "desk_events_published_total",
        "Events published on the bus",
        &["event_type"]
    )
    .unwrap()
});

/// Total cycle ticks by cycle and outcome.
pub static CYCLE_TICKS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "desk_cycle_ticks_total",
        "Orchestration cycle ticks",
        &["cycle", "outcome"]
    )
    .unwrap()
});

/// Convenience wrappers so call sites stay one-liners.
pub struct Metrics;

impl Metrics {
    pub fn connection_mode(live: bool) {
        CONNECTION_LIVE.set(if live { 1.0 } else { 0.0 });
    }

    pub fn probe(outcome: &str) {
        PROBES_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn call_attempt(outcome: &str) {
        CALL_ATTEMPTS_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn query_source(source: &str) {
        QUERY_SOURCE_TOTAL.with_label_values(&[source]).inc();
    }

    pub fn stream_tick(class: &str, outcome: &str) {
        STREAM_TICKS_TOTAL.with_label_values(&[class, outcome]).inc();
    }

    pub fn error_budget(count: i64) {
        STREAM_ERROR_BUDGET.set(count);
    }

    pub fn budget_trip(reason: &str) {
        STREAM_TRIPS_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn event_published(event_type: &str) {
        EVENTS_PUBLISHED_TOTAL.with_label_values(&[event_type]).inc();
    }

    pub fn cycle_tick(cycle: &str, outcome: &str) {
        CYCLE_TICKS_TOTAL.with_label_values(&[cycle, outcome]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_once() {
        // Touching each Lazy forces registration; duplicates would panic.
        Metrics::connection_mode(true);
        Metrics::probe("ok");
        Metrics::call_attempt("ok");
        Metrics::query_source("api");
        Metrics::stream_tick("crypto", "ok");
        Metrics::error_budget(0);
        Metrics::budget_trip("max_errors");
        Metrics::event_published("api_failure");
        Metrics::cycle_tick("coordination", "ok");
    }
}
