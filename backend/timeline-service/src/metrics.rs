//! Timeline engine metrics
//!
//! Prometheus metrics for fan-out propagation and the reconciler job.
//! Cache metrics live in the `timeline-cache` crate.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, HistogramVec,
    IntCounterVec, IntGauge,
};
use std::time::Duration;

static FANOUT_STEPS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "timeline_fanout_steps_total",
        "Fan-out step results per recipient (applied/unchanged/failed)",
        &["operation", "status"]
    )
    .expect("Failed to register fan-out steps metric")
});

static FANOUT_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "timeline_fanout_duration_seconds",
        "Duration of one propagation pass",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]
    )
    .expect("Failed to register fan-out duration metric")
});

static OPERATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "timeline_operations_total",
        "Facade operations by outcome",
        &["operation", "status"]
    )
    .expect("Failed to register operations metric")
});

static FANOUT_QUEUE_DEPTH: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "timeline_fanout_queue_depth",
        "Fan-out jobs waiting in the queue"
    )
    .expect("Failed to register fan-out queue depth metric")
});

static RECONCILE_RUNS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "timeline_reconcile_runs_total",
        "Total reconciliation cycles (success/error)",
        &["status"]
    )
    .expect("Failed to register reconcile runs metric")
});

static RECONCILE_REPAIRS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "timeline_reconcile_repairs_total",
        "Timeline entries repaired by the reconciler",
        &["action"]
    )
    .expect("Failed to register reconcile repairs metric")
});

/// Record the outcome of one fan-out step
pub fn record_fanout_step(operation: &str, status: &str) {
    FANOUT_STEPS_TOTAL
        .with_label_values(&[operation, status])
        .inc();
}

pub fn record_fanout_duration(operation: &str, duration: Duration) {
    FANOUT_DURATION_SECONDS
        .with_label_values(&[operation])
        .observe(duration.as_secs_f64());
}

pub fn record_operation(operation: &str, status: &str) {
    OPERATIONS_TOTAL
        .with_label_values(&[operation, status])
        .inc();
}

pub fn inc_queue_depth() {
    FANOUT_QUEUE_DEPTH.inc();
}

pub fn dec_queue_depth() {
    FANOUT_QUEUE_DEPTH.dec();
}

/// Record reconcile run result (success/error)
pub fn record_reconcile_run(status: &str) {
    RECONCILE_RUNS_TOTAL.with_label_values(&[status]).inc();
}

/// Record repaired entries by action (inserted/removed)
pub fn record_reconcile_repairs(action: &str, count: u64) {
    RECONCILE_REPAIRS_TOTAL
        .with_label_values(&[action])
        .inc_by(count);
}
