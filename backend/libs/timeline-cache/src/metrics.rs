//! Cache metrics for observability

use prometheus::{CounterVec, Opts, Registry};
use std::sync::OnceLock;

static METRICS: OnceLock<CacheMetricsInner> = OnceLock::new();

struct CacheMetricsInner {
    hits: CounterVec,
    misses: CounterVec,
    writes: CounterVec,
    invalidations: CounterVec,
    errors: CounterVec,
}

impl CacheMetricsInner {
    fn new() -> Self {
        Self {
            hits: CounterVec::new(
                Opts::new("timeline_cache_hits_total", "Total cache hits"),
                &["namespace"],
            )
            .expect("valid metric definition"),
            misses: CounterVec::new(
                Opts::new("timeline_cache_misses_total", "Total cache misses"),
                &["namespace"],
            )
            .expect("valid metric definition"),
            writes: CounterVec::new(
                Opts::new("timeline_cache_writes_total", "Total cache writes"),
                &["namespace"],
            )
            .expect("valid metric definition"),
            invalidations: CounterVec::new(
                Opts::new(
                    "timeline_cache_invalidations_total",
                    "Total cache keys purged by explicit invalidation",
                ),
                &["namespace"],
            )
            .expect("valid metric definition"),
            errors: CounterVec::new(
                Opts::new("timeline_cache_errors_total", "Total cache errors"),
                &["namespace", "error_type"],
            )
            .expect("valid metric definition"),
        }
    }

    fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.hits.clone()))?;
        registry.register(Box::new(self.misses.clone()))?;
        registry.register(Box::new(self.writes.clone()))?;
        registry.register(Box::new(self.invalidations.clone()))?;
        registry.register(Box::new(self.errors.clone()))?;
        Ok(())
    }
}

fn get_metrics() -> &'static CacheMetricsInner {
    METRICS.get_or_init(CacheMetricsInner::new)
}

/// Cache metrics handle, labelled by cache namespace
#[derive(Clone, Debug)]
pub struct CacheMetrics {
    namespace: &'static str,
}

impl CacheMetrics {
    pub fn new(namespace: &'static str) -> Self {
        Self { namespace }
    }

    /// Register metrics with a Prometheus registry
    pub fn register(registry: &Registry) -> Result<(), prometheus::Error> {
        get_metrics().register(registry)
    }

    pub fn record_hit(&self) {
        get_metrics().hits.with_label_values(&[self.namespace]).inc();
    }

    pub fn record_miss(&self) {
        get_metrics().misses.with_label_values(&[self.namespace]).inc();
    }

    pub fn record_write(&self) {
        get_metrics().writes.with_label_values(&[self.namespace]).inc();
    }

    pub fn record_invalidation(&self, purged: usize) {
        get_metrics()
            .invalidations
            .with_label_values(&[self.namespace])
            .inc_by(purged as f64);
    }

    pub fn record_error(&self, error_type: &str) {
        get_metrics()
            .errors
            .with_label_values(&[self.namespace, error_type])
            .inc();
    }
}
