// Private module declaration
mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};

// Re-export for public API
pub use server::metrics_handler;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Covers the three hot paths:
// - Ingestion: messages consumed by outcome
// - Processor: orders created, failures by operation and reason
// - Cache / Store: lookup results, write failures, store latency
//
// Each Metrics owns its registry, so tests can build as many as they like.
// Scraped via GET /metrics.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Ingestion
    pub ingest_messages: IntCounterVec,

    // Order Processor
    pub orders_created: IntCounter,
    pub order_failures: IntCounterVec,

    // Cache
    pub cache_lookups: IntCounterVec,
    pub cache_write_failures: IntCounter,

    // Store
    pub store_duration: HistogramVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let ingest_messages = IntCounterVec::new(
            Opts::new("ingest_messages_total", "Queue messages handled by the ingestion loop"),
            &["outcome"],
        )?;
        registry.register(Box::new(ingest_messages.clone()))?;

        let orders_created = IntCounter::new("orders_created_total", "Orders persisted successfully")?;
        registry.register(Box::new(orders_created.clone()))?;

        let order_failures = IntCounterVec::new(
            Opts::new("order_failures_total", "Order processor failures"),
            &["operation", "reason"],
        )?;
        registry.register(Box::new(order_failures.clone()))?;

        let cache_lookups = IntCounterVec::new(
            Opts::new("cache_lookups_total", "Cache probes by result (hit, miss, error)"),
            &["result"],
        )?;
        registry.register(Box::new(cache_lookups.clone()))?;

        let cache_write_failures = IntCounter::new(
            "cache_write_failures_total",
            "Cache repopulation writes that failed",
        )?;
        registry.register(Box::new(cache_write_failures.clone()))?;

        let store_duration = HistogramVec::new(
            HistogramOpts::new("store_operation_duration_seconds", "Order store operation latency")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation"],
        )?;
        registry.register(Box::new(store_duration.clone()))?;

        Ok(Self {
            registry,
            ingest_messages,
            orders_created,
            order_failures,
            cache_lookups,
            cache_write_failures,
            store_duration,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_ingest(&self, outcome: &str) {
        self.ingest_messages.with_label_values(&[outcome]).inc();
    }

    pub fn record_order_failure(&self, operation: &str, reason: &str) {
        self.order_failures.with_label_values(&[operation, reason]).inc();
    }

    pub fn record_cache_lookup(&self, result: &str) {
        self.cache_lookups.with_label_values(&[result]).inc();
    }

    pub fn observe_store(&self, operation: &str, duration_secs: f64) {
        self.store_duration.with_label_values(&[operation]).observe(duration_secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter_value(metrics: &Metrics, name: &str) -> Vec<f64> {
        metrics
            .registry()
            .gather()
            .iter()
            .find(|m| m.name() == name)
            .map(|m| m.metric.iter().map(|v| v.counter.value.unwrap_or(0.0)).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        metrics.orders_created.inc();
        assert_eq!(counter_value(&metrics, "orders_created_total"), vec![1.0]);
    }

    #[test]
    fn test_registries_are_independent() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.record_ingest("committed");

        assert_eq!(counter_value(&a, "ingest_messages_total"), vec![1.0]);
        assert!(counter_value(&b, "ingest_messages_total").is_empty());
    }

    #[test]
    fn test_cache_lookup_labels() {
        let metrics = Metrics::new().unwrap();
        metrics.record_cache_lookup("hit");
        metrics.record_cache_lookup("hit");
        metrics.record_cache_lookup("miss");

        assert_eq!(metrics.cache_lookups.with_label_values(&["hit"]).get(), 2);
        assert_eq!(metrics.cache_lookups.with_label_values(&["miss"]).get(), 1);
        assert_eq!(metrics.cache_lookups.with_label_values(&["error"]).get(), 0);
    }

    #[test]
    fn test_store_histogram_observes() {
        let metrics = Metrics::new().unwrap();
        metrics.observe_store("create", 0.02);

        let count = metrics.store_duration.with_label_values(&["create"]).get_sample_count();
        assert_eq!(count, 1);
    }
}
