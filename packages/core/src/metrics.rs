//! Prometheus metrics registry for the harvester.
//!
//! [`HarvestMetrics`] owns all registered metrics and the [`Registry`] they
//! belong to. Construct it once at startup, wrap in `Arc`, and pass it to
//! the harvester loop and the ops router.

use prometheus::{Counter, CounterVec, Opts, Registry};

pub struct HarvestMetrics {
    /// Collect calls that passed the polling gate, labelled by source.
    pub collects_total: CounterVec,
    /// Collect calls refused by the polling gate, labelled by source.
    pub collects_skipped_total: CounterVec,
    /// Failed endpoint fetches, labelled by source and error kind.
    pub fetch_errors_total: CounterVec,
    /// Records handed to the store, labelled by source.
    pub records_persisted_total: CounterVec,
    /// Records dropped as in-batch duplicates.
    pub duplicates_dropped_total: Counter,
    /// Store saves that failed.
    pub persist_errors_total: Counter,
    pub registry: Registry,
}

impl HarvestMetrics {
    /// Create and register all metrics. Returns an error if any metric
    /// name is invalid or duplicated.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let collects_total = CounterVec::new(
            Opts::new("feed_harvester_collects_total", "Permitted collect cycles"),
            &["source"],
        )?;

        let collects_skipped_total = CounterVec::new(
            Opts::new(
                "feed_harvester_collects_skipped_total",
                "Collect calls refused by the polling gate",
            ),
            &["source"],
        )?;

        let fetch_errors_total = CounterVec::new(
            Opts::new("feed_harvester_fetch_errors_total", "Failed endpoint fetches"),
            &["source", "kind"],
        )?;

        let records_persisted_total = CounterVec::new(
            Opts::new("feed_harvester_records_persisted_total", "Records saved to the store"),
            &["source"],
        )?;

        let duplicates_dropped_total = Counter::with_opts(Opts::new(
            "feed_harvester_duplicates_dropped_total",
            "Records dropped as in-batch duplicates",
        ))?;

        let persist_errors_total = Counter::with_opts(Opts::new(
            "feed_harvester_persist_errors_total",
            "Failed store saves",
        ))?;

        registry.register(Box::new(collects_total.clone()))?;
        registry.register(Box::new(collects_skipped_total.clone()))?;
        registry.register(Box::new(fetch_errors_total.clone()))?;
        registry.register(Box::new(records_persisted_total.clone()))?;
        registry.register(Box::new(duplicates_dropped_total.clone()))?;
        registry.register(Box::new(persist_errors_total.clone()))?;

        Ok(Self {
            collects_total,
            collects_skipped_total,
            fetch_errors_total,
            records_persisted_total,
            duplicates_dropped_total,
            persist_errors_total,
            registry,
        })
    }

    /// Render all metrics in Prometheus text format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&metric_families, &mut buf)?;
        Ok(String::from_utf8(buf).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_metrics_register_without_error() {
        let metrics = HarvestMetrics::new();
        assert!(metrics.is_ok(), "HarvestMetrics::new() failed: {:?}", metrics.err());
    }

    #[test]
    fn labelled_counters_render() {
        let metrics = HarvestMetrics::new().unwrap();
        metrics
            .fetch_errors_total
            .with_label_values(&["track", "no_data"])
            .inc();
        metrics.duplicates_dropped_total.inc_by(2.0);

        let output = metrics.render().unwrap();
        assert!(output.contains("feed_harvester_fetch_errors_total"));
        assert!(output.contains("kind=\"no_data\""));
        assert!(output.contains("feed_harvester_duplicates_dropped_total 2"));
    }
}
