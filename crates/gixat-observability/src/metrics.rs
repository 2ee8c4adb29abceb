//! Metrics collection with Prometheus
//!
//! - GraphQL operation counts and latency
//! - Upload outcomes per stage
//! - Virus scan results
//! - Bytes saved by image compression

use prometheus::{Counter, CounterVec, HistogramOpts, HistogramVec, Opts, Registry};
use std::sync::Arc;

/// Metrics collector for Gixat
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,

    /// GraphQL requests by operation name and outcome (`ok` or an error code)
    pub graphql_requests_total: CounterVec,
    /// GraphQL request duration
    pub graphql_request_duration_seconds: HistogramVec,

    /// Uploads by stage (`session`, `jobcard`, `jobitem`, `avatar`,
    /// `presigned`) and outcome
    pub uploads_total: CounterVec,

    /// Virus scans by result (`clean`, `infected`, `disabled`)
    pub virus_scans_total: CounterVec,

    pub image_bytes_saved_total: Counter,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let graphql_requests_total = CounterVec::new(
            Opts::new("gixat_graphql_requests_total", "Total number of GraphQL requests"),
            &["operation", "outcome"],
        )?;

        let graphql_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "gixat_graphql_request_duration_seconds",
                "GraphQL request duration in seconds",
            )
            .buckets(vec![
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
            ]),
            &["operation"],
        )?;

        let uploads_total = CounterVec::new(
            Opts::new("gixat_uploads_total", "Total number of file uploads"),
            &["stage", "outcome"],
        )?;

        let virus_scans_total = CounterVec::new(
            Opts::new("gixat_virus_scans_total", "Total number of virus scans"),
            &["result"],
        )?;

        let image_bytes_saved_total = Counter::with_opts(Opts::new(
            "gixat_image_bytes_saved_total",
            "Bytes saved by image compression",
        ))?;

        registry.register(Box::new(graphql_requests_total.clone()))?;
        registry.register(Box::new(graphql_request_duration_seconds.clone()))?;
        registry.register(Box::new(uploads_total.clone()))?;
        registry.register(Box::new(virus_scans_total.clone()))?;
        registry.register(Box::new(image_bytes_saved_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            graphql_requests_total,
            graphql_request_duration_seconds,
            uploads_total,
            virus_scans_total,
            image_bytes_saved_total,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record one GraphQL request. `outcome` is `ok` or the first error code.
    pub fn record_graphql_request(&self, operation: &str, outcome: &str, duration_secs: f64) {
        self.graphql_requests_total
            .with_label_values(&[operation, outcome])
            .inc();
        self.graphql_request_duration_seconds
            .with_label_values(&[operation])
            .observe(duration_secs);
    }

    pub fn record_upload(&self, stage: &str, outcome: &str) {
        self.uploads_total.with_label_values(&[stage, outcome]).inc();
    }

    pub fn record_virus_scan(&self, result: &str) {
        self.virus_scans_total.with_label_values(&[result]).inc();
    }

    pub fn record_bytes_saved(&self, bytes: u64) {
        if bytes > 0 {
            self.image_bytes_saved_total.inc_by(bytes as f64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter_value(metrics: &Metrics, name: &str) -> f64 {
        metrics
            .registry()
            .gather()
            .iter()
            .find(|m| m.name() == name)
            .unwrap_or_else(|| panic!("{} metric not found", name))
            .metric[0]
            .counter
            .as_ref()
            .unwrap()
            .value
            .unwrap()
    }

    #[test]
    fn test_record_graphql_request() {
        let metrics = Metrics::new().unwrap();
        metrics.record_graphql_request("createCustomer", "ok", 0.02);
        metrics.record_graphql_request("createCustomer", "ok", 0.03);

        assert_eq!(counter_value(&metrics, "gixat_graphql_requests_total"), 2.0);

        let gathered = metrics.registry().gather();
        let duration = gathered
            .iter()
            .find(|m| m.name() == "gixat_graphql_request_duration_seconds")
            .expect("duration metric not found");
        let histogram = duration.metric[0].histogram.as_ref().unwrap();
        assert_eq!(histogram.sample_count.unwrap(), 2);
    }

    #[test]
    fn test_record_uploads_and_scans() {
        let metrics = Metrics::new().unwrap();
        metrics.record_upload("session", "ok");
        metrics.record_virus_scan("infected");
        metrics.record_bytes_saved(1024);
        metrics.record_bytes_saved(0);

        assert_eq!(counter_value(&metrics, "gixat_uploads_total"), 1.0);
        assert_eq!(counter_value(&metrics, "gixat_virus_scans_total"), 1.0);
        assert_eq!(counter_value(&metrics, "gixat_image_bytes_saved_total"), 1024.0);
    }
}
