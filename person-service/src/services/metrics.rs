//! Prometheus metrics for person-service.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder. Later calls are no-ops.
pub fn init_metrics() {
    if METRICS_HANDLE.get().is_some() {
        return;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = METRICS_HANDLE.set(handle);
        }
        Err(e) => tracing::warn!("Failed to install Prometheus recorder: {}", e),
    }
}

/// Get metrics output in Prometheus text format.
pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}

pub fn record_person_saved(name: &str) {
    metrics::counter!("persons_generated_total", "name" => name.to_string()).increment(1);
}

pub fn record_generator_failure() {
    metrics::counter!("persons_generated_failed_total").increment(1);
}

pub fn record_stream_opened(endpoint: &'static str) {
    metrics::counter!("person_streams_opened_total", "endpoint" => endpoint).increment(1);
}
