//! Metrics collection and exposition.
//!
//! # Metrics
//! - `shield_requests_total` (counter): requests by outcome
//! - `shield_rejections_total` (counter): rejections by code
//! - `shield_inspection_hits_total` (counter): content hits by threat kind
//! - `shield_audit_dropped_total` (counter): events not enqueued, by reason
//! - `shield_audit_write_failures_total` (counter): store errors in the writer
//! - `shield_auto_blocks_total` (counter): automatic blocks issued
//! - `shield_pipeline_duration_seconds` (histogram): time spent in the pipeline
//! - `shield_rate_limit_counters` (gauge): live rate limit counters
//! - `shield_blocked_addresses` (gauge): active block entries
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its HTTP scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(address: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(address)
        .install()?;
    tracing::info!(%address, "Prometheus metrics endpoint listening");
    Ok(())
}

pub fn record_request(outcome: &'static str) {
    metrics::counter!("shield_requests_total", "outcome" => outcome).increment(1);
}

pub fn record_rejection(code: &'static str) {
    metrics::counter!("shield_rejections_total", "code" => code).increment(1);
}

pub fn record_inspection_hit(kind: &'static str) {
    metrics::counter!("shield_inspection_hits_total", "kind" => kind).increment(1);
}

pub fn record_audit_dropped(reason: &'static str) {
    metrics::counter!("shield_audit_dropped_total", "reason" => reason).increment(1);
}

pub fn record_audit_write_failure() {
    metrics::counter!("shield_audit_write_failures_total").increment(1);
}

pub fn record_auto_block() {
    metrics::counter!("shield_auto_blocks_total").increment(1);
}

pub fn record_pipeline_duration(elapsed: Duration) {
    metrics::histogram!("shield_pipeline_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_rate_limit_counters(count: usize) {
    metrics::gauge!("shield_rate_limit_counters").set(count as f64);
}

pub fn record_blocked_addresses(count: usize) {
    metrics::gauge!("shield_blocked_addresses").set(count as f64);
}
