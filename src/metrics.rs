// src/metrics.rs

#![cfg_attr(not(feature = "observability"), allow(unused_variables, dead_code))]

#[cfg(feature = "observability")]
pub use metrics::{
    counter, describe_counter, describe_histogram, histogram, increment_counter, Unit,
};

// NOTE: When observability feature is disabled, provide stub implementations
#[cfg(not(feature = "observability"))]
pub enum Unit {}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! counter {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
    ($name:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! histogram {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! increment_counter {
    ($name:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_counter {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_histogram {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[allow(unused_imports)]
use crate::{counter, describe_counter, describe_histogram, histogram, increment_counter};

use std::time::Duration;

/// Registers descriptions for every metric the monitor emits. Call once at startup.
pub fn describe_metrics() {
    describe_counter!(
        "monitor_tier_attempts_total",
        Unit::Count,
        "Addresses handed to a cascade tier, labeled by tier."
    );
    describe_counter!(
        "monitor_resolved_total",
        Unit::Count,
        "Addresses resolved, labeled by resolution method."
    );
    describe_counter!(
        "monitor_unresolved_total",
        Unit::Count,
        "Addresses that left the cascade without a balance."
    );
    describe_counter!(
        "monitor_source_errors_total",
        Unit::Count,
        "Balance source failures, labeled by source tier and error kind."
    );
    describe_counter!(
        "monitor_store_write_errors_total",
        Unit::Count,
        "Balance store writes that failed during a refresh."
    );
    describe_histogram!(
        "monitor_resolution_run_ms",
        "Wall time of one resolution run in milliseconds."
    );
}

/// Starts the Prometheus scrape endpoint.
#[cfg(feature = "observability")]
pub fn install_prometheus_exporter(listen_addr: &str) -> anyhow::Result<()> {
    let addr: std::net::SocketAddr = listen_addr.parse()?;
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    log::info!("📈 Prometheus exporter listening on {}", addr);
    Ok(())
}

pub fn increment_tier_attempts(tier: &'static str, addresses: usize) {
    counter!("monitor_tier_attempts_total", addresses as u64, "tier" => tier);
}

pub fn increment_resolved(method: &'static str) {
    increment_counter!("monitor_resolved_total", "method" => method);
}

pub fn increment_unresolved(count: usize) {
    counter!("monitor_unresolved_total", count as u64);
}

pub fn increment_source_errors(tier: &'static str, kind: &'static str) {
    increment_counter!("monitor_source_errors_total", "tier" => tier, "kind" => kind);
}

pub fn increment_store_write_errors() {
    increment_counter!("monitor_store_write_errors_total");
}

pub fn record_resolution_run(duration: Duration) {
    histogram!("monitor_resolution_run_ms", duration.as_secs_f64() * 1000.0);
}
