//! Metrics initialization for Prometheus exporter.

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::MetricsConfig;
use crate::error::{Error, Result};

pub const PACKETS_TOTAL: &str = "hostpatch_packets_total";
pub const DECODE_ERRORS_TOTAL: &str = "hostpatch_decode_errors_total";
pub const BLACKHOLED_TOTAL: &str = "hostpatch_blackholed_total";
pub const LOOKUPS_TOTAL: &str = "hostpatch_lookups_total";
pub const RECORDS_APPENDED_TOTAL: &str = "hostpatch_records_appended_total";
pub const CACHE_FLUSHES_TOTAL: &str = "hostpatch_cache_flushes_total";
pub const PENDING_HOSTS: &str = "hostpatch_pending_hosts";

/// Initialize the metrics system based on configuration.
///
/// When metrics are enabled, this starts an HTTP server that exposes
/// a `/metrics` endpoint for Prometheus to scrape.
///
/// When metrics are disabled, this is a no-op. The `metrics` crate
/// handles unregistered metrics gracefully (they become no-ops).
pub fn init(config: &MetricsConfig) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(config.listen)
        .install()
        .map_err(|e| Error::Metrics(e.to_string()))?;

    describe();
    Ok(())
}

fn describe() {
    metrics::describe_counter!(PACKETS_TOTAL, "DNS responses captured");
    metrics::describe_counter!(DECODE_ERRORS_TOTAL, "DNS responses dropped as malformed");
    metrics::describe_counter!(BLACKHOLED_TOTAL, "Hosts newly seen resolving to 0.0.0.0");
    metrics::describe_counter!(LOOKUPS_TOTAL, "Out-of-band lookups by outcome");
    metrics::describe_counter!(RECORDS_APPENDED_TOTAL, "Records appended to the hosts file");
    metrics::describe_counter!(CACHE_FLUSHES_TOTAL, "Resolver cache flushes by outcome");
    metrics::describe_gauge!(PENDING_HOSTS, "Blackholed hosts waiting for resolution");
}
