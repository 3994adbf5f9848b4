//! Performance metrics collection for campusdb
//!
//! Query and dataset counters are recorded through the `metrics` facade and
//! exposed in Prometheus format once [`init_metrics`] installs the exporter.
//! Without an exporter the calls are no-ops.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

use crate::storage::record::DatasetKind;

/// Initialize the metrics collection system
pub fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    Ok(())
}

/// Record a successful query
pub fn record_query(duration_ms: f64, rows: usize) {
    histogram!("campusdb.query.duration_ms").record(duration_ms);
    histogram!("campusdb.query.rows").record(rows as f64);
}

/// Record a rejected or failed query by error category
pub fn record_query_failure(category: &'static str) {
    counter!("campusdb.query.failures", "category" => category).increment(1);
}

/// Record a dataset being added
pub fn record_dataset_added(kind: DatasetKind, rows: usize) {
    counter!("campusdb.datasets.added", "kind" => kind.as_str()).increment(1);
    counter!("campusdb.datasets.rows_added").increment(rows as u64);
}

/// Record a dataset being removed
pub fn record_dataset_removed(kind: DatasetKind) {
    counter!("campusdb.datasets.removed", "kind" => kind.as_str()).increment(1);
}

/// Update the number of stored datasets
pub fn update_dataset_count(count: usize) {
    gauge!("campusdb.datasets.count").set(count as f64);
}
