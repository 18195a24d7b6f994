//! Metrics emitted by the catalog.
//!
//! Recording goes through the `metrics` facade; installing an exporter is
//! left to the embedding service.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};

/// Table load duration histogram.
pub const TABLE_LOAD_DURATION: &str = "keel_table_load_duration_seconds";

/// Failed table load counter.
pub const TABLE_LOAD_FAILURES_TOTAL: &str = "keel_table_load_failures_total";

/// Block replicas whose disk could not be resolved.
pub const UNKNOWN_DISK_IDS_TOTAL: &str = "keel_unknown_disk_ids_total";

/// Table-format commit counter.
pub const ICEBERG_COMMITS_TOTAL: &str = "keel_iceberg_commits_total";

/// Table-format commits rejected because another writer committed first.
pub const ICEBERG_COMMIT_CONFLICTS_TOTAL: &str = "keel_iceberg_commit_conflicts_total";

static METRICS_REGISTERED: OnceLock<()> = OnceLock::new();

/// Registers metric descriptions.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn register_metrics() {
    METRICS_REGISTERED.get_or_init(|| {
        describe_histogram!(
            TABLE_LOAD_DURATION,
            "Duration of table metadata loads in seconds"
        );
        describe_counter!(
            TABLE_LOAD_FAILURES_TOTAL,
            "Total number of table loads that produced a placeholder"
        );
        describe_counter!(
            UNKNOWN_DISK_IDS_TOTAL,
            "Total number of block replicas with an unresolved disk id"
        );
        describe_counter!(
            ICEBERG_COMMITS_TOTAL,
            "Total number of table-format commits attempted"
        );
        describe_counter!(
            ICEBERG_COMMIT_CONFLICTS_TOTAL,
            "Total number of table-format commits lost to a concurrent writer"
        );
    });
}

/// Records one table load.
pub fn record_table_load(duration: Duration, success: bool) {
    register_metrics();
    let outcome = if success { "loaded" } else { "failed" };
    histogram!(TABLE_LOAD_DURATION, "outcome" => outcome).record(duration.as_secs_f64());
    if !success {
        counter!(TABLE_LOAD_FAILURES_TOTAL).increment(1);
    }
}

/// Records replicas with unresolved disk ids.
pub fn record_unknown_disk_ids(count: u32) {
    if count > 0 {
        register_metrics();
        counter!(UNKNOWN_DISK_IDS_TOTAL).increment(u64::from(count));
    }
}

/// Records the outcome of one commit.
pub fn record_commit(operation: &'static str, conflict: bool) {
    register_metrics();
    counter!(ICEBERG_COMMITS_TOTAL, "operation" => operation).increment(1);
    if conflict {
        counter!(ICEBERG_COMMIT_CONFLICTS_TOTAL, "operation" => operation).increment(1);
    }
}
