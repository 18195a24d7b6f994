//! Observability infrastructure for keel.
//!
//! Structured logging with consistent spans. Catalog loads and commits run
//! inside spans carrying the database and table they operate on, so that log
//! lines from concurrent loads can be told apart.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `keel_catalog=debug`)
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let registry = tracing_subscriber::registry().with(env_filter);
        let result = match format {
            LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
            LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
        };
        if let Err(e) = result {
            eprintln!("logging already initialized: {e}");
        }
    });
}

/// Creates a span for table metadata loads.
///
/// # Example
///
/// ```rust
/// use keel_core::observability::catalog_span;
///
/// let span = catalog_span("load", "sales", "orders");
/// let _guard = span.enter();
/// ```
#[must_use]
pub fn catalog_span(operation: &str, database: &str, table: &str) -> Span {
    tracing::info_span!("catalog", op = operation, db = database, table = table)
}

/// Creates a span for table-format commits (DML and DDL).
#[must_use]
pub fn commit_span(operation: &str, database: &str, table: &str) -> Span {
    tracing::info_span!("commit", op = operation, db = database, table = table)
}
