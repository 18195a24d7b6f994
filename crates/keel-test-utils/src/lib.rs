//! Shared test utilities for keel integration tests.
//!
//! This crate provides:
//! - [`RecordingTableCatalog`]: a table-format catalog wrapper that records
//!   every external call, including commits made through loaded handles
//! - [`RecordingMetastore`]: an in-memory metastore that tracks concurrency
//!   and can inject latency or failures
//! - [`FailingEventLog`]: an event log whose reads always fail
//! - [`TestCatalog`]: a pre-wired loader and DDL executor over in-memory
//!   collaborators
//!
//! # Example
//!
//! ```rust,ignore
//! use keel_test_utils::{TestCatalog, orders_columns};
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let ctx = TestCatalog::new();
//!     let table = ctx.create_iceberg_table("sales", "orders", &orders_columns(), None).await;
//!     // ... run test ...
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
// Test utilities use expect/unwrap for cleaner test code - panics are acceptable in tests
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]

pub mod fixtures;
pub mod recording;

pub use fixtures::*;
pub use recording::*;

/// Initialize test logging (call once per test module).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("keel=debug".parse().expect("valid directive")),
        )
        .with_test_writer()
        .try_init();
}
