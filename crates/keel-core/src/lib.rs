//! # keel-core
//!
//! Shared primitives for the keel catalog service.
//!
//! This crate provides the foundational types used by the table-format and
//! catalog crates:
//!
//! - **Error Types**: Shared error definitions and result types
//! - **Observability**: Logging initialization and span constructors
//! - **Host Index**: A shared, deduplicated table of network addresses
//! - **Filesystem Contract**: File status and block-location queries, plus an
//!   in-memory backend for tests
//!
//! ## Example
//!
//! ```rust
//! use keel_core::prelude::*;
//!
//! let index = HostIndex::new();
//! let slot = index.get_or_insert(NetworkAddress::new("dn1.example.com", 9866));
//! assert_eq!(index.get_or_insert(NetworkAddress::new("dn1.example.com", 9866)), slot);
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod fs;
pub mod host_index;
pub mod observability;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::fs::{BlockLocation, BlockReplica, FileStatus, FileSystem, MemoryFileSystem};
    pub use crate::host_index::{HostIndex, NetworkAddress};
    pub use crate::observability::{LogFormat, init_logging};
}

pub use error::{Error, Result};
pub use fs::{BlockLocation, BlockReplica, FileStatus, FileSystem, MemoryFileSystem};
pub use host_index::{HostIndex, NetworkAddress};
pub use observability::{LogFormat, init_logging};
