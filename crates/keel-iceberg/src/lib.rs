//! # keel-iceberg
//!
//! The snapshot-based table format contract used by the keel catalog.
//!
//! The catalog treats the table format as an external collaborator: it sends
//! schemas, partition specs and data files, and gets back table handles whose
//! metadata it reads and whose pending updates it commits. This crate defines
//! that contract:
//!
//! - **Types**: schemas, partition specs and transforms, data files with
//!   column metrics, table metadata and snapshots
//! - **Catalog**: [`TableCatalog`] (create, load, drop, rename) and
//!   [`TableOperations`] (read current metadata, commit a transition)
//! - **Pending updates**: append, replace-partitions, delete and schema
//!   updates, each committed as one metadata transition
//! - **Memory catalog**: [`MemoryCatalog`], an in-memory reference
//!   implementation with optimistic-concurrency commits
//!
//! ## Commit Model
//!
//! Every pending update is built against the metadata version the table
//! handle was loaded at. Committing swaps that version for a new one only if
//! no other writer committed in between; otherwise the commit fails with
//! [`IcebergError::CommitFailed`] and nothing becomes visible. There is no
//! retry at this layer.
//!
//! ## Example
//!
//! ```rust,ignore
//! use keel_iceberg::prelude::*;
//!
//! let catalog = MemoryCatalog::new("memory", "/warehouse");
//! let table = catalog.load_table(&TableIdent::new("sales", "orders")).await?;
//! let mut append = table.new_append();
//! append.append_file(file);
//! let snapshot_id = append.commit().await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod catalog;
pub mod error;
pub mod memory;
pub mod types;
pub mod update;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::catalog::{Table, TableCatalog, TableOperations};
    pub use crate::error::{IcebergError, IcebergResult};
    pub use crate::memory::MemoryCatalog;
    pub use crate::types::*;
    pub use crate::update::{AppendFiles, DeleteFiles, ReplacePartitions, UpdateSchema};
}

pub use catalog::{Table, TableCatalog, TableOperations};
pub use error::{IcebergError, IcebergResult};
pub use memory::MemoryCatalog;
