//! # keel-catalog
//!
//! Metadata loading and commit protocol for snapshot-format tables.
//!
//! The catalog reconciles three sources of truth that evolve independently:
//! the metastore's table definition, an ordered log of creation events, and
//! the table format's snapshot history.
//!
//! - **Loading**: [`TableLoader`] fetches a table definition under a
//!   process-wide lock, checks for silent recreation via the
//!   [`EventReconciler`], loads the format's metadata and resolves every data
//!   file into a [`FileDescriptor`]. Any failure becomes an
//!   [`IncompleteTable`] placeholder; a load never aborts a refresh.
//! - **Partition specs**: [`PartitionSpecTranslator`] converts specs
//!   between the format and the catalog; [`partition_path`] decodes the
//!   Hive-style partition paths reported by writers.
//! - **Commits**: [`CommitBatch`] publishes the files written by one
//!   statement as an append or a dynamic partition overwrite;
//!   [`IcebergCatalogOps`] runs DDL, each change as one commit.
//!
//! ## Example
//!
//! ```rust,ignore
//! use keel_catalog::prelude::*;
//!
//! let loader = TableLoader::new(pool, catalog, resolver, CatalogConfig::from_env()?)
//!     .with_event_log(event_log);
//! match loader.load("sales", "orders", Some(last_event_id), "refresh").await {
//!     LoadResult::Loaded(table) => publish(table),
//!     LoadResult::Failed(incomplete) => publish_placeholder(incomplete),
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod commit;
pub mod config;
pub mod ddl;
pub mod error;
pub mod events;
pub mod file_descriptor;
pub mod loader;
pub mod metastore;
pub mod metrics;
pub mod partition_path;
pub mod partition_spec;
pub mod properties;
pub mod reconciler;
pub mod table;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::commit::{
        ColumnStatsRecord, CommitBatch, DataFileRecord, FileFormatTag, IcebergOperationParam,
    };
    pub use crate::config::CatalogConfig;
    pub use crate::ddl::{ColumnDef, ColumnType, IcebergCatalogOps};
    pub use crate::error::{CatalogError, CatalogResult, TableLoadingError};
    pub use crate::events::{EventId, EventLog, MemoryEventLog, NotificationEvent};
    pub use crate::file_descriptor::{FileDescriptor, FileDescriptorResolver, path_hash};
    pub use crate::loader::{IncompleteTable, LoadRequest, LoadResult, TableLoader};
    pub use crate::metastore::{
        MemoryMetastore, MetastoreClient, MetastoreClientPool, MetastoreError, MetastoreTable,
        TableType,
    };
    pub use crate::partition_spec::{
        IcebergPartitionField, IcebergPartitionSpec, IcebergPartitionTransform,
        IcebergTransformType, PartitionSpecTranslator,
    };
    pub use crate::reconciler::EventReconciler;
    pub use crate::table::{FsTable, IcebergTable, IcebergTableDescriptor};
}

pub use commit::{CommitBatch, DataFileRecord, IcebergOperationParam};
pub use config::CatalogConfig;
pub use ddl::IcebergCatalogOps;
pub use error::{CatalogError, CatalogResult, TableLoadingError};
pub use file_descriptor::{FileDescriptor, FileDescriptorResolver};
pub use loader::{IncompleteTable, LoadResult, TableLoader};
pub use partition_spec::{IcebergPartitionSpec, PartitionSpecTranslator};
pub use reconciler::EventReconciler;
pub use table::IcebergTable;
