//! Catalog and table-operations contracts.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::IcebergResult;
use crate::types::{PartitionSpec, Schema, TableIdent, TableMetadata};
use crate::update::{AppendFiles, DeleteFiles, ReplacePartitions, UpdateSchema};

/// Low-level access to one table's metadata.
///
/// Implementations provide optimistic concurrency: `commit` succeeds only if
/// `base` is still the table's current metadata version.
#[async_trait]
pub trait TableOperations: Send + Sync + 'static {
    /// Reads the table's current metadata.
    async fn current(&self) -> IcebergResult<TableMetadata>;

    /// Atomically replaces `base` with `metadata`.
    ///
    /// Returns `IcebergError::CommitFailed` if another commit happened since
    /// `base` was read. Never retries.
    async fn commit(&self, base: &TableMetadata, metadata: TableMetadata) -> IcebergResult<()>;
}

/// A catalog of tables in the external format.
#[async_trait]
pub trait TableCatalog: Send + Sync + 'static {
    /// Returns the catalog name, used in log lines.
    fn name(&self) -> &str;

    /// Creates a table and returns a handle to it.
    ///
    /// When `location` is `None` the catalog picks one.
    async fn create_table(
        &self,
        ident: &TableIdent,
        schema: Schema,
        spec: PartitionSpec,
        location: Option<&str>,
        properties: HashMap<String, String>,
    ) -> IcebergResult<Table>;

    /// Loads a table.
    ///
    /// Returns `IcebergError::NoSuchTable` if the table doesn't exist.
    async fn load_table(&self, ident: &TableIdent) -> IcebergResult<Table>;

    /// Drops a table. Returns false if it didn't exist.
    async fn drop_table(&self, ident: &TableIdent, purge: bool) -> IcebergResult<bool>;

    /// Renames a table.
    async fn rename_table(&self, from: &TableIdent, to: &TableIdent) -> IcebergResult<()>;
}

/// Handle to a loaded table.
///
/// The handle captures the metadata version it was loaded at; pending updates
/// created from it commit against that version.
#[derive(Clone)]
pub struct Table {
    ident: TableIdent,
    metadata: TableMetadata,
    ops: Arc<dyn TableOperations>,
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("ident", &self.ident)
            .field("metadata_version", &self.metadata.metadata_version)
            .finish_non_exhaustive()
    }
}

impl Table {
    /// Creates a handle from already-loaded metadata.
    #[must_use]
    pub fn new(ident: TableIdent, metadata: TableMetadata, ops: Arc<dyn TableOperations>) -> Self {
        Self {
            ident,
            metadata,
            ops,
        }
    }

    /// Returns the table identifier.
    #[must_use]
    pub fn ident(&self) -> &TableIdent {
        &self.ident
    }

    /// Returns the metadata this handle was loaded at.
    #[must_use]
    pub fn metadata(&self) -> &TableMetadata {
        &self.metadata
    }

    /// Returns the table location.
    #[must_use]
    pub fn location(&self) -> &str {
        &self.metadata.location
    }

    /// Returns the table operations.
    #[must_use]
    pub fn operations(&self) -> Arc<dyn TableOperations> {
        Arc::clone(&self.ops)
    }

    /// Re-reads the current metadata.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`TableOperations::current`].
    pub async fn refresh(&mut self) -> IcebergResult<()> {
        self.metadata = self.ops.current().await?;
        Ok(())
    }

    /// Starts an append of new data files.
    #[must_use]
    pub fn new_append(&self) -> AppendFiles {
        AppendFiles::new(self.metadata.clone(), self.operations())
    }

    /// Starts a dynamic partition overwrite.
    #[must_use]
    pub fn new_replace_partitions(&self) -> ReplacePartitions {
        ReplacePartitions::new(self.metadata.clone(), self.operations())
    }

    /// Starts a file deletion.
    #[must_use]
    pub fn new_delete(&self) -> DeleteFiles {
        DeleteFiles::new(self.metadata.clone(), self.operations())
    }

    /// Starts a schema update.
    ///
    /// # Errors
    ///
    /// Returns an error if the current schema cannot be resolved.
    pub fn update_schema(&self) -> IcebergResult<UpdateSchema> {
        UpdateSchema::new(self.metadata.clone(), self.operations())
    }
}
