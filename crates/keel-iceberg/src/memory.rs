//! In-memory table catalog.
//!
//! Commits swap metadata only when the base version matches the stored
//! version, so concurrent writers observe the same conflicts a real catalog
//! would raise.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::catalog::{Table, TableCatalog, TableOperations};
use crate::error::{IcebergError, IcebergResult};
use crate::types::{PartitionSpec, Schema, TableIdent, TableMetadata};

type Tables = Arc<RwLock<HashMap<TableIdent, TableMetadata>>>;

fn poisoned() -> IcebergError {
    IcebergError::Internal {
        message: "lock poisoned".into(),
    }
}

/// In-memory [`TableCatalog`].
#[derive(Debug, Clone)]
pub struct MemoryCatalog {
    name: String,
    warehouse: String,
    tables: Tables,
}

impl MemoryCatalog {
    /// Creates an empty catalog rooted at `warehouse`.
    #[must_use]
    pub fn new(name: impl Into<String>, warehouse: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            warehouse: warehouse.into(),
            tables: Arc::default(),
        }
    }

    /// Returns the identifiers of all tables.
    ///
    /// # Errors
    ///
    /// Returns `IcebergError::Internal` if the table map is poisoned.
    pub fn list_tables(&self) -> IcebergResult<Vec<TableIdent>> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        let mut idents: Vec<_> = tables.keys().cloned().collect();
        idents.sort();
        Ok(idents)
    }

    fn default_location(&self, ident: &TableIdent) -> String {
        format!(
            "{}/{}/{}",
            self.warehouse.trim_end_matches('/'),
            ident.namespace,
            ident.name
        )
    }

    fn table(&self, ident: &TableIdent, metadata: TableMetadata) -> Table {
        let ops = MemoryTableOperations {
            ident: ident.clone(),
            tables: Arc::clone(&self.tables),
        };
        Table::new(ident.clone(), metadata, Arc::new(ops))
    }
}

#[async_trait]
impl TableCatalog for MemoryCatalog {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create_table(
        &self,
        ident: &TableIdent,
        schema: Schema,
        spec: PartitionSpec,
        location: Option<&str>,
        properties: HashMap<String, String>,
    ) -> IcebergResult<Table> {
        let location = location.map_or_else(|| self.default_location(ident), str::to_string);
        let metadata = TableMetadata::new(location, schema, spec, properties)?;

        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        if tables.contains_key(ident) {
            return Err(IcebergError::table_already_exists(ident));
        }
        tables.insert(ident.clone(), metadata.clone());
        drop(tables);

        tracing::debug!(catalog = %self.name, table = %ident, "created table");
        Ok(self.table(ident, metadata))
    }

    async fn load_table(&self, ident: &TableIdent) -> IcebergResult<Table> {
        let metadata = self
            .tables
            .read()
            .map_err(|_| poisoned())?
            .get(ident)
            .cloned()
            .ok_or_else(|| IcebergError::table_not_found(ident))?;
        Ok(self.table(ident, metadata))
    }

    async fn drop_table(&self, ident: &TableIdent, purge: bool) -> IcebergResult<bool> {
        let removed = self
            .tables
            .write()
            .map_err(|_| poisoned())?
            .remove(ident)
            .is_some();
        if removed {
            tracing::debug!(catalog = %self.name, table = %ident, purge, "dropped table");
        }
        Ok(removed)
    }

    async fn rename_table(&self, from: &TableIdent, to: &TableIdent) -> IcebergResult<()> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        if tables.contains_key(to) {
            return Err(IcebergError::table_already_exists(to));
        }
        let metadata = tables
            .remove(from)
            .ok_or_else(|| IcebergError::table_not_found(from))?;
        tables.insert(to.clone(), metadata);
        Ok(())
    }
}

/// [`TableOperations`] over one entry of a [`MemoryCatalog`].
#[derive(Debug, Clone)]
pub struct MemoryTableOperations {
    ident: TableIdent,
    tables: Tables,
}

#[async_trait]
impl TableOperations for MemoryTableOperations {
    async fn current(&self) -> IcebergResult<TableMetadata> {
        self.tables
            .read()
            .map_err(|_| poisoned())?
            .get(&self.ident)
            .cloned()
            .ok_or_else(|| IcebergError::table_not_found(&self.ident))
    }

    async fn commit(&self, base: &TableMetadata, mut metadata: TableMetadata) -> IcebergResult<()> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        let current = tables
            .get_mut(&self.ident)
            .ok_or_else(|| IcebergError::table_not_found(&self.ident))?;

        if current.metadata_version != base.metadata_version
            || current.table_uuid != base.table_uuid
        {
            return Err(IcebergError::commit_conflict(format!(
                "base metadata version {} is stale for {}, current is {}",
                base.metadata_version, self.ident, current.metadata_version
            )));
        }

        metadata.metadata_version = base.metadata_version + 1;
        *current = metadata;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NestedField, PrimitiveType};

    fn schema() -> Schema {
        Schema::new(vec![
            NestedField::required(1, "id", PrimitiveType::Long),
            NestedField::optional(2, "region", PrimitiveType::String),
        ])
    }

    fn ident() -> TableIdent {
        TableIdent::new("sales", "orders")
    }

    #[tokio::test]
    async fn test_create_and_load() {
        let catalog = MemoryCatalog::new("memory", "/warehouse/");
        let created = catalog
            .create_table(&ident(), schema(), PartitionSpec::unpartitioned(), None, HashMap::new())
            .await
            .expect("create");
        assert_eq!(created.location(), "/warehouse/sales/orders");

        let loaded = catalog.load_table(&ident()).await.expect("load");
        assert_eq!(loaded.metadata(), created.metadata());
        assert_eq!(catalog.list_tables().expect("list"), vec![ident()]);
    }

    #[tokio::test]
    async fn test_create_existing_fails() {
        let catalog = MemoryCatalog::new("memory", "/warehouse");
        catalog
            .create_table(&ident(), schema(), PartitionSpec::unpartitioned(), Some("/x"), HashMap::new())
            .await
            .expect("create");
        let err = catalog
            .create_table(&ident(), schema(), PartitionSpec::unpartitioned(), None, HashMap::new())
            .await
            .expect_err("duplicate");
        assert!(matches!(err, IcebergError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_drop_and_rename() {
        let catalog = MemoryCatalog::new("memory", "/warehouse");
        catalog
            .create_table(&ident(), schema(), PartitionSpec::unpartitioned(), None, HashMap::new())
            .await
            .expect("create");

        let renamed = TableIdent::new("sales", "orders_v2");
        catalog.rename_table(&ident(), &renamed).await.expect("rename");
        assert!(catalog.load_table(&ident()).await.expect_err("gone").is_not_found());
        assert!(
            catalog
                .rename_table(&ident(), &TableIdent::new("sales", "other"))
                .await
                .expect_err("missing source")
                .is_not_found()
        );

        assert!(catalog.drop_table(&renamed, true).await.expect("drop"));
        assert!(!catalog.drop_table(&renamed, true).await.expect("drop again"));
    }

    #[tokio::test]
    async fn test_commit_rejects_stale_base() {
        let catalog = MemoryCatalog::new("memory", "/warehouse");
        let table = catalog
            .create_table(&ident(), schema(), PartitionSpec::unpartitioned(), None, HashMap::new())
            .await
            .expect("create");
        let ops = table.operations();
        let base = table.metadata().clone();

        ops.commit(&base, base.clone()).await.expect("first commit");
        let err = ops
            .commit(&base, base.clone())
            .await
            .expect_err("stale base");
        assert!(err.is_commit_conflict());
        assert_eq!(ops.current().await.expect("current").metadata_version, 1);
    }
}
