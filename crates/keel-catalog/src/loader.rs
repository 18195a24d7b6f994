//! Loading of table metadata from the metastore and the table format.
//!
//! A load never fails outright: every error is folded into an
//! [`IncompleteTable`] placeholder so that one broken table cannot abort a
//! catalog-wide refresh.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{StreamExt, stream};
use keel_core::HostIndex;
use keel_core::observability::catalog_span;
use keel_iceberg::TableCatalog;
use keel_iceberg::types::TableIdent;
use tokio::sync::Mutex;
use tracing::Instrument;

use crate::config::CatalogConfig;
use crate::error::{CatalogError, CatalogResult, TableLoadingError};
use crate::events::{EventId, EventLog};
use crate::file_descriptor::FileDescriptorResolver;
use crate::metastore::{MetastoreClientPool, MetastoreTable};
use crate::metrics;
use crate::properties::{
    ICEBERG_CATALOG_LOCATION, ICEBERG_TABLE_IDENTIFIER, IcebergCatalogKind, WriteDefaults,
    is_iceberg_table,
};
use crate::reconciler::EventReconciler;
use crate::table::{FsTable, IcebergTable, IcebergTableInfo};

/// Serializes `get_table` calls across the process.
///
/// The metastore client is not safe for concurrent `get_table` calls
/// (HIVE-5457). Only that call is guarded.
static METASTORE_GET_TABLE_LOCK: Mutex<()> = Mutex::const_new(());

/// Placeholder for a table whose load failed.
#[derive(Debug, Clone)]
pub struct IncompleteTable {
    /// Database name.
    pub db_name: String,
    /// Table name.
    pub table_name: String,
    /// Creation event id the load was requested with.
    pub create_event_id: Option<EventId>,
    /// Why the load failed.
    pub error: TableLoadingError,
}

/// Outcome of loading one table.
#[derive(Debug, Clone)]
pub enum LoadResult {
    /// The table loaded.
    Loaded(Box<IcebergTable>),
    /// The table failed to load; the catalog keeps a placeholder.
    Failed(IncompleteTable),
}

impl LoadResult {
    /// Returns the loaded table, if any.
    #[must_use]
    pub fn table(&self) -> Option<&IcebergTable> {
        match self {
            Self::Loaded(table) => Some(table),
            Self::Failed(_) => None,
        }
    }

    /// Returns the loading error, if any.
    #[must_use]
    pub fn error(&self) -> Option<&TableLoadingError> {
        match self {
            Self::Loaded(_) => None,
            Self::Failed(incomplete) => Some(&incomplete.error),
        }
    }

    /// Returns true if the table loaded.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }
}

/// One table to load in a bulk refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    /// Database name.
    pub db_name: String,
    /// Table name.
    pub table_name: String,
    /// Creation event id known to the catalog, if any.
    pub create_event_id: Option<EventId>,
}

impl LoadRequest {
    /// Creates a request.
    #[must_use]
    pub fn new(
        db_name: impl Into<String>,
        table_name: impl Into<String>,
        create_event_id: Option<EventId>,
    ) -> Self {
        Self {
            db_name: db_name.into(),
            table_name: table_name.into(),
            create_event_id,
        }
    }
}

/// Loads table snapshots.
///
/// Cloning is cheap; clones share the pool, catalog and host index.
#[derive(Clone)]
pub struct TableLoader {
    pool: MetastoreClientPool,
    catalog: Arc<dyn TableCatalog>,
    resolver: FileDescriptorResolver,
    host_index: HostIndex,
    reconciler: Option<EventReconciler>,
    config: CatalogConfig,
}

impl std::fmt::Debug for TableLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableLoader")
            .field("pool", &self.pool)
            .field("catalog", &self.catalog.name())
            .field("hosts", &self.host_index.len())
            .field("event_processing", &self.reconciler.is_some())
            .finish_non_exhaustive()
    }
}

impl TableLoader {
    /// Creates a loader without event reconciliation.
    #[must_use]
    pub fn new(
        pool: MetastoreClientPool,
        catalog: Arc<dyn TableCatalog>,
        resolver: FileDescriptorResolver,
        mut config: CatalogConfig,
    ) -> Self {
        if config.load_concurrency == 0 {
            tracing::warn!("load_concurrency of 0 raised to 1");
            config.load_concurrency = 1;
        }
        Self {
            pool,
            catalog,
            resolver,
            host_index: HostIndex::new(),
            reconciler: None,
            config,
        }
    }

    /// Enables reconciliation of creation events against `log`.
    ///
    /// Ignored when event processing is disabled in the configuration.
    #[must_use]
    pub fn with_event_log(mut self, log: Arc<dyn EventLog>) -> Self {
        if self.config.event_processing_enabled {
            self.reconciler = Some(EventReconciler::new(log));
        }
        self
    }

    /// Shares `host_index` with other loaders.
    #[must_use]
    pub fn with_host_index(mut self, host_index: HostIndex) -> Self {
        self.host_index = host_index;
        self
    }

    /// Returns the host index descriptors refer to.
    #[must_use]
    pub fn host_index(&self) -> &HostIndex {
        &self.host_index
    }

    /// Loads one table.
    ///
    /// `create_event_id` is the creation event the catalog last saw for the
    /// table; `None` skips reconciliation. `reason` is logged.
    pub async fn load(
        &self,
        db_name: &str,
        table_name: &str,
        create_event_id: Option<EventId>,
        reason: &str,
    ) -> LoadResult {
        let span = catalog_span("load", db_name, table_name);
        async move {
            let start = Instant::now();
            tracing::info!(reason, "Loading metadata");

            let result = self.try_load(db_name, table_name, create_event_id).await;
            let elapsed = start.elapsed();
            let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
            metrics::record_table_load(elapsed, result.is_ok());

            match result {
                Ok(table) => {
                    tracing::info!(
                        duration_ms,
                        files = table.num_files(),
                        snapshot_id = table.snapshot_id(),
                        "Loaded metadata"
                    );
                    LoadResult::Loaded(Box::new(table))
                }
                Err(error) => {
                    let error = classify(error, db_name, table_name);
                    tracing::warn!(duration_ms, error = %error, "Loaded metadata with errors");
                    LoadResult::Failed(IncompleteTable {
                        db_name: db_name.to_string(),
                        table_name: table_name.to_string(),
                        create_event_id,
                        error,
                    })
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Loads many tables, at most `load_concurrency` at a time.
    ///
    /// Results come back in request order. A failed table never affects the
    /// others.
    pub async fn load_all(&self, requests: Vec<LoadRequest>, reason: &str) -> Vec<LoadResult> {
        stream::iter(requests)
            .map(|request| async move {
                self.load(
                    &request.db_name,
                    &request.table_name,
                    request.create_event_id,
                    reason,
                )
                .await
            })
            .buffered(self.config.load_concurrency)
            .collect()
            .await
    }

    async fn try_load(
        &self,
        db_name: &str,
        table_name: &str,
        known_event_id: Option<EventId>,
    ) -> CatalogResult<IcebergTable> {
        let full_name = format!("{db_name}.{table_name}");

        let (msd, fetch_latency) = {
            let client = self.pool.acquire().await?;
            let fetch_start = Instant::now();
            let msd = {
                let _guard = METASTORE_GET_TABLE_LOCK.lock().await;
                client.get_table(db_name, table_name).await?
            };
            (msd, fetch_start.elapsed())
        };

        let mut create_event_id = known_event_id;
        if let (Some(known), Some(reconciler)) = (known_event_id, &self.reconciler) {
            create_event_id = Some(reconciler.reconcile(known, db_name, table_name).await?);
        }

        if !msd.table_type.is_supported() {
            return Err(TableLoadingError::new(format!(
                "Unsupported table type '{}' for: {full_name}",
                msd.table_type
            ))
            .into());
        }
        if !is_iceberg_table(&msd.parameters) {
            return Err(TableLoadingError::new(format!(
                "Unrecognized table type for table: {full_name}"
            ))
            .into());
        }

        let table = self
            .load_iceberg(&msd, create_event_id, fetch_latency)
            .await?;
        table.validate()?;
        Ok(table)
    }

    async fn load_iceberg(
        &self,
        msd: &MetastoreTable,
        create_event_id: Option<EventId>,
        metastore_fetch_latency: Duration,
    ) -> CatalogResult<IcebergTable> {
        let catalog_kind = IcebergCatalogKind::from_properties(&msd.parameters)
            .unwrap_or(self.config.default_iceberg_catalog);
        let ident = match msd.parameters.get(ICEBERG_TABLE_IDENTIFIER) {
            Some(value) => TableIdent::parse(value)?,
            None => TableIdent::new(&msd.db_name, &msd.table_name),
        };

        let handle = self.catalog.load_table(&ident).await?;
        let metadata = handle.metadata();
        let file_descriptors = self
            .resolver
            .resolve_all(&metadata.location, metadata.data_files(), &self.host_index)
            .await?;

        // Format-side properties win over stale copies in the metastore.
        let mut properties: HashMap<String, String> = msd.parameters.clone();
        properties.extend(metadata.properties.clone());
        let write_defaults = WriteDefaults::from_properties(&properties);

        let fs_table = FsTable::new(
            &msd.db_name,
            &msd.table_name,
            metadata.location.clone(),
            msd.table_type.clone(),
            write_defaults.file_format,
            msd.parameters.clone(),
        )
        .with_file_descriptors(file_descriptors, self.host_index.clone());
        let info = IcebergTableInfo {
            ident,
            catalog_kind,
            catalog_location: msd.parameters.get(ICEBERG_CATALOG_LOCATION).cloned(),
            create_event_id,
            metastore_fetch_latency,
        };
        Ok(IcebergTable::from_metadata(
            fs_table,
            info,
            metadata,
            write_defaults,
        )?)
    }
}

fn classify(error: CatalogError, db_name: &str, table_name: &str) -> TableLoadingError {
    let full_name = format!("{db_name}.{table_name}");
    let not_found = matches!(&error, CatalogError::Metastore(e) if e.is_no_such_object());
    match error {
        CatalogError::TableLoading(error) => error,
        error if not_found => TableLoadingError::with_cause(
            format!(
                "Table {full_name} no longer exists in the metastore. \
                 Run 'invalidate metadata {full_name}' to update the catalog."
            ),
            error.into_cause(),
        ),
        error => TableLoadingError::with_cause(
            format!(
                "Failed to load metadata for table: {full_name}. \
                 Running 'invalidate metadata {full_name}' may resolve this problem."
            ),
            error.into_cause(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::MemoryFileSystem;
    use keel_iceberg::MemoryCatalog;
    use keel_iceberg::types::{NestedField, PartitionSpec, PrimitiveType, Schema};

    use crate::events::{CREATE_TABLE, MemoryEventLog};
    use crate::metastore::{MemoryMetastore, MetastoreClient, TableType};
    use crate::properties::{ICEBERG_STORAGE_HANDLER, STORAGE_HANDLER};

    struct Fixture {
        metastore: Arc<MemoryMetastore>,
        catalog: Arc<MemoryCatalog>,
        loader: TableLoader,
    }

    fn fixture() -> Fixture {
        let metastore = Arc::new(MemoryMetastore::new());
        let catalog = Arc::new(MemoryCatalog::new("test", "/warehouse"));
        let pool = MetastoreClientPool::shared(
            Arc::clone(&metastore) as Arc<dyn MetastoreClient>,
            2,
        );
        let loader = TableLoader::new(
            pool,
            Arc::clone(&catalog) as Arc<dyn TableCatalog>,
            FileDescriptorResolver::new(Arc::new(MemoryFileSystem::new())),
            CatalogConfig::default(),
        );
        Fixture {
            metastore,
            catalog,
            loader,
        }
    }

    async fn create_iceberg(fixture: &Fixture, db: &str, name: &str) {
        let schema = Schema::new(vec![NestedField::required(1, "id", PrimitiveType::Long)]);
        fixture
            .catalog
            .create_table(
                &TableIdent::new(db, name),
                schema,
                PartitionSpec::unpartitioned(),
                None,
                HashMap::new(),
            )
            .await
            .expect("create");
        fixture.metastore.put_table(
            MetastoreTable::new(db, name, TableType::External)
                .with_parameter(STORAGE_HANDLER, ICEBERG_STORAGE_HANDLER),
        );
    }

    #[tokio::test]
    async fn test_zero_load_concurrency_still_loads() {
        let metastore = Arc::new(MemoryMetastore::new());
        let catalog = Arc::new(MemoryCatalog::new("test", "/warehouse"));
        let fixture = Fixture {
            loader: TableLoader::new(
                MetastoreClientPool::shared(Arc::clone(&metastore) as Arc<dyn MetastoreClient>, 1),
                Arc::clone(&catalog) as Arc<dyn TableCatalog>,
                FileDescriptorResolver::new(Arc::new(MemoryFileSystem::new())),
                CatalogConfig {
                    load_concurrency: 0,
                    ..CatalogConfig::default()
                },
            ),
            metastore,
            catalog,
        };
        create_iceberg(&fixture, "sales", "orders").await;

        let results = tokio::time::timeout(
            Duration::from_secs(5),
            fixture.loader.load_all(
                vec![
                    LoadRequest::new("sales", "orders", None),
                    LoadRequest::new("sales", "gone", None),
                ],
                "test",
            ),
        )
        .await
        .expect("bulk load finishes");
        let loaded: Vec<bool> = results.iter().map(LoadResult::is_loaded).collect();
        assert_eq!(loaded, vec![true, false]);
    }

    #[tokio::test]
    async fn test_load_empty_table() {
        let fixture = fixture();
        create_iceberg(&fixture, "sales", "orders").await;

        let result = fixture.loader.load("sales", "orders", None, "test").await;
        let table = result.table().expect("loaded");
        assert_eq!(table.num_files(), 0);
        assert_eq!(table.snapshot_id(), None);
        assert_eq!(table.default_spec_id(), 0);
    }

    #[tokio::test]
    async fn test_missing_metastore_table_is_placeholder() {
        let fixture = fixture();
        let result = fixture.loader.load("sales", "gone", Some(3), "test").await;
        let LoadResult::Failed(incomplete) = result else {
            panic!("expected failure");
        };
        assert_eq!(incomplete.create_event_id, Some(3));
        assert_eq!(
            incomplete.error.message(),
            "Table sales.gone no longer exists in the metastore. \
             Run 'invalidate metadata sales.gone' to update the catalog."
        );
    }

    #[tokio::test]
    async fn test_non_iceberg_table_is_unrecognized() {
        let fixture = fixture();
        fixture
            .metastore
            .put_table(MetastoreTable::new("sales", "plain", TableType::Managed));
        let result = fixture.loader.load("sales", "plain", None, "test").await;
        assert_eq!(
            result.error().expect("failed").message(),
            "Unrecognized table type for table: sales.plain"
        );
    }

    #[tokio::test]
    async fn test_missing_format_table_gets_generic_message() {
        let fixture = fixture();
        fixture.metastore.put_table(
            MetastoreTable::new("sales", "orphan", TableType::External)
                .with_parameter(STORAGE_HANDLER, ICEBERG_STORAGE_HANDLER),
        );
        let result = fixture.loader.load("sales", "orphan", None, "test").await;
        let error = result.error().expect("failed");
        assert!(error.message().starts_with("Failed to load metadata for table: sales.orphan."));
        assert!(error.cause().is_some());
    }

    #[tokio::test]
    async fn test_reconciles_create_event() {
        let fixture = fixture();
        create_iceberg(&fixture, "sales", "orders").await;
        let log = Arc::new(MemoryEventLog::new());
        log.append(CREATE_TABLE, "sales", "orders");
        let recreated = log.append(CREATE_TABLE, "sales", "orders");

        let loader = fixture.loader.clone().with_event_log(log);
        let result = loader.load("sales", "orders", Some(1), "test").await;
        assert_eq!(result.table().expect("loaded").create_event_id(), Some(recreated));
    }

    #[tokio::test]
    async fn test_table_identifier_property() {
        let fixture = fixture();
        create_iceberg(&fixture, "lake", "raw_orders").await;
        fixture.metastore.put_table(
            MetastoreTable::new("sales", "orders", TableType::External)
                .with_parameter(STORAGE_HANDLER, ICEBERG_STORAGE_HANDLER)
                .with_parameter(ICEBERG_TABLE_IDENTIFIER, "lake.raw_orders"),
        );
        let result = fixture.loader.load("sales", "orders", None, "test").await;
        let table = result.table().expect("loaded");
        assert_eq!(table.ident(), &TableIdent::new("lake", "raw_orders"));
        assert_eq!(table.full_name(), "sales.orders");
    }
}
