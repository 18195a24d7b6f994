//! Collaborators that record the calls made to them.
//!
//! Tests use these to assert how many external calls an operation made,
//! not only what it returned.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use keel_catalog::error::{CatalogError, CatalogResult};
use keel_catalog::events::{EventId, EventLog, NotificationEvent};
use keel_catalog::metastore::{MemoryMetastore, MetastoreClient, MetastoreError, MetastoreTable};
use keel_iceberg::types::{PartitionSpec, Schema, TableIdent, TableMetadata};
use keel_iceberg::{IcebergResult, Table, TableCatalog, TableOperations};

/// Record of a call made to the table-format catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogCall {
    /// A table was created.
    Create {
        /// Table created.
        ident: TableIdent,
    },
    /// A table was loaded.
    Load {
        /// Table loaded.
        ident: TableIdent,
    },
    /// A table was dropped.
    Drop {
        /// Table dropped.
        ident: TableIdent,
    },
    /// A table was renamed.
    Rename {
        /// Old name.
        from: TableIdent,
        /// New name.
        to: TableIdent,
    },
    /// Current metadata was re-read through a table handle.
    Refresh {
        /// Table refreshed.
        ident: TableIdent,
    },
    /// A metadata commit was attempted through a table handle.
    Commit {
        /// Table committed to.
        ident: TableIdent,
        /// Whether the commit succeeded.
        succeeded: bool,
    },
}

/// Table-format catalog wrapper that records every call.
///
/// Handles returned by `create_table` and `load_table` are rewired so their
/// commits are recorded too.
#[derive(Clone)]
pub struct RecordingTableCatalog {
    inner: Arc<dyn TableCatalog>,
    calls: Arc<Mutex<Vec<CatalogCall>>>,
}

impl std::fmt::Debug for RecordingTableCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingTableCatalog")
            .field("inner", &self.inner.name())
            .field("calls", &self.calls.lock().expect("lock").len())
            .finish()
    }
}

impl RecordingTableCatalog {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn TableCatalog>) -> Self {
        Self {
            inner,
            calls: Arc::default(),
        }
    }

    /// Returns all recorded calls.
    #[must_use]
    pub fn calls(&self) -> Vec<CatalogCall> {
        self.calls.lock().expect("lock").clone()
    }

    /// Returns the number of recorded calls.
    #[must_use]
    pub fn external_calls(&self) -> usize {
        self.calls.lock().expect("lock").len()
    }

    /// Returns the number of table loads.
    #[must_use]
    pub fn loads(&self) -> usize {
        self.count(|call| matches!(call, CatalogCall::Load { .. }))
    }

    /// Returns the number of commit attempts, successful or not.
    #[must_use]
    pub fn commits(&self) -> usize {
        self.count(|call| matches!(call, CatalogCall::Commit { .. }))
    }

    /// Returns the number of successful commits.
    #[must_use]
    pub fn successful_commits(&self) -> usize {
        self.count(|call| matches!(call, CatalogCall::Commit { succeeded: true, .. }))
    }

    /// Clears recorded calls.
    pub fn clear(&self) {
        self.calls.lock().expect("lock").clear();
    }

    fn count(&self, predicate: impl Fn(&CatalogCall) -> bool) -> usize {
        self.calls
            .lock()
            .expect("lock")
            .iter()
            .filter(|call| predicate(call))
            .count()
    }

    fn record(&self, call: CatalogCall) {
        self.calls.lock().expect("lock").push(call);
    }

    fn rewire(&self, table: Table) -> Table {
        let ops = RecordingTableOperations {
            ident: table.ident().clone(),
            inner: table.operations(),
            calls: Arc::clone(&self.calls),
        };
        Table::new(table.ident().clone(), table.metadata().clone(), Arc::new(ops))
    }
}

#[async_trait]
impl TableCatalog for RecordingTableCatalog {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn create_table(
        &self,
        ident: &TableIdent,
        schema: Schema,
        spec: PartitionSpec,
        location: Option<&str>,
        properties: HashMap<String, String>,
    ) -> IcebergResult<Table> {
        self.record(CatalogCall::Create {
            ident: ident.clone(),
        });
        let table = self
            .inner
            .create_table(ident, schema, spec, location, properties)
            .await?;
        Ok(self.rewire(table))
    }

    async fn load_table(&self, ident: &TableIdent) -> IcebergResult<Table> {
        self.record(CatalogCall::Load {
            ident: ident.clone(),
        });
        let table = self.inner.load_table(ident).await?;
        Ok(self.rewire(table))
    }

    async fn drop_table(&self, ident: &TableIdent, purge: bool) -> IcebergResult<bool> {
        self.record(CatalogCall::Drop {
            ident: ident.clone(),
        });
        self.inner.drop_table(ident, purge).await
    }

    async fn rename_table(&self, from: &TableIdent, to: &TableIdent) -> IcebergResult<()> {
        self.record(CatalogCall::Rename {
            from: from.clone(),
            to: to.clone(),
        });
        self.inner.rename_table(from, to).await
    }
}

/// Table operations wrapper that records refreshes and commits.
pub struct RecordingTableOperations {
    ident: TableIdent,
    inner: Arc<dyn TableOperations>,
    calls: Arc<Mutex<Vec<CatalogCall>>>,
}

#[async_trait]
impl TableOperations for RecordingTableOperations {
    async fn current(&self) -> IcebergResult<TableMetadata> {
        self.calls.lock().expect("lock").push(CatalogCall::Refresh {
            ident: self.ident.clone(),
        });
        self.inner.current().await
    }

    async fn commit(&self, base: &TableMetadata, metadata: TableMetadata) -> IcebergResult<()> {
        let result = self.inner.commit(base, metadata).await;
        self.calls.lock().expect("lock").push(CatalogCall::Commit {
            ident: self.ident.clone(),
            succeeded: result.is_ok(),
        });
        result
    }
}

/// In-memory metastore that tracks concurrent `get_table` calls.
///
/// Latency keeps each call in flight long enough for overlapping calls to
/// be observed.
#[derive(Debug, Clone, Default)]
pub struct RecordingMetastore {
    inner: MemoryMetastore,
    calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    fail_tables: Arc<Mutex<HashSet<String>>>,
    latency: Option<Duration>,
}

impl RecordingMetastore {
    /// Creates an empty metastore.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a metastore whose calls each take `latency`.
    #[must_use]
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Adds or replaces a table.
    pub fn put_table(&self, table: MetastoreTable) {
        self.inner.put_table(table);
    }

    /// Removes a table.
    pub fn remove_table(&self, db_name: &str, table_name: &str) {
        self.inner.remove_table(db_name, table_name);
    }

    /// Makes `get_table` fail with a transport error for `db.table`.
    pub fn inject_failure(&self, db_name: &str, table_name: &str) {
        self.fail_tables
            .lock()
            .expect("lock")
            .insert(format!("{db_name}.{table_name}").to_ascii_lowercase());
    }

    /// Returns the number of `get_table` calls.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Returns the highest number of `get_table` calls ever in flight at once.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn check_failure(&self, db_name: &str, table_name: &str) -> Result<(), MetastoreError> {
        let key = format!("{db_name}.{table_name}").to_ascii_lowercase();
        if self.fail_tables.lock().expect("lock").contains(&key) {
            return Err(MetastoreError::Transport {
                message: format!("Injected failure for table: {key}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MetastoreClient for RecordingMetastore {
    async fn get_table(
        &self,
        db_name: &str,
        table_name: &str,
    ) -> Result<MetastoreTable, MetastoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let result = match self.check_failure(db_name, table_name) {
            Ok(()) => self.inner.get_table(db_name, table_name).await,
            Err(e) => Err(e),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Event log whose every read fails.
#[derive(Debug, Clone, Default)]
pub struct FailingEventLog;

impl EventLog for FailingEventLog {
    fn events_after(&self, from: EventId) -> BoxStream<'_, CatalogResult<NotificationEvent>> {
        stream::iter([Err(CatalogError::event_log(format!(
            "Injected failure reading events after {from}"
        )))])
        .boxed()
    }
}
