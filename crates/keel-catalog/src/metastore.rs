//! Metastore contract and client pool.
//!
//! The metastore holds each table's definition: its declared type, a flat
//! string property map and its location. Clients are drawn from a
//! [`MetastoreClientPool`]; the returned guard puts the client back when it
//! is dropped, on success and error paths alike.

use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{CatalogError, CatalogResult};

/// Errors returned by a metastore client.
#[derive(Debug, Clone, Error)]
pub enum MetastoreError {
    /// The requested object does not exist (any more).
    #[error("no such object: {message}")]
    NoSuchObject {
        /// Description of the missing object.
        message: String,
    },

    /// The call failed for any other reason.
    #[error("metastore call failed: {message}")]
    Transport {
        /// Description of the failure.
        message: String,
    },
}

impl MetastoreError {
    /// Creates a no-such-object error for a table.
    #[must_use]
    pub fn no_such_table(db_name: &str, table_name: &str) -> Self {
        Self::NoSuchObject {
            message: format!("{db_name}.{table_name} table not found"),
        }
    }

    /// Returns true if the object does not exist.
    #[must_use]
    pub const fn is_no_such_object(&self) -> bool {
        matches!(self, Self::NoSuchObject { .. })
    }
}

/// Declared type of a metastore table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TableType {
    /// Catalog-managed table.
    Managed,
    /// Table whose data is managed outside the catalog.
    External,
    /// Materialized view.
    MaterializedView,
    /// Logical view.
    VirtualView,
    /// Any type the catalog does not know about.
    Other(String),
}

impl TableType {
    /// Parses the metastore's type string.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "MANAGED_TABLE" => Self::Managed,
            "EXTERNAL_TABLE" => Self::External,
            "MATERIALIZED_VIEW" => Self::MaterializedView,
            "VIRTUAL_VIEW" => Self::VirtualView,
            other => Self::Other(other.to_string()),
        }
    }

    /// Returns the metastore's type string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Managed => "MANAGED_TABLE",
            Self::External => "EXTERNAL_TABLE",
            Self::MaterializedView => "MATERIALIZED_VIEW",
            Self::VirtualView => "VIRTUAL_VIEW",
            Self::Other(s) => s,
        }
    }

    /// Returns true if tables of this type can be loaded.
    #[must_use]
    pub const fn is_supported(&self) -> bool {
        matches!(self, Self::Managed | Self::External | Self::MaterializedView)
    }
}

impl fmt::Display for TableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A table definition as returned by the metastore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetastoreTable {
    /// Database name.
    pub db_name: String,
    /// Table name.
    pub table_name: String,
    /// Declared table type.
    pub table_type: TableType,
    /// Table properties.
    pub parameters: HashMap<String, String>,
    /// Storage location, if the table has one.
    pub location: Option<String>,
}

impl MetastoreTable {
    /// Creates a definition with no properties.
    #[must_use]
    pub fn new(
        db_name: impl Into<String>,
        table_name: impl Into<String>,
        table_type: TableType,
    ) -> Self {
        Self {
            db_name: db_name.into(),
            table_name: table_name.into(),
            table_type,
            parameters: HashMap::new(),
            location: None,
        }
    }

    /// Sets a property.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Sets the location.
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Returns `db.table`.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.db_name, self.table_name)
    }
}

/// Client for the metastore.
#[async_trait]
pub trait MetastoreClient: Send + Sync + 'static {
    /// Fetches a table definition.
    ///
    /// Returns `MetastoreError::NoSuchObject` if the table doesn't exist.
    async fn get_table(
        &self,
        db_name: &str,
        table_name: &str,
    ) -> Result<MetastoreTable, MetastoreError>;
}

fn table_key(db_name: &str, table_name: &str) -> (String, String) {
    (db_name.to_ascii_lowercase(), table_name.to_ascii_lowercase())
}

/// In-memory metastore for testing.
///
/// Names are matched case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct MemoryMetastore {
    tables: Arc<RwLock<HashMap<(String, String), MetastoreTable>>>,
}

impl MemoryMetastore {
    /// Creates an empty metastore.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a table.
    pub fn put_table(&self, table: MetastoreTable) {
        let key = table_key(&table.db_name, &table.table_name);
        self.tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, table);
    }

    /// Removes a table. Succeeds even if the table doesn't exist.
    pub fn remove_table(&self, db_name: &str, table_name: &str) {
        self.tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&table_key(db_name, table_name));
    }
}

#[async_trait]
impl MetastoreClient for MemoryMetastore {
    async fn get_table(
        &self,
        db_name: &str,
        table_name: &str,
    ) -> Result<MetastoreTable, MetastoreError> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&table_key(db_name, table_name))
            .cloned()
            .ok_or_else(|| MetastoreError::no_such_table(db_name, table_name))
    }
}

struct PoolInner {
    idle: Mutex<Vec<Arc<dyn MetastoreClient>>>,
    permits: Arc<Semaphore>,
}

/// A bounded pool of metastore clients.
///
/// Cloning the pool is cheap; clones share the same clients.
#[derive(Clone)]
pub struct MetastoreClientPool {
    inner: Arc<PoolInner>,
}

impl fmt::Debug for MetastoreClientPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetastoreClientPool")
            .field("idle", &self.idle_count())
            .finish_non_exhaustive()
    }
}

impl MetastoreClientPool {
    /// Creates a pool over the given clients.
    ///
    /// A pool without clients is closed: every `acquire` fails at once.
    #[must_use]
    pub fn new(clients: Vec<Arc<dyn MetastoreClient>>) -> Self {
        let permits = Semaphore::new(clients.len());
        if clients.is_empty() {
            permits.close();
        }
        Self {
            inner: Arc::new(PoolInner {
                idle: Mutex::new(clients),
                permits: Arc::new(permits),
            }),
        }
    }

    /// Creates a pool of `size` handles sharing one thread-safe client.
    #[must_use]
    pub fn shared(client: Arc<dyn MetastoreClient>, size: usize) -> Self {
        Self::new((0..size.max(1)).map(|_| Arc::clone(&client)).collect())
    }

    /// Waits for a free client.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool has been closed or its bookkeeping is
    /// inconsistent.
    pub async fn acquire(&self) -> CatalogResult<PooledMetastoreClient> {
        let permit = Arc::clone(&self.inner.permits)
            .acquire_owned()
            .await
            .map_err(|_| {
                CatalogError::from(MetastoreError::Transport {
                    message: "metastore client pool is closed".into(),
                })
            })?;
        let client = self
            .inner
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .ok_or_else(|| MetastoreError::Transport {
                message: "no idle metastore client despite a free permit".into(),
            })?;
        Ok(PooledMetastoreClient {
            client,
            pool: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    /// Returns the number of clients not currently checked out.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.inner
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// A client checked out of a [`MetastoreClientPool`].
///
/// Returned to the pool on drop.
pub struct PooledMetastoreClient {
    client: Arc<dyn MetastoreClient>,
    pool: Arc<PoolInner>,
    // Released after the client is back in the idle list.
    _permit: OwnedSemaphorePermit,
}

impl Deref for PooledMetastoreClient {
    type Target = dyn MetastoreClient;

    fn deref(&self) -> &Self::Target {
        self.client.as_ref()
    }
}

impl Drop for PooledMetastoreClient {
    fn drop(&mut self) {
        self.pool
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&self.client));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders() -> MetastoreTable {
        MetastoreTable::new("Sales", "Orders", TableType::External)
            .with_parameter("table_type", "ICEBERG")
            .with_location("/warehouse/sales/orders")
    }

    #[test]
    fn test_table_type_round_trip() {
        for raw in [
            "MANAGED_TABLE",
            "EXTERNAL_TABLE",
            "MATERIALIZED_VIEW",
            "VIRTUAL_VIEW",
            "INDEX_TABLE",
        ] {
            assert_eq!(TableType::parse(raw).as_str(), raw);
        }
        assert!(TableType::Managed.is_supported());
        assert!(!TableType::VirtualView.is_supported());
        assert!(!TableType::parse("INDEX_TABLE").is_supported());
    }

    #[tokio::test]
    async fn test_memory_metastore_is_case_insensitive() {
        let metastore = MemoryMetastore::new();
        metastore.put_table(orders());

        let table = metastore.get_table("sales", "ORDERS").await.expect("get");
        assert_eq!(table.full_name(), "Sales.Orders");

        metastore.remove_table("SALES", "orders");
        let err = metastore.get_table("sales", "orders").await.expect_err("removed");
        assert!(err.is_no_such_object());
    }

    #[tokio::test]
    async fn test_pool_returns_client_on_drop() {
        let pool = MetastoreClientPool::shared(Arc::new(MemoryMetastore::new()), 2);
        assert_eq!(pool.idle_count(), 2);

        let first = pool.acquire().await.expect("acquire");
        let second = pool.acquire().await.expect("acquire");
        assert_eq!(pool.idle_count(), 0);
        assert!(first.get_table("db", "missing").await.is_err());

        drop(first);
        assert_eq!(pool.idle_count(), 1);
        drop(second);
        assert_eq!(pool.idle_count(), 2);
    }

    #[tokio::test]
    async fn test_pool_waits_for_free_client() {
        let pool = MetastoreClientPool::shared(Arc::new(MemoryMetastore::new()), 1);
        let held = pool.acquire().await.expect("acquire");

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await.map(|_| ()) })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(held);
        waiter.await.expect("join").expect("acquire after release");
        assert_eq!(pool.idle_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_pool_fails_instead_of_waiting() {
        let pool = MetastoreClientPool::new(Vec::new());
        let acquired = tokio::time::timeout(std::time::Duration::from_secs(1), pool.acquire())
            .await
            .expect("acquire returns without waiting");
        assert!(acquired.is_err());
        assert_eq!(pool.idle_count(), 0);
    }
}
