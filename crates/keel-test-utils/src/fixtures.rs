//! Test fixtures: a pre-wired catalog and factories for test data.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use keel_catalog::commit::{ColumnStatsRecord, DataFileRecord, FileFormatTag, IcebergOperationParam};
use keel_catalog::config::CatalogConfig;
use keel_catalog::ddl::{ColumnDef, IcebergCatalogOps};
use keel_catalog::events::{CREATE_TABLE, EventId, EventLog, MemoryEventLog};
use keel_catalog::file_descriptor::FileDescriptorResolver;
use keel_catalog::loader::{LoadResult, TableLoader};
use keel_catalog::metastore::{MetastoreClient, MetastoreClientPool, MetastoreTable, TableType};
use keel_catalog::partition_spec::IcebergPartitionSpec;
use keel_catalog::properties::{ICEBERG_STORAGE_HANDLER, STORAGE_HANDLER};
use keel_catalog::table::IcebergTable;
use keel_core::MemoryFileSystem;
use keel_iceberg::types::{PrimitiveType, TableIdent};
use keel_iceberg::{MemoryCatalog, TableCatalog};

use crate::recording::{RecordingMetastore, RecordingTableCatalog};

/// Warehouse root of the in-memory table-format catalog.
pub const WAREHOUSE: &str = "/warehouse";

/// Columns of the `orders` test table: `id`, `region`, `event_ts`, `qty`.
pub fn orders_columns() -> Vec<ColumnDef> {
    vec![
        ColumnDef::new("id", PrimitiveType::Long).not_null(),
        ColumnDef::new("region", PrimitiveType::String),
        ColumnDef::new("event_ts", PrimitiveType::Timestamp),
        ColumnDef::new("qty", PrimitiveType::Int).with_comment("units ordered"),
    ]
}

/// Metastore definition of an external table-format table.
pub fn iceberg_metastore_table(db_name: &str, table_name: &str) -> MetastoreTable {
    MetastoreTable::new(db_name, table_name, TableType::External)
        .with_parameter(STORAGE_HANDLER, ICEBERG_STORAGE_HANDLER)
        .with_location(format!("{WAREHOUSE}/{db_name}/{table_name}"))
}

/// A Parquet data file record with statistics for field 1.
pub fn data_file_record(path: &str, partition_path: &str, record_count: i64) -> DataFileRecord {
    DataFileRecord {
        path: path.to_string(),
        format: FileFormatTag::Parquet as i32,
        record_count,
        file_size_in_bytes: record_count * 64,
        partition_path: partition_path.to_string(),
        column_stats: vec![ColumnStatsRecord {
            field_id: 1,
            total_compressed_byte_size: record_count * 8,
            null_count: 0,
            lower_bound: Bytes::from_static(&[1, 0, 0, 0, 0, 0, 0, 0]),
            upper_bound: Bytes::from_static(&[9, 0, 0, 0, 0, 0, 0, 0]),
        }],
    }
}

/// Request committing `records` under `spec_id`.
pub fn operation_param(
    spec_id: i32,
    records: &[DataFileRecord],
    is_overwrite: bool,
) -> IcebergOperationParam {
    IcebergOperationParam {
        spec_id,
        data_files: records.iter().map(DataFileRecord::to_bytes).collect(),
        is_overwrite,
    }
}

/// In-memory catalog environment for integration tests.
///
/// Every collaborator is exposed so tests can seed state and inspect calls.
#[derive(Debug)]
pub struct TestCatalog {
    /// Metastore behind the loader's client pool.
    pub metastore: RecordingMetastore,
    /// Client pool used by the loader.
    pub pool: MetastoreClientPool,
    /// Recording wrapper around the in-memory table-format catalog.
    pub catalog: RecordingTableCatalog,
    /// Filesystem data files are resolved against.
    pub fs: MemoryFileSystem,
    /// Notification event log.
    pub event_log: MemoryEventLog,
    /// Loader wired to all of the above.
    pub loader: TableLoader,
    /// DDL and commit executor over `catalog`.
    pub ops: IcebergCatalogOps,
}

impl Default for TestCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl TestCatalog {
    /// Creates an environment with default configuration.
    pub fn new() -> Self {
        Self::with_metastore(RecordingMetastore::new(), CatalogConfig::default())
    }

    /// Creates an environment whose metastore calls each take `latency`.
    pub fn with_metastore_latency(latency: Duration) -> Self {
        Self::with_metastore(RecordingMetastore::with_latency(latency), CatalogConfig::default())
    }

    /// Creates an environment over `metastore` with `config`.
    pub fn with_metastore(metastore: RecordingMetastore, config: CatalogConfig) -> Self {
        let pool = MetastoreClientPool::shared(
            Arc::new(metastore.clone()) as Arc<dyn MetastoreClient>,
            config.metastore_pool_size,
        );
        let memory: Arc<dyn TableCatalog> = Arc::new(MemoryCatalog::new("test", WAREHOUSE));
        let catalog = RecordingTableCatalog::new(memory);
        let fs = MemoryFileSystem::new();
        let event_log = MemoryEventLog::new();
        let loader = TableLoader::new(
            pool.clone(),
            Arc::new(catalog.clone()),
            FileDescriptorResolver::new(Arc::new(fs.clone())),
            config,
        )
        .with_event_log(Arc::new(event_log.clone()) as Arc<dyn EventLog>);
        let ops = IcebergCatalogOps::new(Arc::new(catalog.clone()));

        Self {
            metastore,
            pool,
            catalog,
            fs,
            event_log,
            loader,
            ops,
        }
    }

    /// Creates a table in the format catalog and the metastore, records its
    /// creation event and returns that event's id.
    pub async fn create_iceberg_table(
        &self,
        db_name: &str,
        table_name: &str,
        columns: &[ColumnDef],
        partition_spec: Option<&IcebergPartitionSpec>,
    ) -> EventId {
        self.ops
            .create_table(
                &TableIdent::new(db_name, table_name),
                columns,
                partition_spec,
                None,
                &HashMap::new(),
            )
            .await
            .expect("create table");
        self.metastore
            .put_table(iceberg_metastore_table(db_name, table_name));
        self.event_log.append(CREATE_TABLE, db_name, table_name)
    }

    /// Loads a table, panicking with the load error if it fails.
    pub async fn load(&self, db_name: &str, table_name: &str) -> IcebergTable {
        match self.loader.load(db_name, table_name, None, "test").await {
            LoadResult::Loaded(table) => *table,
            LoadResult::Failed(incomplete) => {
                panic!("load of {db_name}.{table_name} failed: {}", incomplete.error)
            }
        }
    }

    /// Writes a data file of `record_count` rows under the table's data
    /// directory and returns its record.
    pub fn write_data_file(
        &self,
        db_name: &str,
        table_name: &str,
        file_name: &str,
        partition_path: &str,
        record_count: i64,
    ) -> DataFileRecord {
        let dir = if partition_path.is_empty() {
            format!("{WAREHOUSE}/{db_name}/{table_name}/data")
        } else {
            format!("{WAREHOUSE}/{db_name}/{table_name}/data/{partition_path}")
        };
        let record = data_file_record(&format!("{dir}/{file_name}"), partition_path, record_count);
        self.fs.put_file(
            record.path.clone(),
            u64::try_from(record.file_size_in_bytes).expect("non-negative size"),
        );
        record
    }
}
