//! Loaded table snapshots.
//!
//! An [`IcebergTable`] is an immutable view of one table as of its last load.
//! It embeds an [`FsTable`] holding the file-level state shared with plain
//! filesystem tables and forwards file queries to it.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use keel_core::{HostIndex, NetworkAddress};
use keel_iceberg::types::{FileFormat, Schema, TableIdent, TableMetadata};
use serde::{Deserialize, Serialize};

use crate::error::TableLoadingError;
use crate::events::EventId;
use crate::file_descriptor::{FileDescriptor, path_hash};
use crate::metastore::TableType;
use crate::partition_spec::{
    IcebergPartitionSpec, PartitionSpecRow, PartitionSpecTranslator, partition_spec_rows,
};
use crate::properties::{IcebergCatalogKind, ParquetCompression, WriteDefaults};

/// File-level state of a table backed by data files under a root location.
#[derive(Debug, Clone)]
pub struct FsTable {
    db_name: String,
    table_name: String,
    location: String,
    table_type: TableType,
    file_format: FileFormat,
    parameters: HashMap<String, String>,
    file_descriptors: HashMap<String, FileDescriptor>,
    host_index: HostIndex,
}

impl FsTable {
    /// Creates a file table.
    ///
    /// `file_descriptors` is keyed by [`path_hash`] of each file's absolute path.
    #[must_use]
    pub fn new(
        db_name: impl Into<String>,
        table_name: impl Into<String>,
        location: impl Into<String>,
        table_type: TableType,
        file_format: FileFormat,
        parameters: HashMap<String, String>,
    ) -> Self {
        Self {
            db_name: db_name.into(),
            table_name: table_name.into(),
            location: location.into(),
            table_type,
            file_format,
            parameters,
            file_descriptors: HashMap::new(),
            host_index: HostIndex::new(),
        }
    }

    /// Attaches resolved file descriptors and the host index they refer to.
    #[must_use]
    pub fn with_file_descriptors(
        mut self,
        file_descriptors: HashMap<String, FileDescriptor>,
        host_index: HostIndex,
    ) -> Self {
        self.file_descriptors = file_descriptors;
        self.host_index = host_index;
        self
    }

    /// Returns the database name.
    #[must_use]
    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    /// Returns the table name.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Returns `db.table`.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.db_name, self.table_name)
    }

    /// Returns the table root location.
    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Returns the metastore table type.
    #[must_use]
    pub fn table_type(&self) -> &TableType {
        &self.table_type
    }

    /// Returns the table-level file format.
    #[must_use]
    pub fn file_format(&self) -> FileFormat {
        self.file_format
    }

    /// Returns true if the table's files are in a columnar format.
    #[must_use]
    pub fn is_columnar(&self) -> bool {
        matches!(self.file_format, FileFormat::Parquet | FileFormat::Orc)
    }

    /// Returns the metastore parameters.
    #[must_use]
    pub fn parameters(&self) -> &HashMap<String, String> {
        &self.parameters
    }

    /// Returns all file descriptors keyed by path hash.
    #[must_use]
    pub fn file_descriptors(&self) -> &HashMap<String, FileDescriptor> {
        &self.file_descriptors
    }

    /// Looks up the descriptor of the file at absolute `path`.
    #[must_use]
    pub fn file_descriptor(&self, path: &str) -> Option<&FileDescriptor> {
        self.file_descriptors.get(&path_hash(path))
    }

    /// Returns the host index the descriptors' replica slots refer to.
    #[must_use]
    pub fn host_index(&self) -> &HostIndex {
        &self.host_index
    }

    /// Returns the number of data files.
    #[must_use]
    pub fn num_files(&self) -> usize {
        self.file_descriptors.len()
    }

    /// Returns the total size of all data files in bytes.
    #[must_use]
    pub fn total_file_bytes(&self) -> u64 {
        self.file_descriptors.values().map(|fd| fd.file_length).sum()
    }
}

/// Identity and history of a snapshot-format table, independent of its files.
#[derive(Debug, Clone)]
pub struct IcebergTableInfo {
    /// Identifier of the table inside its catalog.
    pub ident: TableIdent,
    /// Catalog the table is registered in.
    pub catalog_kind: IcebergCatalogKind,
    /// Root of a `hadoop.catalog` catalog.
    pub catalog_location: Option<String>,
    /// Id of the creation event the table was loaded under.
    pub create_event_id: Option<EventId>,
    /// Time spent fetching the definition from the metastore.
    pub metastore_fetch_latency: Duration,
}

/// A loaded snapshot-format table.
#[derive(Debug, Clone)]
pub struct IcebergTable {
    fs_table: FsTable,
    info: IcebergTableInfo,
    schema: Schema,
    partition_specs: Vec<IcebergPartitionSpec>,
    default_spec_id: i32,
    snapshot_id: Option<i64>,
    write_defaults: WriteDefaults,
}

impl IcebergTable {
    /// Builds a table from its file state and the format's metadata.
    ///
    /// Every partition spec is translated; a spec whose source columns are
    /// gone from the current schema is resolved against older schemas.
    ///
    /// # Errors
    ///
    /// Returns an error if the current schema is missing or a spec cannot be
    /// resolved against any schema.
    pub fn from_metadata(
        fs_table: FsTable,
        info: IcebergTableInfo,
        metadata: &TableMetadata,
        write_defaults: WriteDefaults,
    ) -> Result<Self, TableLoadingError> {
        let full_name = fs_table.full_name();
        let schema = metadata.current_schema().map_err(|e| {
            TableLoadingError::new(format!("Failed to load metadata for table: {full_name}: {e}"))
        })?;

        let mut partition_specs = Vec::with_capacity(metadata.partition_specs.len());
        for spec in &metadata.partition_specs {
            let translated = std::iter::once(schema)
                .chain(metadata.schemas.iter().rev())
                .find_map(|s| PartitionSpecTranslator::to_internal(spec, s).ok())
                .ok_or_else(|| {
                    TableLoadingError::new(format!(
                        "Partition spec {} of table {full_name} refers to unknown columns",
                        spec.spec_id
                    ))
                })?;
            partition_specs.push(translated);
        }

        Ok(Self {
            schema: schema.clone(),
            partition_specs,
            default_spec_id: metadata.default_spec_id,
            snapshot_id: metadata.current_snapshot_id,
            write_defaults,
            fs_table,
            info,
        })
    }

    /// Checks that the default spec id indexes a spec.
    ///
    /// # Errors
    ///
    /// Returns an error naming the table if the invariant does not hold.
    pub fn validate(&self) -> Result<(), TableLoadingError> {
        if self.partition_specs.is_empty() {
            return Ok(());
        }
        let in_range = usize::try_from(self.default_spec_id)
            .ok()
            .and_then(|i| self.partition_specs.get(i))
            .is_some_and(|spec| spec.spec_id == self.default_spec_id);
        if in_range {
            Ok(())
        } else {
            Err(TableLoadingError::new(format!(
                "Default partition spec id {} of table {} does not match any of its {} partition specs",
                self.default_spec_id,
                self.full_name(),
                self.partition_specs.len()
            )))
        }
    }

    /// Returns the embedded file table.
    #[must_use]
    pub fn fs_table(&self) -> &FsTable {
        &self.fs_table
    }

    /// Returns the table's identity in its catalog.
    #[must_use]
    pub fn info(&self) -> &IcebergTableInfo {
        &self.info
    }

    /// Returns the identifier of the table inside its catalog.
    #[must_use]
    pub fn ident(&self) -> &TableIdent {
        &self.info.ident
    }

    /// Returns the creation event id the table was loaded under.
    #[must_use]
    pub fn create_event_id(&self) -> Option<EventId> {
        self.info.create_event_id
    }

    /// Returns the current schema.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Returns all partition specs, indexed by spec id.
    #[must_use]
    pub fn partition_specs(&self) -> &[IcebergPartitionSpec] {
        &self.partition_specs
    }

    /// Returns the default spec id.
    #[must_use]
    pub fn default_spec_id(&self) -> i32 {
        self.default_spec_id
    }

    /// Returns the default partition spec, if the table has any.
    ///
    /// # Panics
    ///
    /// Panics if the table was not validated and the default spec id is out
    /// of range.
    #[must_use]
    pub fn default_partition_spec(&self) -> Option<&IcebergPartitionSpec> {
        crate::partition_spec::default_partition_spec(&self.partition_specs, self.default_spec_id)
    }

    /// Returns true if the default spec partitions the data.
    #[must_use]
    pub fn is_partitioned(&self) -> bool {
        self.default_partition_spec()
            .is_some_and(IcebergPartitionSpec::has_partition_fields)
    }

    /// Lists the fields of the default spec for display.
    #[must_use]
    pub fn partition_spec_rows(&self) -> Vec<PartitionSpecRow> {
        self.default_partition_spec()
            .map(partition_spec_rows)
            .unwrap_or_default()
    }

    /// Returns the current snapshot id; `None` before the first write.
    #[must_use]
    pub fn snapshot_id(&self) -> Option<i64> {
        self.snapshot_id
    }

    /// Returns the write defaults resolved from table properties.
    #[must_use]
    pub fn write_defaults(&self) -> &WriteDefaults {
        &self.write_defaults
    }

    /// Returns `db.table`.
    #[must_use]
    pub fn full_name(&self) -> String {
        self.fs_table.full_name()
    }

    /// Returns the database name.
    #[must_use]
    pub fn db_name(&self) -> &str {
        self.fs_table.db_name()
    }

    /// Returns the table name.
    #[must_use]
    pub fn table_name(&self) -> &str {
        self.fs_table.table_name()
    }

    /// Returns the table root location.
    #[must_use]
    pub fn location(&self) -> &str {
        self.fs_table.location()
    }

    /// Returns the table-level file format.
    #[must_use]
    pub fn file_format(&self) -> FileFormat {
        self.fs_table.file_format()
    }

    /// Returns true if the table's files are in a columnar format.
    #[must_use]
    pub fn is_columnar(&self) -> bool {
        self.fs_table.is_columnar()
    }

    /// Returns all file descriptors keyed by path hash.
    #[must_use]
    pub fn file_descriptors(&self) -> &HashMap<String, FileDescriptor> {
        self.fs_table.file_descriptors()
    }

    /// Looks up the descriptor of the file at absolute `path`.
    #[must_use]
    pub fn file_descriptor(&self, path: &str) -> Option<&FileDescriptor> {
        self.fs_table.file_descriptor(path)
    }

    /// Returns the host index the descriptors' replica slots refer to.
    #[must_use]
    pub fn host_index(&self) -> &HostIndex {
        self.fs_table.host_index()
    }

    /// Returns the metastore parameters the table was loaded with.
    #[must_use]
    pub fn parameters(&self) -> &HashMap<String, String> {
        self.fs_table.parameters()
    }

    /// Returns the number of data files.
    #[must_use]
    pub fn num_files(&self) -> usize {
        self.fs_table.num_files()
    }

    /// Returns the total size of all data files in bytes.
    #[must_use]
    pub fn total_file_bytes(&self) -> u64 {
        self.fs_table.total_file_bytes()
    }

    /// Builds the serializable snapshot sent to query planners.
    #[must_use]
    pub fn to_descriptor(&self) -> IcebergTableDescriptor {
        IcebergTableDescriptor {
            table_location: self.location().to_string(),
            catalog_kind: self.info.catalog_kind,
            file_format: self.write_defaults.file_format,
            partition_specs: self.partition_specs.clone(),
            default_spec_id: self.default_spec_id,
            file_descriptors: self
                .file_descriptors()
                .iter()
                .map(|(hash, fd)| (hash.clone(), fd.clone()))
                .collect(),
            hosts: self.fs_table.host_index().addresses(),
            snapshot_id: self.snapshot_id,
            compression: self.write_defaults.compression,
            row_group_size: self.write_defaults.row_group_size,
            plain_page_size: self.write_defaults.plain_page_size,
            dict_page_size: self.write_defaults.dict_page_size,
        }
    }
}

/// Serializable snapshot of a loaded table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcebergTableDescriptor {
    /// Table root location.
    pub table_location: String,
    /// Catalog the table is registered in.
    pub catalog_kind: IcebergCatalogKind,
    /// Default data file format.
    pub file_format: FileFormat,
    /// All partition specs, indexed by spec id.
    pub partition_specs: Vec<IcebergPartitionSpec>,
    /// Default spec id.
    pub default_spec_id: i32,
    /// File descriptors keyed by path hash.
    pub file_descriptors: BTreeMap<String, FileDescriptor>,
    /// Hosts referenced by replica slots, in slot order.
    pub hosts: Vec<NetworkAddress>,
    /// Current snapshot id.
    pub snapshot_id: Option<i64>,
    /// Parquet compression.
    pub compression: ParquetCompression,
    /// Parquet row group size; 0 when unset.
    pub row_group_size: u64,
    /// Parquet plain page size; 0 when unset.
    pub plain_page_size: u64,
    /// Parquet dictionary page size; 0 when unset.
    pub dict_page_size: u64,
}
