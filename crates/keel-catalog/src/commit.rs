//! Committing newly written data files.
//!
//! Writers describe each new file with a compact protobuf [`DataFileRecord`].
//! A [`CommitBatch`] turns the records of one statement into data files and
//! publishes them with a single commit: an append adds them next to the
//! existing files, a dynamic overwrite replaces every partition they touch.

use std::fmt;

use bytes::Bytes;
use keel_iceberg::Table;
use keel_iceberg::types::{DataFile, FileFormat, Metrics, PartitionSpec, Schema};
use keel_iceberg::update::{AppendFiles, ReplacePartitions};
use prost::Message;

use crate::error::{CatalogError, CatalogResult};
use crate::metrics;
use crate::partition_path;

/// Field id writers report for columns that have no table-format field.
pub const UNKNOWN_FIELD_ID: i32 = -1;

/// File format tag of a [`DataFileRecord`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum FileFormatTag {
    /// Not set.
    Unspecified = 0,
    /// Parquet.
    Parquet = 1,
    /// ORC.
    Orc = 2,
    /// Avro.
    Avro = 3,
}

impl From<FileFormat> for FileFormatTag {
    fn from(format: FileFormat) -> Self {
        match format {
            FileFormat::Parquet => Self::Parquet,
            FileFormat::Orc => Self::Orc,
            FileFormat::Avro => Self::Avro,
        }
    }
}

/// Per-column statistics of a written file.
#[derive(Clone, PartialEq, Message)]
pub struct ColumnStatsRecord {
    /// Table-format field id; [`UNKNOWN_FIELD_ID`] if the column has none.
    #[prost(int32, tag = "1")]
    pub field_id: i32,
    /// Compressed size of the column in bytes.
    #[prost(int64, tag = "2")]
    pub total_compressed_byte_size: i64,
    /// Number of nulls.
    #[prost(int64, tag = "3")]
    pub null_count: i64,
    /// Serialized lower bound; empty if unknown.
    #[prost(bytes = "bytes", tag = "4")]
    pub lower_bound: Bytes,
    /// Serialized upper bound; empty if unknown.
    #[prost(bytes = "bytes", tag = "5")]
    pub upper_bound: Bytes,
}

/// A data file written by one statement.
#[derive(Clone, PartialEq, Message)]
pub struct DataFileRecord {
    /// Absolute path.
    #[prost(string, tag = "1")]
    pub path: String,
    /// File format.
    #[prost(enumeration = "FileFormatTag", tag = "2")]
    pub format: i32,
    /// Number of rows.
    #[prost(int64, tag = "3")]
    pub record_count: i64,
    /// Size in bytes.
    #[prost(int64, tag = "4")]
    pub file_size_in_bytes: i64,
    /// Hive-style partition path, empty for unpartitioned writes.
    #[prost(string, tag = "5")]
    pub partition_path: String,
    /// Column statistics.
    #[prost(message, repeated, tag = "6")]
    pub column_stats: Vec<ColumnStatsRecord>,
}

impl DataFileRecord {
    /// Encodes the record.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.encode_to_vec())
    }

    /// Decodes a record.
    ///
    /// # Errors
    ///
    /// Returns a precondition error if `buf` is not a valid record.
    pub fn from_bytes(buf: &Bytes) -> CatalogResult<Self> {
        Self::decode(buf.clone())
            .map_err(|e| CatalogError::precondition(format!("Invalid data file record: {e}")))
    }

    fn file_format(&self) -> CatalogResult<FileFormat> {
        match FileFormatTag::try_from(self.format) {
            Ok(FileFormatTag::Parquet) => Ok(FileFormat::Parquet),
            Ok(FileFormatTag::Orc) => Ok(FileFormat::Orc),
            Ok(FileFormatTag::Avro) => Ok(FileFormat::Avro),
            Ok(FileFormatTag::Unspecified) | Err(_) => Err(CatalogError::precondition(format!(
                "Unsupported file format {} for data file {}",
                self.format, self.path
            ))),
        }
    }
}

/// Request to commit the files written by one statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcebergOperationParam {
    /// Spec the files were written under.
    pub spec_id: i32,
    /// Encoded [`DataFileRecord`]s, in write order.
    pub data_files: Vec<Bytes>,
    /// Whether to replace the touched partitions instead of appending.
    pub is_overwrite: bool,
}

/// Collects column metrics, skipping columns without a field id.
///
/// Bounds are recorded only when non-empty.
#[must_use]
pub fn build_data_file_metrics(record: &DataFileRecord) -> Metrics {
    let mut metrics = Metrics::with_record_count(record.record_count);
    for stats in &record.column_stats {
        if stats.field_id == UNKNOWN_FIELD_ID {
            continue;
        }
        metrics
            .column_sizes
            .insert(stats.field_id, stats.total_compressed_byte_size);
        metrics
            .null_value_counts
            .insert(stats.field_id, stats.null_count);
        if !stats.lower_bound.is_empty() {
            metrics
                .lower_bounds
                .insert(stats.field_id, stats.lower_bound.clone());
        }
        if !stats.upper_bound.is_empty() {
            metrics
                .upper_bounds
                .insert(stats.field_id, stats.upper_bound.clone());
        }
    }
    metrics
}

/// Rebuilds a data file of `spec` from its record.
///
/// # Errors
///
/// Returns an error if the format is unknown, the partition path does not
/// match `spec`, or the format rejects the file.
pub fn build_data_file(
    record: &DataFileRecord,
    spec: &PartitionSpec,
    schema: &Schema,
) -> CatalogResult<DataFile> {
    let mut builder = DataFile::builder(spec)
        .with_metrics(build_data_file_metrics(record))
        .with_path(record.path.clone())
        .with_format(record.file_format()?)
        .with_record_count(record.record_count)
        .with_file_size_in_bytes(record.file_size_in_bytes);
    if let Some(partition) = partition_path::decode(&record.partition_path, spec, schema)? {
        builder = builder.with_partition(partition);
    }
    Ok(builder.build()?)
}

/// Files staged for one atomic commit.
pub enum CommitBatch {
    /// Add files next to the existing ones.
    Append(AppendFiles),
    /// Replace every partition the staged files belong to.
    DynamicOverwrite(ReplacePartitions),
}

impl fmt::Debug for CommitBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CommitBatch").field(&self.operation()).finish()
    }
}

impl CommitBatch {
    /// Starts a batch against the metadata `table` was loaded at.
    #[must_use]
    pub fn for_table(table: &Table, overwrite: bool) -> Self {
        if overwrite {
            Self::DynamicOverwrite(table.new_replace_partitions())
        } else {
            Self::Append(table.new_append())
        }
    }

    /// Stages a file.
    pub fn add_file(&mut self, file: DataFile) {
        match self {
            Self::Append(append) => {
                append.append_file(file);
            }
            Self::DynamicOverwrite(replace) => {
                replace.add_file(file);
            }
        }
    }

    /// Returns the operation name used in logs and metrics.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::Append(_) => "append",
            Self::DynamicOverwrite(_) => "overwrite",
        }
    }

    /// Commits the staged files and returns the new snapshot id.
    ///
    /// No retry: a concurrent commit fails this one with the format's own
    /// conflict error and nothing is published.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Runtime`] with the format's error unchanged.
    pub async fn commit(self) -> CatalogResult<i64> {
        let operation = self.operation();
        let result = match self {
            Self::Append(append) => append.commit().await,
            Self::DynamicOverwrite(replace) => replace.commit().await,
        };
        metrics::record_commit(
            operation,
            result.as_ref().is_err_and(keel_iceberg::IcebergError::is_commit_conflict),
        );
        Ok(result?)
    }
}

/// Commits the files of `param` to `table` in one snapshot.
///
/// Each file's partition is decoded under the spec identified by
/// `param.spec_id`.
///
/// # Errors
///
/// Returns a precondition error for an unknown spec or a malformed record,
/// before anything is committed; commit errors are returned unchanged.
pub async fn append_files(table: &Table, param: &IcebergOperationParam) -> CatalogResult<i64> {
    let metadata = table.metadata();
    let spec = metadata.spec_by_id(param.spec_id).ok_or_else(|| {
        CatalogError::precondition(format!(
            "Unknown partition spec id {} for table {}",
            param.spec_id,
            table.ident()
        ))
    })?;
    let schema = metadata.current_schema()?;

    let mut batch = CommitBatch::for_table(table, param.is_overwrite);
    for buf in &param.data_files {
        let record = DataFileRecord::from_bytes(buf)?;
        batch.add_file(build_data_file(&record, spec, schema)?);
    }

    tracing::debug!(
        operation = batch.operation(),
        files = param.data_files.len(),
        spec_id = param.spec_id,
        "committing data files"
    );
    batch.commit().await
}
