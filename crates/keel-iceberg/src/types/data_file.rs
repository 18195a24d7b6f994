//! Data files and their column-level metrics.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::partition::{PartitionData, PartitionSpec};
use crate::error::{IcebergError, IcebergResult};

/// On-disk format of a data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileFormat {
    /// Apache Parquet.
    Parquet,
    /// Apache ORC.
    Orc,
    /// Apache Avro.
    Avro,
}

impl FileFormat {
    /// Guesses the format from a file name extension.
    #[must_use]
    pub fn from_file_name(path: &str) -> Option<Self> {
        let ext = path.rsplit_once('.')?.1.to_ascii_lowercase();
        match ext.as_str() {
            "parquet" | "parq" => Some(Self::Parquet),
            "orc" => Some(Self::Orc),
            "avro" => Some(Self::Avro),
            _ => None,
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parquet => f.write_str("PARQUET"),
            Self::Orc => f.write_str("ORC"),
            Self::Avro => f.write_str("AVRO"),
        }
    }
}

impl FromStr for FileFormat {
    type Err = IcebergError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PARQUET" => Ok(Self::Parquet),
            "ORC" => Ok(Self::Orc),
            "AVRO" => Ok(Self::Avro),
            _ => Err(IcebergError::unsupported(format!("unknown file format '{s}'"))),
        }
    }
}

/// Column-level metrics of a data file, keyed by field ID.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metrics {
    /// Number of rows in the file.
    pub record_count: i64,
    /// Compressed on-disk size per column.
    pub column_sizes: HashMap<i32, i64>,
    /// Null value count per column.
    pub null_value_counts: HashMap<i32, i64>,
    /// Serialized lower bound per column.
    pub lower_bounds: HashMap<i32, Bytes>,
    /// Serialized upper bound per column.
    pub upper_bounds: HashMap<i32, Bytes>,
}

impl Metrics {
    /// Creates metrics with only a record count.
    #[must_use]
    pub fn with_record_count(record_count: i64) -> Self {
        Self {
            record_count,
            ..Self::default()
        }
    }
}

/// A data file tracked by a table snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFile {
    /// Absolute path of the file.
    pub path: String,
    /// File format.
    pub format: FileFormat,
    /// ID of the partition spec the partition tuple is interpreted under.
    pub spec_id: i32,
    /// Partition tuple; `None` for files of an unpartitioned spec.
    pub partition: Option<PartitionData>,
    /// Number of rows.
    pub record_count: i64,
    /// File size in bytes.
    pub file_size_in_bytes: i64,
    /// Column-level metrics.
    pub metrics: Metrics,
}

impl DataFile {
    /// Starts building a data file for `spec`.
    #[must_use]
    pub fn builder(spec: &PartitionSpec) -> DataFileBuilder {
        DataFileBuilder {
            spec_id: spec.spec_id,
            arity: spec.fields.len(),
            path: None,
            format: None,
            partition: None,
            record_count: None,
            file_size_in_bytes: None,
            metrics: None,
        }
    }
}

/// Builder for [`DataFile`].
#[derive(Debug, Clone)]
pub struct DataFileBuilder {
    spec_id: i32,
    arity: usize,
    path: Option<String>,
    format: Option<FileFormat>,
    partition: Option<PartitionData>,
    record_count: Option<i64>,
    file_size_in_bytes: Option<i64>,
    metrics: Option<Metrics>,
}

impl DataFileBuilder {
    /// Sets the file path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets the file format.
    #[must_use]
    pub fn with_format(mut self, format: FileFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Sets the partition tuple.
    #[must_use]
    pub fn with_partition(mut self, partition: PartitionData) -> Self {
        self.partition = Some(partition);
        self
    }

    /// Sets the record count.
    #[must_use]
    pub fn with_record_count(mut self, record_count: i64) -> Self {
        self.record_count = Some(record_count);
        self
    }

    /// Sets the file size.
    #[must_use]
    pub fn with_file_size_in_bytes(mut self, size: i64) -> Self {
        self.file_size_in_bytes = Some(size);
        self
    }

    /// Sets column metrics; the metrics record count becomes the file's record count.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.record_count = Some(metrics.record_count);
        self.metrics = Some(metrics);
        self
    }

    /// Finishes the data file.
    ///
    /// Files of a partitioned spec without an explicit tuple get an all-null tuple.
    ///
    /// # Errors
    ///
    /// Returns `IcebergError::Validation` if the path, format, size or record
    /// count is missing or invalid, or the tuple arity does not match the spec.
    pub fn build(self) -> IcebergResult<DataFile> {
        let path = self
            .path
            .filter(|p| !p.is_empty())
            .ok_or_else(|| IcebergError::validation("File path is required"))?;
        let format = self
            .format
            .or_else(|| FileFormat::from_file_name(&path))
            .ok_or_else(|| IcebergError::validation(format!("File format is required: {path}")))?;
        let file_size_in_bytes = self
            .file_size_in_bytes
            .filter(|s| *s >= 0)
            .ok_or_else(|| IcebergError::validation(format!("File size is required: {path}")))?;
        let record_count = self
            .record_count
            .filter(|c| *c >= 0)
            .ok_or_else(|| IcebergError::validation(format!("Record count is required: {path}")))?;

        let partition = if self.arity == 0 {
            if self.partition.as_ref().is_some_and(|p| !p.is_empty()) {
                return Err(IcebergError::validation(format!(
                    "Partition data given for unpartitioned spec: {path}"
                )));
            }
            None
        } else {
            let data = self
                .partition
                .unwrap_or_else(|| PartitionData::nulls(self.arity));
            if data.len() != self.arity {
                return Err(IcebergError::validation(format!(
                    "Partition data has {} values, spec {} has {} fields: {path}",
                    data.len(),
                    self.spec_id,
                    self.arity
                )));
            }
            Some(data)
        };

        let mut metrics = self.metrics.unwrap_or_default();
        metrics.record_count = record_count;

        Ok(DataFile {
            path,
            format,
            spec_id: self.spec_id,
            partition,
            record_count,
            file_size_in_bytes,
            metrics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Literal, PartitionField, Transform};

    fn partitioned_spec() -> PartitionSpec {
        PartitionSpec {
            spec_id: 1,
            fields: vec![PartitionField {
                source_id: 2,
                field_id: 1000,
                name: "region".into(),
                transform: Transform::Identity,
            }],
        }
    }

    #[test]
    fn test_build_unpartitioned_file() {
        let file = DataFile::builder(&PartitionSpec::unpartitioned())
            .with_path("/t/data/a.parquet")
            .with_record_count(10)
            .with_file_size_in_bytes(1024)
            .build()
            .expect("build");
        assert_eq!(file.format, FileFormat::Parquet);
        assert!(file.partition.is_none());
        assert_eq!(file.metrics.record_count, 10);
    }

    #[test]
    fn test_build_partitioned_file_defaults_to_nulls() {
        let file = DataFile::builder(&partitioned_spec())
            .with_path("/t/data/a.orc")
            .with_metrics(Metrics::with_record_count(3))
            .with_file_size_in_bytes(1)
            .build()
            .expect("build");
        assert_eq!(file.spec_id, 1);
        assert_eq!(file.record_count, 3);
        assert_eq!(file.partition, Some(PartitionData::nulls(1)));
    }

    #[test]
    fn test_build_rejects_invalid_files() {
        let spec = partitioned_spec();
        assert!(
            DataFile::builder(&spec)
                .with_record_count(1)
                .with_file_size_in_bytes(1)
                .build()
                .is_err()
        );
        assert!(
            DataFile::builder(&spec)
                .with_path("/t/data/noext")
                .with_record_count(1)
                .with_file_size_in_bytes(1)
                .build()
                .is_err()
        );
        assert!(
            DataFile::builder(&spec)
                .with_path("/t/a.parquet")
                .with_record_count(1)
                .with_file_size_in_bytes(1)
                .with_partition(PartitionData::new(vec![
                    Some(Literal::Int(1)),
                    Some(Literal::Int(2)),
                ]))
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_file_format_parsing() {
        assert_eq!("parquet".parse::<FileFormat>().expect("parse"), FileFormat::Parquet);
        assert_eq!(FileFormat::from_file_name("x.ORC"), Some(FileFormat::Orc));
        assert!("csv".parse::<FileFormat>().is_err());
    }
}
