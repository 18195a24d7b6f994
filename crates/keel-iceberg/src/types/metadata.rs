//! Table identifiers, snapshots and table metadata.
//!
//! `TableMetadata` values are immutable: every change produces a new value
//! that a pending update hands to [`crate::TableOperations::commit`] together
//! with the base it was derived from.

use std::collections::HashMap;
use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::data_file::DataFile;
use super::partition::PartitionSpec;
use super::schema::Schema;
use crate::error::{IcebergError, IcebergResult};

/// Format version written by this implementation.
pub const FORMAT_VERSION: i32 = 2;

/// Table identifier with namespace and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableIdent {
    /// The namespace (database) containing the table.
    pub namespace: String,

    /// The table name.
    pub name: String,
}

impl TableIdent {
    /// Creates a new table identifier.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parses `namespace.name`.
    ///
    /// # Errors
    ///
    /// Returns `IcebergError::Validation` if there is no separator.
    pub fn parse(value: &str) -> IcebergResult<Self> {
        let (namespace, name) = value
            .rsplit_once('.')
            .filter(|(ns, name)| !ns.is_empty() && !name.is_empty())
            .ok_or_else(|| {
                IcebergError::validation(format!("Invalid table identifier: {value}"))
            })?;
        Ok(Self::new(namespace, name))
    }
}

impl fmt::Display for TableIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

/// Kind of change a snapshot records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Files were added; nothing was removed.
    Append,
    /// Files were added and existing files were replaced.
    Overwrite,
    /// Files were removed.
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Append => f.write_str("append"),
            Self::Overwrite => f.write_str("overwrite"),
            Self::Delete => f.write_str("delete"),
        }
    }
}

/// An immutable, versioned view of a table's complete file set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Unique snapshot ID; strictly increasing within a table.
    pub snapshot_id: i64,
    /// Parent snapshot ID.
    pub parent_snapshot_id: Option<i64>,
    /// Sequence number.
    pub sequence_number: i64,
    /// Timestamp in milliseconds.
    pub timestamp_ms: i64,
    /// Operation that produced the snapshot.
    pub operation: Operation,
    /// Snapshot summary.
    pub summary: HashMap<String, String>,
    /// Live data files.
    pub data_files: Vec<DataFile>,
}

/// Table metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMetadata {
    /// Format version.
    pub format_version: i32,
    /// Unique table identifier.
    pub table_uuid: Uuid,
    /// Table location (root path for data and metadata).
    pub location: String,
    /// Version of this metadata; incremented by every successful commit.
    pub metadata_version: u64,
    /// Last sequence number assigned.
    pub last_sequence_number: i64,
    /// Last updated timestamp in milliseconds.
    pub last_updated_ms: i64,
    /// Last assigned column ID.
    pub last_column_id: i32,
    /// Current schema ID.
    pub current_schema_id: i32,
    /// All schemas.
    pub schemas: Vec<Schema>,
    /// Default partition spec ID.
    pub default_spec_id: i32,
    /// Partition specs, indexed by spec ID.
    pub partition_specs: Vec<PartitionSpec>,
    /// Highest assigned partition field ID.
    pub last_partition_id: i32,
    /// Table properties.
    pub properties: HashMap<String, String>,
    /// Current snapshot ID.
    pub current_snapshot_id: Option<i64>,
    /// All snapshots.
    pub snapshots: Vec<Snapshot>,
}

impl TableMetadata {
    /// Creates metadata for a new table.
    ///
    /// Schema and spec IDs are reassigned to 0.
    ///
    /// # Errors
    ///
    /// Returns `IcebergError::Validation` if the schema is invalid or the spec
    /// references columns missing from the schema.
    pub fn new(
        location: impl Into<String>,
        mut schema: Schema,
        mut spec: PartitionSpec,
        properties: HashMap<String, String>,
    ) -> IcebergResult<Self> {
        schema.validate()?;
        schema.schema_id = 0;
        spec.spec_id = 0;
        spec.partition_type(&schema)?;
        Ok(Self {
            format_version: FORMAT_VERSION,
            table_uuid: Uuid::new_v4(),
            location: location.into(),
            metadata_version: 0,
            last_sequence_number: 0,
            last_updated_ms: Utc::now().timestamp_millis(),
            last_column_id: schema.highest_field_id(),
            current_schema_id: 0,
            last_partition_id: spec.last_assigned_field_id(),
            schemas: vec![schema],
            default_spec_id: 0,
            partition_specs: vec![spec],
            properties,
            current_snapshot_id: None,
            snapshots: Vec::new(),
        })
    }

    /// Returns the location of the metadata file for this version.
    #[must_use]
    pub fn metadata_location(&self) -> String {
        format!(
            "{}/metadata/{:05}-{}.metadata.json",
            self.location.trim_end_matches('/'),
            self.metadata_version,
            self.table_uuid
        )
    }

    /// Returns the current schema.
    ///
    /// # Errors
    ///
    /// Returns `IcebergError::Internal` if the current schema ID is dangling.
    pub fn current_schema(&self) -> IcebergResult<&Schema> {
        self.schemas
            .iter()
            .find(|s| s.schema_id == self.current_schema_id)
            .ok_or_else(|| IcebergError::Internal {
                message: format!("Current schema {} not found", self.current_schema_id),
            })
    }

    /// Looks up a partition spec by ID.
    #[must_use]
    pub fn spec_by_id(&self, spec_id: i32) -> Option<&PartitionSpec> {
        self.partition_specs.iter().find(|s| s.spec_id == spec_id)
    }

    /// Returns the default partition spec.
    ///
    /// # Errors
    ///
    /// Returns `IcebergError::Internal` if the default spec ID is dangling.
    pub fn default_spec(&self) -> IcebergResult<&PartitionSpec> {
        self.spec_by_id(self.default_spec_id)
            .ok_or_else(|| IcebergError::Internal {
                message: format!("Default partition spec {} not found", self.default_spec_id),
            })
    }

    /// Returns the current snapshot, if any.
    #[must_use]
    pub fn current_snapshot(&self) -> Option<&Snapshot> {
        let id = self.current_snapshot_id?;
        self.snapshots.iter().find(|s| s.snapshot_id == id)
    }

    /// Returns the live data files of the current snapshot.
    #[must_use]
    pub fn data_files(&self) -> &[DataFile] {
        self.current_snapshot()
            .map(|s| s.data_files.as_slice())
            .unwrap_or_default()
    }

    /// Returns new metadata with `schema` as the current schema.
    ///
    /// # Errors
    ///
    /// Returns `IcebergError::Validation` if the schema is invalid or no
    /// longer contains a column used by the default partition spec.
    pub fn with_schema(&self, mut schema: Schema) -> IcebergResult<Self> {
        schema.validate()?;
        self.default_spec()?.partition_type(&schema)?;
        let next_id = self.schemas.iter().map(|s| s.schema_id).max().unwrap_or(-1) + 1;
        schema.schema_id = next_id;

        let mut next = self.clone();
        next.last_column_id = next.last_column_id.max(schema.highest_field_id());
        next.current_schema_id = next_id;
        next.schemas.push(schema);
        next.last_updated_ms = Utc::now().timestamp_millis();
        Ok(next)
    }

    /// Returns new metadata with `spec` as the default partition spec.
    ///
    /// A spec equivalent to an existing one reuses that spec's ID; otherwise
    /// the spec gets the next free ID.
    ///
    /// # Errors
    ///
    /// Returns `IcebergError::Validation` if the spec references columns
    /// missing from the current schema.
    pub fn update_partition_spec(&self, mut spec: PartitionSpec) -> IcebergResult<Self> {
        spec.partition_type(self.current_schema()?)?;

        let mut next = self.clone();
        if let Some(existing) = self
            .partition_specs
            .iter()
            .find(|s| s.is_compatible_with(&spec))
        {
            next.default_spec_id = existing.spec_id;
        } else {
            let next_id = self
                .partition_specs
                .iter()
                .map(|s| s.spec_id)
                .max()
                .unwrap_or(-1)
                + 1;
            spec.spec_id = next_id;
            next.last_partition_id = next.last_partition_id.max(spec.last_assigned_field_id());
            next.default_spec_id = next_id;
            next.partition_specs.push(spec);
        }
        next.last_updated_ms = Utc::now().timestamp_millis();
        Ok(next)
    }

    /// Returns new metadata with a snapshot whose live files are `data_files`.
    #[must_use]
    pub fn with_snapshot(
        &self,
        operation: Operation,
        data_files: Vec<DataFile>,
        summary: HashMap<String, String>,
    ) -> Self {
        let snapshot_id = self
            .snapshots
            .iter()
            .map(|s| s.snapshot_id)
            .max()
            .unwrap_or(0)
            + 1;
        let now = Utc::now().timestamp_millis();

        let mut next = self.clone();
        next.last_sequence_number += 1;
        next.last_updated_ms = now;
        next.snapshots.push(Snapshot {
            snapshot_id,
            parent_snapshot_id: self.current_snapshot_id,
            sequence_number: next.last_sequence_number,
            timestamp_ms: now,
            operation,
            summary,
            data_files,
        });
        next.current_snapshot_id = Some(snapshot_id);
        next
    }
}
