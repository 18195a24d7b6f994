//! Pending updates.
//!
//! Each pending update is built against the metadata a [`crate::Table`]
//! handle was loaded at and is committed with a single
//! [`TableOperations::commit`] call. `commit` consumes the update, so a
//! pending update is committed at most once.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::catalog::TableOperations;
use crate::error::{IcebergError, IcebergResult};
use crate::types::{
    DataFile, NestedField, Operation, PartitionData, PrimitiveType, Schema, TableMetadata,
};

fn validate_spec_ids(base: &TableMetadata, files: &[DataFile]) -> IcebergResult<()> {
    for file in files {
        if base.spec_by_id(file.spec_id).is_none() {
            return Err(IcebergError::validation(format!(
                "Cannot add file {} with unknown partition spec {}",
                file.path, file.spec_id
            )));
        }
    }
    Ok(())
}

fn summary(added: &[DataFile], deleted: usize, total: usize) -> HashMap<String, String> {
    let added_records: i64 = added.iter().map(|f| f.record_count).sum();
    HashMap::from([
        ("added-data-files".to_string(), added.len().to_string()),
        ("added-records".to_string(), added_records.to_string()),
        ("deleted-data-files".to_string(), deleted.to_string()),
        ("total-data-files".to_string(), total.to_string()),
    ])
}

/// Appends data files without touching existing files.
pub struct AppendFiles {
    base: TableMetadata,
    ops: Arc<dyn TableOperations>,
    files: Vec<DataFile>,
}

impl AppendFiles {
    pub(crate) fn new(base: TableMetadata, ops: Arc<dyn TableOperations>) -> Self {
        Self {
            base,
            ops,
            files: Vec::new(),
        }
    }

    /// Stages a data file.
    pub fn append_file(&mut self, file: DataFile) -> &mut Self {
        self.files.push(file);
        self
    }

    /// Commits the append and returns the new snapshot ID.
    ///
    /// # Errors
    ///
    /// Returns `IcebergError::Validation` for files with unknown specs and
    /// `IcebergError::CommitFailed` if another writer committed first.
    pub async fn commit(self) -> IcebergResult<i64> {
        validate_spec_ids(&self.base, &self.files)?;
        let mut live = self.base.data_files().to_vec();
        live.extend(self.files.iter().cloned());
        let summary = summary(&self.files, 0, live.len());
        let next = self.base.with_snapshot(Operation::Append, live, summary);
        let snapshot_id = next.current_snapshot_id.unwrap_or_default();
        self.ops.commit(&self.base, next).await?;
        tracing::debug!(snapshot_id, files = self.files.len(), "committed append");
        Ok(snapshot_id)
    }
}

/// Replaces every partition touched by the staged files.
///
/// Partitions are determined from the staged files' own partition tuples.
/// Staging a file of an unpartitioned spec replaces the whole table.
pub struct ReplacePartitions {
    base: TableMetadata,
    ops: Arc<dyn TableOperations>,
    files: Vec<DataFile>,
}

impl ReplacePartitions {
    pub(crate) fn new(base: TableMetadata, ops: Arc<dyn TableOperations>) -> Self {
        Self {
            base,
            ops,
            files: Vec::new(),
        }
    }

    /// Stages a data file.
    pub fn add_file(&mut self, file: DataFile) -> &mut Self {
        self.files.push(file);
        self
    }

    /// Commits the overwrite and returns the new snapshot ID.
    ///
    /// # Errors
    ///
    /// Returns `IcebergError::Validation` for files with unknown specs and
    /// `IcebergError::CommitFailed` if another writer committed first.
    pub async fn commit(self) -> IcebergResult<i64> {
        validate_spec_ids(&self.base, &self.files)?;
        let replace_all = self.files.iter().any(|f| f.partition.is_none());
        let touched: HashSet<(i32, &PartitionData)> = self
            .files
            .iter()
            .filter_map(|f| f.partition.as_ref().map(|p| (f.spec_id, p)))
            .collect();

        let existing = self.base.data_files();
        let mut live: Vec<DataFile> = existing
            .iter()
            .filter(|f| {
                !replace_all
                    && !f
                        .partition
                        .as_ref()
                        .is_some_and(|p| touched.contains(&(f.spec_id, p)))
            })
            .cloned()
            .collect();
        let deleted = existing.len() - live.len();
        live.extend(self.files.iter().cloned());

        let summary = summary(&self.files, deleted, live.len());
        let next = self.base.with_snapshot(Operation::Overwrite, live, summary);
        let snapshot_id = next.current_snapshot_id.unwrap_or_default();
        self.ops.commit(&self.base, next).await?;
        tracing::debug!(
            snapshot_id,
            added = self.files.len(),
            deleted,
            "committed partition overwrite"
        );
        Ok(snapshot_id)
    }
}

/// Removes data files.
pub struct DeleteFiles {
    base: TableMetadata,
    ops: Arc<dyn TableOperations>,
    delete_all: bool,
    paths: HashSet<String>,
}

impl DeleteFiles {
    pub(crate) fn new(base: TableMetadata, ops: Arc<dyn TableOperations>) -> Self {
        Self {
            base,
            ops,
            delete_all: false,
            paths: HashSet::new(),
        }
    }

    /// Deletes every live file (an always-true row filter).
    pub fn delete_all(&mut self) -> &mut Self {
        self.delete_all = true;
        self
    }

    /// Deletes one file by path.
    pub fn delete_file(&mut self, path: impl Into<String>) -> &mut Self {
        self.paths.insert(path.into());
        self
    }

    /// Commits the deletion and returns the new snapshot ID.
    ///
    /// A snapshot is produced even when no file matched.
    ///
    /// # Errors
    ///
    /// Returns `IcebergError::CommitFailed` if another writer committed first.
    pub async fn commit(self) -> IcebergResult<i64> {
        let existing = self.base.data_files();
        let live: Vec<DataFile> = existing
            .iter()
            .filter(|f| !self.delete_all && !self.paths.contains(&f.path))
            .cloned()
            .collect();
        let deleted = existing.len() - live.len();
        let summary = summary(&[], deleted, live.len());
        let next = self.base.with_snapshot(Operation::Delete, live, summary);
        let snapshot_id = next.current_snapshot_id.unwrap_or_default();
        self.ops.commit(&self.base, next).await?;
        tracing::debug!(snapshot_id, deleted, "committed delete");
        Ok(snapshot_id)
    }
}

/// Schema changes committed as one unit.
///
/// Column names in `update_column`, `rename_column`, `update_column_doc` and
/// `delete_column` refer to the schema the update was started from, so a
/// rename and a comment change of the same column can be combined.
pub struct UpdateSchema {
    base: TableMetadata,
    ops: Arc<dyn TableOperations>,
    original: Schema,
    working: Schema,
    next_column_id: i32,
    deleted: HashSet<i32>,
}

impl UpdateSchema {
    pub(crate) fn new(base: TableMetadata, ops: Arc<dyn TableOperations>) -> IcebergResult<Self> {
        let original = base.current_schema()?.clone();
        let next_column_id = base.last_column_id.max(original.highest_field_id()) + 1;
        Ok(Self {
            working: original.clone(),
            original,
            base,
            ops,
            next_column_id,
            deleted: HashSet::new(),
        })
    }

    fn original_id(&self, name: &str) -> IcebergResult<i32> {
        self.original
            .field_by_name(name)
            .map(|f| f.id)
            .filter(|id| !self.deleted.contains(id))
            .ok_or_else(|| {
                IcebergError::validation(format!("Cannot find column to update: {name}"))
            })
    }

    fn working_field(&mut self, id: i32) -> IcebergResult<&mut NestedField> {
        self.working
            .fields
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or_else(|| IcebergError::Internal {
                message: format!("Field {id} missing from working schema"),
            })
    }

    /// Adds an optional column at the end of the schema.
    ///
    /// # Errors
    ///
    /// Returns `IcebergError::Validation` if a column with that name exists.
    pub fn add_column(
        &mut self,
        name: &str,
        field_type: PrimitiveType,
        doc: Option<&str>,
    ) -> IcebergResult<&mut Self> {
        if self.working.field_by_name(name).is_some() {
            return Err(IcebergError::validation(format!(
                "Cannot add column, name already exists: {name}"
            )));
        }
        let mut field = NestedField::optional(self.next_column_id, name, field_type);
        field.doc = doc.map(str::to_string);
        self.next_column_id += 1;
        self.working.fields.push(field);
        Ok(self)
    }

    /// Changes a column's type.
    ///
    /// # Errors
    ///
    /// Returns `IcebergError::Validation` if the column is missing or the
    /// change is not a permitted widening.
    pub fn update_column(
        &mut self,
        name: &str,
        field_type: PrimitiveType,
    ) -> IcebergResult<&mut Self> {
        let id = self.original_id(name)?;
        let field = self.working_field(id)?;
        if !field.field_type.can_promote_to(&field_type) {
            return Err(IcebergError::validation(format!(
                "Cannot change column type: {name}: {} -> {field_type}",
                field.field_type
            )));
        }
        field.field_type = field_type;
        Ok(self)
    }

    /// Renames a column.
    ///
    /// # Errors
    ///
    /// Returns `IcebergError::Validation` if the column is missing or the new
    /// name is taken.
    pub fn rename_column(&mut self, name: &str, new_name: &str) -> IcebergResult<&mut Self> {
        let id = self.original_id(name)?;
        if self
            .working
            .field_by_name(new_name)
            .is_some_and(|f| f.id != id)
        {
            return Err(IcebergError::validation(format!(
                "Cannot rename {name}: name already exists: {new_name}"
            )));
        }
        self.working_field(id)?.name = new_name.to_string();
        Ok(self)
    }

    /// Replaces a column's comment.
    ///
    /// # Errors
    ///
    /// Returns `IcebergError::Validation` if the column is missing.
    pub fn update_column_doc(&mut self, name: &str, doc: &str) -> IcebergResult<&mut Self> {
        let id = self.original_id(name)?;
        self.working_field(id)?.doc = Some(doc.to_string());
        Ok(self)
    }

    /// Deletes a column.
    ///
    /// # Errors
    ///
    /// Returns `IcebergError::Validation` if the column is missing.
    pub fn delete_column(&mut self, name: &str) -> IcebergResult<&mut Self> {
        let id = self.original_id(name)?;
        self.working.fields.retain(|f| f.id != id);
        self.deleted.insert(id);
        Ok(self)
    }

    /// Returns the schema as it would be committed.
    #[must_use]
    pub fn apply(&self) -> &Schema {
        &self.working
    }

    /// Commits the schema change.
    ///
    /// # Errors
    ///
    /// Returns `IcebergError::Validation` if the resulting schema would
    /// orphan a partition field and `IcebergError::CommitFailed` if another
    /// writer committed first.
    pub async fn commit(self) -> IcebergResult<()> {
        let next = self.base.with_schema(self.working)?;
        let schema_id = next.current_schema_id;
        self.ops.commit(&self.base, next).await?;
        tracing::debug!(schema_id, "committed schema update");
        Ok(())
    }
}
