//! DDL against the table-format catalog.
//!
//! Every operation issues at most one commit. Requests the format would
//! reject are checked up front against the catalog's cached copy of the
//! table, so an invalid statement makes no external call at all.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use keel_core::observability::commit_span;
use keel_iceberg::types::{NestedField, PartitionSpec, PrimitiveType, Schema, TableIdent};
use keel_iceberg::{Table, TableCatalog};
use tracing::Instrument;

use crate::commit::{self, IcebergOperationParam};
use crate::error::{CatalogError, CatalogResult};
use crate::metrics;
use crate::partition_spec::{IcebergPartitionSpec, PartitionSpecTranslator};
use crate::properties::strip_metastore_only;
use crate::table::IcebergTable;

/// Column type as written in DDL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    /// A primitive type.
    Primitive(PrimitiveType),
    /// `array<element>`.
    Array(Box<ColumnType>),
    /// `map<key,value>`.
    Map(Box<ColumnType>, Box<ColumnType>),
    /// `struct<...>`.
    Struct(Vec<ColumnDef>),
}

impl ColumnType {
    /// Returns the primitive type, or `None` for complex types.
    #[must_use]
    pub fn as_primitive(&self) -> Option<PrimitiveType> {
        match self {
            Self::Primitive(t) => Some(*t),
            _ => None,
        }
    }

    fn require_primitive(&self, column: &str) -> CatalogResult<PrimitiveType> {
        self.as_primitive().ok_or_else(|| {
            CatalogError::precondition(format!(
                "Complex type {self} of column '{column}' is not supported"
            ))
        })
    }
}

impl From<PrimitiveType> for ColumnType {
    fn from(t: PrimitiveType) -> Self {
        Self::Primitive(t)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primitive(t) => write!(f, "{t}"),
            Self::Array(element) => write!(f, "array<{element}>"),
            Self::Map(key, value) => write!(f, "map<{key},{value}>"),
            Self::Struct(fields) => {
                f.write_str("struct<")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}:{}", field.name, field.column_type)?;
                }
                f.write_str(">")
            }
        }
    }
}

/// A column definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Column type.
    pub column_type: ColumnType,
    /// Comment.
    pub comment: Option<String>,
    /// Whether the column may hold nulls.
    pub nullable: bool,
}

impl ColumnDef {
    /// Creates a nullable column without a comment.
    #[must_use]
    pub fn new(name: impl Into<String>, column_type: impl Into<ColumnType>) -> Self {
        Self {
            name: name.into(),
            column_type: column_type.into(),
            comment: None,
            nullable: true,
        }
    }

    /// Marks the column as required.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Sets the comment.
    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Runs DDL and DML commits against a table-format catalog.
#[derive(Clone)]
pub struct IcebergCatalogOps {
    catalog: Arc<dyn TableCatalog>,
}

impl fmt::Debug for IcebergCatalogOps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IcebergCatalogOps")
            .field("catalog", &self.catalog.name())
            .finish()
    }
}

impl IcebergCatalogOps {
    /// Creates an executor over `catalog`.
    #[must_use]
    pub fn new(catalog: Arc<dyn TableCatalog>) -> Self {
        Self { catalog }
    }

    /// Creates a table.
    ///
    /// Column ids are assigned in order from 1. Metastore-only properties
    /// are not passed to the format.
    ///
    /// # Errors
    ///
    /// Returns a precondition error for complex column types and format
    /// errors (such as an existing table) unchanged.
    pub async fn create_table(
        &self,
        ident: &TableIdent,
        columns: &[ColumnDef],
        partition_spec: Option<&IcebergPartitionSpec>,
        location: Option<&str>,
        properties: &HashMap<String, String>,
    ) -> CatalogResult<Table> {
        let mut fields = Vec::with_capacity(columns.len());
        for (id, column) in (1..).zip(columns) {
            let field_type = column.column_type.require_primitive(&column.name)?;
            let mut field = if column.nullable {
                NestedField::optional(id, &column.name, field_type)
            } else {
                NestedField::required(id, &column.name, field_type)
            };
            field.doc.clone_from(&column.comment);
            fields.push(field);
        }
        let schema = Schema::new(fields);
        let spec = match partition_spec {
            Some(spec) => PartitionSpecTranslator::to_external(spec, &schema)?,
            None => PartitionSpec::unpartitioned(),
        };
        let properties = strip_metastore_only(properties);

        let span = commit_span("create_table", &ident.namespace, &ident.name);
        let result = async {
            let table = self
                .catalog
                .create_table(ident, schema, spec, location, properties)
                .await?;
            tracing::info!(location = table.location(), "created table");
            Ok::<_, CatalogError>(table)
        }
        .instrument(span)
        .await;
        finish("create_table", result)
    }

    /// Drops a table and returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::TableNotFound`] if the table does not exist
    /// and `if_exists` is false.
    pub async fn drop_table(
        &self,
        ident: &TableIdent,
        if_exists: bool,
        purge: bool,
    ) -> CatalogResult<bool> {
        let span = commit_span("drop_table", &ident.namespace, &ident.name);
        let result = async {
            let existed = self.catalog.drop_table(ident, purge).await?;
            if !existed && !if_exists {
                return Err(CatalogError::TableNotFound {
                    message: format!("Table '{ident}' does not exist in Iceberg catalog."),
                });
            }
            tracing::info!(existed, purge, "dropped table");
            Ok::<_, CatalogError>(existed)
        }
        .instrument(span)
        .await;
        finish("drop_table", result)
    }

    /// Renames a table.
    ///
    /// # Errors
    ///
    /// Returns format errors unchanged.
    pub async fn rename_table(&self, from: &TableIdent, to: &TableIdent) -> CatalogResult<()> {
        let span = commit_span("rename_table", &from.namespace, &from.name);
        let result = async {
            self.catalog.rename_table(from, to).await?;
            tracing::info!(to = %to, "renamed table");
            Ok::<_, CatalogError>(())
        }
        .instrument(span)
        .await;
        finish("rename_table", result)
    }

    /// Adds optional columns at the end of the schema.
    ///
    /// # Errors
    ///
    /// Returns a precondition error for complex types or names already in
    /// use; format errors unchanged.
    pub async fn add_columns(
        &self,
        table: &IcebergTable,
        columns: &[ColumnDef],
    ) -> CatalogResult<()> {
        let mut typed = Vec::with_capacity(columns.len());
        for column in columns {
            let field_type = column.column_type.require_primitive(&column.name)?;
            if table.schema().field_by_name(&column.name).is_some() {
                return Err(CatalogError::precondition(format!(
                    "Column '{}' already exists in table {}",
                    column.name,
                    table.full_name()
                )));
            }
            typed.push((column, field_type));
        }

        let result = self
            .update_schema(table, "add_columns", |update| {
                for (column, field_type) in &typed {
                    update.add_column(&column.name, *field_type, column.comment.as_deref())?;
                }
                Ok(())
            })
            .await;
        finish("add_columns", result)
    }

    /// Changes a column's type, name and comment in one commit.
    ///
    /// Only int to long, float to double and decimal precision increases
    /// with the same scale are allowed type changes.
    ///
    /// # Errors
    ///
    /// Returns a precondition error, without contacting the format, if the
    /// column does not exist, the new type is complex or the type change is
    /// not allowed. Format errors are returned unchanged.
    pub async fn alter_column(
        &self,
        table: &IcebergTable,
        column: &str,
        new_column: &ColumnDef,
    ) -> CatalogResult<()> {
        let new_type = new_column.column_type.require_primitive(&new_column.name)?;
        let current = table.schema().field_by_name(column).ok_or_else(|| {
            CatalogError::precondition(format!(
                "Column '{column}' does not exist in table {}",
                table.full_name()
            ))
        })?;
        if !current.field_type.can_promote_to(&new_type) {
            return Err(CatalogError::precondition(format!(
                "Cannot change column type for column: {column} from {} to {new_type}",
                current.field_type
            )));
        }
        let type_changed = current.field_type != new_type;
        let renamed = current.name != new_column.name;

        let result = self
            .update_schema(table, "alter_column", |update| {
                if type_changed {
                    update.update_column(column, new_type)?;
                }
                if renamed {
                    update.rename_column(column, &new_column.name)?;
                }
                if let Some(comment) = new_column.comment.as_deref().filter(|c| !c.is_empty()) {
                    update.update_column_doc(column, comment)?;
                }
                Ok(())
            })
            .await;
        finish("alter_column", result)
    }

    /// Drops a column.
    ///
    /// # Errors
    ///
    /// Returns a precondition error if the column does not exist; format
    /// errors (such as dropping a partition source column) unchanged.
    pub async fn drop_column(&self, table: &IcebergTable, column: &str) -> CatalogResult<()> {
        if table.schema().field_by_name(column).is_none() {
            return Err(CatalogError::precondition(format!(
                "Column '{column}' does not exist in table {}",
                table.full_name()
            )));
        }
        let result = self
            .update_schema(table, "drop_column", |update| {
                update.delete_column(column)?;
                Ok(())
            })
            .await;
        finish("drop_column", result)
    }

    /// Makes `spec` the table's default partition spec and returns its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the spec does not resolve against the current
    /// schema; format errors unchanged.
    pub async fn set_partition_spec(
        &self,
        table: &IcebergTable,
        spec: &IcebergPartitionSpec,
    ) -> CatalogResult<i32> {
        let span = commit_span("set_partition_spec", table.db_name(), table.table_name());
        let result = async {
            let native = self.catalog.load_table(table.ident()).await?;
            let base = native.metadata();
            let external = PartitionSpecTranslator::to_external_after(
                spec,
                base.current_schema()?,
                base.last_partition_id,
            )?;
            let next = base.update_partition_spec(external)?;
            let spec_id = next.default_spec_id;
            native.operations().commit(base, next).await?;
            tracing::info!(spec_id, "set partition spec");
            Ok::<_, CatalogError>(spec_id)
        }
        .instrument(span)
        .await;
        finish("set_partition_spec", result)
    }

    /// Removes every data file in one delete snapshot.
    ///
    /// # Errors
    ///
    /// Returns format errors unchanged.
    pub async fn truncate_table(&self, table: &IcebergTable) -> CatalogResult<i64> {
        let span = commit_span("truncate", table.db_name(), table.table_name());
        let result = async {
            let native = self.catalog.load_table(table.ident()).await?;
            let mut delete = native.new_delete();
            delete.delete_all();
            let snapshot_id = delete.commit().await?;
            tracing::info!(snapshot_id, "truncated table");
            Ok::<_, CatalogError>(snapshot_id)
        }
        .instrument(span)
        .await;
        finish("truncate", result)
    }

    /// Commits newly written files; see [`commit::append_files`].
    ///
    /// # Errors
    ///
    /// Returns a precondition error for malformed requests; commit errors
    /// unchanged.
    pub async fn append_files(
        &self,
        table: &IcebergTable,
        param: &IcebergOperationParam,
    ) -> CatalogResult<i64> {
        let operation = if param.is_overwrite { "overwrite" } else { "append" };
        let span = commit_span(operation, table.db_name(), table.table_name());
        async {
            let native = self.catalog.load_table(table.ident()).await?;
            let snapshot_id = commit::append_files(&native, param).await?;
            tracing::info!(snapshot_id, files = param.data_files.len(), "committed data files");
            Ok::<_, CatalogError>(snapshot_id)
        }
        .instrument(span)
        .await
    }

    async fn update_schema<F>(
        &self,
        table: &IcebergTable,
        operation: &'static str,
        apply: F,
    ) -> CatalogResult<()>
    where
        F: FnOnce(&mut keel_iceberg::update::UpdateSchema) -> CatalogResult<()>,
    {
        let span = commit_span(operation, table.db_name(), table.table_name());
        async {
            let native = self.catalog.load_table(table.ident()).await?;
            let mut update = native.update_schema()?;
            apply(&mut update)?;
            update.commit().await?;
            tracing::info!("committed schema change");
            Ok::<_, CatalogError>(())
        }
        .instrument(span)
        .await
    }
}

fn finish<T>(operation: &'static str, result: CatalogResult<T>) -> CatalogResult<T> {
    if let Err(error) = &result {
        tracing::warn!(operation, error = %error, "catalog operation failed");
    }
    metrics::record_commit(
        operation,
        result.as_ref().is_err_and(CatalogError::is_commit_conflict),
    );
    result
}
