//! Translation between the table format's partition specs and the catalog's.
//!
//! The catalog keeps its own copy of every spec with source columns resolved
//! to names and transform parameters captured verbatim, so it can render a
//! spec back to SQL without consulting the table format again.

use std::fmt;

use keel_iceberg::types::{PARTITION_DATA_ID_START, PartitionSpec, Schema, Transform};
use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, CatalogResult};

/// Kind of a partition transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IcebergTransformType {
    /// Source value, unmodified.
    Identity,
    /// Hours since the epoch.
    Hour,
    /// Days since the epoch.
    Day,
    /// Months since the epoch.
    Month,
    /// Years since the epoch.
    Year,
    /// Hash bucket; takes a bucket count.
    Bucket,
    /// Truncation; takes a width.
    Truncate,
    /// Always null.
    Void,
}

impl fmt::Display for IcebergTransformType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Identity => "IDENTITY",
            Self::Hour => "HOUR",
            Self::Day => "DAY",
            Self::Month => "MONTH",
            Self::Year => "YEAR",
            Self::Bucket => "BUCKET",
            Self::Truncate => "TRUNCATE",
            Self::Void => "VOID",
        };
        f.write_str(name)
    }
}

/// A transform kind and its optional parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IcebergPartitionTransform {
    /// Transform kind.
    pub transform_type: IcebergTransformType,
    /// Bucket count or truncate width.
    pub transform_param: Option<u32>,
}

impl IcebergPartitionTransform {
    /// Creates a transform without a parameter.
    #[must_use]
    pub const fn new(transform_type: IcebergTransformType) -> Self {
        Self {
            transform_type,
            transform_param: None,
        }
    }

    /// Creates a transform with a parameter.
    #[must_use]
    pub const fn with_param(transform_type: IcebergTransformType, param: u32) -> Self {
        Self {
            transform_type,
            transform_param: Some(param),
        }
    }

    /// Renders the transform applied to `column`, e.g. `BUCKET(16, id)`.
    #[must_use]
    pub fn to_sql(&self, column: &str) -> String {
        match (self.transform_type, self.transform_param) {
            (IcebergTransformType::Identity, _) => column.to_string(),
            (kind, Some(param)) => format!("{kind}({param}, {column})"),
            (kind, None) => format!("{kind}({column})"),
        }
    }

    fn to_external(self) -> CatalogResult<Transform> {
        let param = || {
            self.transform_param.filter(|p| *p > 0).ok_or_else(|| {
                CatalogError::precondition(format!(
                    "{} transform requires a positive parameter",
                    self.transform_type
                ))
            })
        };
        Ok(match self.transform_type {
            IcebergTransformType::Identity => Transform::Identity,
            IcebergTransformType::Hour => Transform::Hour,
            IcebergTransformType::Day => Transform::Day,
            IcebergTransformType::Month => Transform::Month,
            IcebergTransformType::Year => Transform::Year,
            IcebergTransformType::Bucket => Transform::Bucket(param()?),
            IcebergTransformType::Truncate => Transform::Truncate(param()?),
            IcebergTransformType::Void => Transform::Void,
        })
    }
}

impl From<Transform> for IcebergPartitionTransform {
    fn from(transform: Transform) -> Self {
        use IcebergTransformType as T;
        match transform {
            Transform::Identity => Self::new(T::Identity),
            Transform::Bucket(n) => Self::with_param(T::Bucket, n),
            Transform::Truncate(w) => Self::with_param(T::Truncate, w),
            Transform::Year => Self::new(T::Year),
            Transform::Month => Self::new(T::Month),
            Transform::Day => Self::new(T::Day),
            Transform::Hour => Self::new(T::Hour),
            Transform::Void => Self::new(T::Void),
        }
    }
}

impl fmt::Display for IcebergPartitionTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.transform_param {
            Some(param) => write!(f, "{}[{param}]", self.transform_type),
            None => write!(f, "{}", self.transform_type),
        }
    }
}

/// One field of a catalog-side partition spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcebergPartitionField {
    /// Source column ID.
    pub source_id: i32,
    /// Partition field ID.
    pub field_id: i32,
    /// Name of the source column.
    pub orig_field_name: String,
    /// Name of the partition field.
    pub field_name: String,
    /// Transform.
    pub transform: IcebergPartitionTransform,
}

impl IcebergPartitionField {
    /// Renders the field as a partition clause item.
    #[must_use]
    pub fn to_sql(&self) -> String {
        self.transform.to_sql(&self.orig_field_name)
    }
}

/// A catalog-side partition spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcebergPartitionSpec {
    /// Spec ID assigned by the table format.
    pub spec_id: i32,
    /// Fields, in spec order.
    pub fields: Vec<IcebergPartitionField>,
}

impl IcebergPartitionSpec {
    /// Returns true if the spec has at least one field.
    #[must_use]
    pub fn has_partition_fields(&self) -> bool {
        !self.fields.is_empty()
    }

    /// Renders the spec as a `PARTITIONED BY SPEC` clause.
    #[must_use]
    pub fn to_sql(&self) -> String {
        let fields: Vec<_> = self.fields.iter().map(IcebergPartitionField::to_sql).collect();
        format!("PARTITIONED BY SPEC ({})", fields.join(", "))
    }
}

/// Converts partition specs between the table format and the catalog.
#[derive(Debug, Clone, Copy, Default)]
pub struct PartitionSpecTranslator;

impl PartitionSpecTranslator {
    /// Converts a table-format spec, resolving source columns via `schema`.
    ///
    /// # Errors
    ///
    /// Returns a precondition error if a source column is not in `schema`.
    pub fn to_internal(spec: &PartitionSpec, schema: &Schema) -> CatalogResult<IcebergPartitionSpec> {
        let fields = spec
            .fields
            .iter()
            .map(|field| {
                let orig_field_name = schema.find_column_name(field.source_id).ok_or_else(|| {
                    CatalogError::precondition(format!(
                        "Partition field {} of spec {} refers to unknown column id {}",
                        field.name, spec.spec_id, field.source_id
                    ))
                })?;
                Ok(IcebergPartitionField {
                    source_id: field.source_id,
                    field_id: field.field_id,
                    orig_field_name: orig_field_name.to_string(),
                    field_name: field.name.clone(),
                    transform: field.transform.into(),
                })
            })
            .collect::<CatalogResult<Vec<_>>>()?;
        Ok(IcebergPartitionSpec {
            spec_id: spec.spec_id,
            fields,
        })
    }

    /// Builds a table-format spec, resolving source columns by name.
    ///
    /// Field IDs are assigned from the start of the partition ID range.
    ///
    /// # Errors
    ///
    /// Returns an error if a column is missing, a transform does not apply to
    /// its column type, or a parameterized transform has no parameter.
    pub fn to_external(spec: &IcebergPartitionSpec, schema: &Schema) -> CatalogResult<PartitionSpec> {
        Self::to_external_after(spec, schema, PARTITION_DATA_ID_START - 1)
    }

    /// Like [`Self::to_external`], assigning field IDs after `last_partition_id`.
    ///
    /// # Errors
    ///
    /// See [`Self::to_external`].
    pub fn to_external_after(
        spec: &IcebergPartitionSpec,
        schema: &Schema,
        last_partition_id: i32,
    ) -> CatalogResult<PartitionSpec> {
        let mut builder = PartitionSpec::builder(schema)
            .with_spec_id(spec.spec_id)
            .with_last_assigned_field_id(last_partition_id);
        for field in &spec.fields {
            builder = builder.add_named(
                &field.orig_field_name,
                Some(&field.field_name),
                field.transform.to_external()?,
            );
        }
        Ok(builder.build()?)
    }
}

/// Returns the spec at `default_spec_id`, or `None` if there are no specs.
///
/// # Panics
///
/// Panics if `specs` is non-empty and `default_spec_id` is out of range.
/// Loaded tables are validated against this before they are published.
#[must_use]
#[allow(clippy::panic)]
pub fn default_partition_spec(
    specs: &[IcebergPartitionSpec],
    default_spec_id: i32,
) -> Option<&IcebergPartitionSpec> {
    if specs.is_empty() {
        return None;
    }
    match usize::try_from(default_spec_id).ok().and_then(|i| specs.get(i)) {
        Some(spec) => Some(spec),
        None => panic!(
            "default partition spec id {default_spec_id} out of range for {} specs",
            specs.len()
        ),
    }
}

/// Column headers of [`partition_spec_rows`].
pub const PARTITION_SPEC_COLUMNS: [&str; 5] = [
    "Partition Id",
    "Source Id",
    "Field Id",
    "Field Name",
    "Field Partition Transform",
];

/// One row of the partition spec listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSpecRow {
    /// Spec ID.
    pub partition_id: i32,
    /// Source column ID.
    pub source_id: i32,
    /// Partition field ID.
    pub field_id: i32,
    /// Partition field name.
    pub field_name: String,
    /// Transform, e.g. `BUCKET[16]`.
    pub transform: String,
}

/// Lists the fields of `spec`, one row per field.
#[must_use]
pub fn partition_spec_rows(spec: &IcebergPartitionSpec) -> Vec<PartitionSpecRow> {
    spec.fields
        .iter()
        .map(|field| PartitionSpecRow {
            partition_id: spec.spec_id,
            source_id: field.source_id,
            field_id: field.field_id,
            field_name: field.field_name.clone(),
            transform: field.transform.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_iceberg::types::{NestedField, PrimitiveType};

    fn schema() -> Schema {
        Schema::new(vec![
            NestedField::required(1, "id", PrimitiveType::Long),
            NestedField::optional(2, "region", PrimitiveType::String),
            NestedField::optional(3, "ts", PrimitiveType::Timestamp),
        ])
    }

    fn external() -> PartitionSpec {
        PartitionSpec::builder(&schema())
            .with_spec_id(1)
            .identity("region")
            .bucket("id", 16)
            .add("ts", Transform::Hour)
            .build()
            .expect("spec")
    }

    #[test]
    fn test_to_internal_resolves_names_and_params() {
        let internal = PartitionSpecTranslator::to_internal(&external(), &schema()).expect("internal");
        assert_eq!(internal.spec_id, 1);
        let bucket = &internal.fields[1];
        assert_eq!(bucket.orig_field_name, "id");
        assert_eq!(bucket.field_name, "id_bucket");
        assert_eq!(bucket.field_id, 1001);
        assert_eq!(
            bucket.transform,
            IcebergPartitionTransform::with_param(IcebergTransformType::Bucket, 16)
        );
        assert_eq!(internal.to_sql(), "PARTITIONED BY SPEC (region, BUCKET(16, id), HOUR(ts))");
    }

    #[test]
    fn test_round_trip_through_external() {
        let spec = external();
        let internal = PartitionSpecTranslator::to_internal(&spec, &schema()).expect("internal");
        let back = PartitionSpecTranslator::to_external(&internal, &schema()).expect("external");
        assert_eq!(back, spec);
    }

    #[test]
    fn test_to_external_rejects_bad_fields() {
        let mut internal = PartitionSpecTranslator::to_internal(&external(), &schema()).expect("internal");
        internal.fields[1].transform.transform_param = None;
        assert!(matches!(
            PartitionSpecTranslator::to_external(&internal, &schema()),
            Err(CatalogError::Precondition { .. })
        ));

        internal.fields[1].transform.transform_param = Some(4);
        internal.fields[1].orig_field_name = "missing".into();
        assert!(matches!(
            PartitionSpecTranslator::to_external(&internal, &schema()),
            Err(CatalogError::Runtime(_))
        ));
    }

    #[test]
    fn test_to_internal_rejects_unknown_source() {
        let mut spec = external();
        spec.fields[0].source_id = 99;
        assert!(PartitionSpecTranslator::to_internal(&spec, &schema()).is_err());
    }

    #[test]
    fn test_default_partition_spec() {
        assert!(default_partition_spec(&[], 0).is_none());
        let specs = vec![
            IcebergPartitionSpec { spec_id: 0, fields: vec![] },
            PartitionSpecTranslator::to_internal(&external(), &schema()).expect("internal"),
        ];
        assert_eq!(default_partition_spec(&specs, 1).map(|s| s.spec_id), Some(1));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_default_partition_spec_out_of_range_panics() {
        let specs = vec![IcebergPartitionSpec { spec_id: 0, fields: vec![] }];
        let _ = default_partition_spec(&specs, 1);
    }

    #[test]
    fn test_partition_spec_rows() {
        let internal = PartitionSpecTranslator::to_internal(&external(), &schema()).expect("internal");
        let rows = partition_spec_rows(&internal);
        assert_eq!(rows.len(), 3);
        assert_eq!(
            rows[1],
            PartitionSpecRow {
                partition_id: 1,
                source_id: 1,
                field_id: 1001,
                field_name: "id_bucket".into(),
                transform: "BUCKET[16]".into(),
            }
        );
        assert_eq!(rows[0].transform, "IDENTITY");
    }
}
