//! Partition specs, transforms and partition tuples.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::schema::{PrimitiveType, Schema};
use crate::error::{IcebergError, IcebergResult};

/// First field ID assigned to partition fields.
pub const PARTITION_DATA_ID_START: i32 = 1000;

/// Transform applied to a source column to derive a partition value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Transform {
    /// Source value, unmodified.
    Identity,
    /// Hash of the value modulo N.
    Bucket(u32),
    /// Value truncated to width W.
    Truncate(u32),
    /// Years since 1970.
    Year,
    /// Months since 1970-01.
    Month,
    /// Days since 1970-01-01.
    Day,
    /// Hours since 1970-01-01 00:00.
    Hour,
    /// Always null; used to retire a partition field.
    Void,
}

impl Transform {
    /// Returns the transform parameter (bucket count or truncate width).
    #[must_use]
    pub const fn parameter(&self) -> Option<u32> {
        match self {
            Self::Bucket(n) | Self::Truncate(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the type of the partition values this transform produces.
    #[must_use]
    pub const fn result_type(&self, source: PrimitiveType) -> PrimitiveType {
        match self {
            Self::Identity | Self::Truncate(_) | Self::Void => source,
            Self::Bucket(_) | Self::Year | Self::Month | Self::Day | Self::Hour => {
                PrimitiveType::Int
            }
        }
    }

    /// Returns true if the transform can be applied to `source`.
    #[must_use]
    pub const fn can_transform(&self, source: PrimitiveType) -> bool {
        use PrimitiveType as P;
        match self {
            Self::Void => true,
            Self::Identity => !matches!(source, P::Float | P::Double),
            Self::Bucket(_) => !matches!(source, P::Boolean | P::Float | P::Double),
            Self::Truncate(_) => matches!(
                source,
                P::Int | P::Long | P::Decimal { .. } | P::String | P::Binary
            ),
            Self::Year | Self::Month | Self::Day => {
                matches!(source, P::Date | P::Timestamp | P::Timestamptz)
            }
            Self::Hour => matches!(source, P::Timestamp | P::Timestamptz),
        }
    }

    /// Returns the suffix used for default partition field names.
    const fn name_suffix(&self) -> Option<&'static str> {
        match self {
            Self::Identity => None,
            Self::Bucket(_) => Some("bucket"),
            Self::Truncate(_) => Some("trunc"),
            Self::Year => Some("year"),
            Self::Month => Some("month"),
            Self::Day => Some("day"),
            Self::Hour => Some("hour"),
            Self::Void => Some("null"),
        }
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity => f.write_str("identity"),
            Self::Bucket(n) => write!(f, "bucket[{n}]"),
            Self::Truncate(w) => write!(f, "truncate[{w}]"),
            Self::Year => f.write_str("year"),
            Self::Month => f.write_str("month"),
            Self::Day => f.write_str("day"),
            Self::Hour => f.write_str("hour"),
            Self::Void => f.write_str("void"),
        }
    }
}

impl FromStr for Transform {
    type Err = IcebergError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = match s {
            "identity" => Self::Identity,
            "year" => Self::Year,
            "month" => Self::Month,
            "day" => Self::Day,
            "hour" => Self::Hour,
            "void" => Self::Void,
            other => {
                let (kind, rest) = other
                    .split_once('[')
                    .ok_or_else(|| IcebergError::unsupported(format!("unknown transform '{s}'")))?;
                let param = rest
                    .strip_suffix(']')
                    .and_then(|p| p.parse::<u32>().ok())
                    .filter(|p| *p > 0)
                    .ok_or_else(|| {
                        IcebergError::validation(format!("invalid transform parameter in '{s}'"))
                    })?;
                match kind {
                    "bucket" => Self::Bucket(param),
                    "truncate" => Self::Truncate(param),
                    _ => {
                        return Err(IcebergError::unsupported(format!(
                            "unknown transform '{s}'"
                        )));
                    }
                }
            }
        };
        Ok(parsed)
    }
}

impl From<Transform> for String {
    fn from(value: Transform) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for Transform {
    type Error = IcebergError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A field in a partition specification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionField {
    /// Source column ID.
    #[serde(rename = "source-id")]
    pub source_id: i32,

    /// Unique partition field ID.
    #[serde(rename = "field-id")]
    pub field_id: i32,

    /// Partition field name.
    pub name: String,

    /// Transform applied to the source column.
    pub transform: Transform,
}

/// Partition specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSpec {
    /// Spec ID.
    #[serde(rename = "spec-id")]
    pub spec_id: i32,

    /// Partition fields, in partition tuple order.
    #[serde(default)]
    pub fields: Vec<PartitionField>,
}

impl PartitionSpec {
    /// Returns an unpartitioned spec with ID 0.
    #[must_use]
    pub fn unpartitioned() -> Self {
        Self {
            spec_id: 0,
            fields: Vec::new(),
        }
    }

    /// Starts building a spec against `schema`.
    #[must_use]
    pub fn builder(schema: &Schema) -> PartitionSpecBuilder<'_> {
        PartitionSpecBuilder::new(schema)
    }

    /// Returns true if the spec has no fields.
    #[must_use]
    pub fn is_unpartitioned(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the highest partition field ID, or `PARTITION_DATA_ID_START - 1` when empty.
    #[must_use]
    pub fn last_assigned_field_id(&self) -> i32 {
        self.fields
            .iter()
            .map(|f| f.field_id)
            .max()
            .unwrap_or(PARTITION_DATA_ID_START - 1)
    }

    /// Returns true if both specs partition the same way, ignoring IDs.
    #[must_use]
    pub fn is_compatible_with(&self, other: &Self) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(&other.fields)
                .all(|(a, b)| {
                    a.source_id == b.source_id && a.transform == b.transform && a.name == b.name
                })
    }

    /// Returns the result type of every partition field, in order.
    ///
    /// # Errors
    ///
    /// Returns `IcebergError::Validation` if a source column is missing from `schema`.
    pub fn partition_type(&self, schema: &Schema) -> IcebergResult<Vec<PrimitiveType>> {
        self.fields
            .iter()
            .map(|field| {
                let source = schema.field_by_id(field.source_id).ok_or_else(|| {
                    IcebergError::validation(format!(
                        "Cannot find source column {} for partition field '{}'",
                        field.source_id, field.name
                    ))
                })?;
                Ok(field.transform.result_type(source.field_type))
            })
            .collect()
    }
}

/// Builder for [`PartitionSpec`] that resolves source columns by name.
#[derive(Debug)]
pub struct PartitionSpecBuilder<'a> {
    schema: &'a Schema,
    spec_id: i32,
    next_field_id: i32,
    fields: Vec<PartitionField>,
    error: Option<IcebergError>,
}

impl<'a> PartitionSpecBuilder<'a> {
    fn new(schema: &'a Schema) -> Self {
        Self {
            schema,
            spec_id: 0,
            next_field_id: PARTITION_DATA_ID_START,
            fields: Vec::new(),
            error: None,
        }
    }

    /// Sets the spec ID.
    #[must_use]
    pub fn with_spec_id(mut self, spec_id: i32) -> Self {
        self.spec_id = spec_id;
        self
    }

    /// Continues field ID assignment after `last_assigned`.
    #[must_use]
    pub fn with_last_assigned_field_id(mut self, last_assigned: i32) -> Self {
        self.next_field_id = last_assigned.max(PARTITION_DATA_ID_START - 1) + 1;
        self
    }

    /// Adds a field with a default name derived from the column and transform.
    #[must_use]
    pub fn add(self, source_column: &str, transform: Transform) -> Self {
        self.add_named(source_column, None, transform)
    }

    /// Adds a field with an explicit name.
    #[must_use]
    pub fn add_named(
        mut self,
        source_column: &str,
        name: Option<&str>,
        transform: Transform,
    ) -> Self {
        if self.error.is_some() {
            return self;
        }
        let Some(source) = self.schema.field_by_name(source_column) else {
            self.error = Some(IcebergError::validation(format!(
                "Cannot find source column: {source_column}"
            )));
            return self;
        };
        if !transform.can_transform(source.field_type) {
            self.error = Some(IcebergError::validation(format!(
                "Invalid source type {} for transform: {transform}",
                source.field_type
            )));
            return self;
        }
        let name = name.map_or_else(
            || match transform.name_suffix() {
                Some(suffix) => format!("{}_{suffix}", source.name),
                None => source.name.clone(),
            },
            str::to_string,
        );
        if self.fields.iter().any(|f| f.name.eq_ignore_ascii_case(&name)) {
            self.error = Some(IcebergError::validation(format!(
                "Cannot use partition name more than once: {name}"
            )));
            return self;
        }
        self.fields.push(PartitionField {
            source_id: source.id,
            field_id: self.next_field_id,
            name,
            transform,
        });
        self.next_field_id += 1;
        self
    }

    /// Adds an identity field.
    #[must_use]
    pub fn identity(self, source_column: &str) -> Self {
        self.add(source_column, Transform::Identity)
    }

    /// Adds a bucket field.
    #[must_use]
    pub fn bucket(self, source_column: &str, buckets: u32) -> Self {
        self.add(source_column, Transform::Bucket(buckets))
    }

    /// Adds a truncate field.
    #[must_use]
    pub fn truncate(self, source_column: &str, width: u32) -> Self {
        self.add(source_column, Transform::Truncate(width))
    }

    /// Adds a day field.
    #[must_use]
    pub fn day(self, source_column: &str) -> Self {
        self.add(source_column, Transform::Day)
    }

    /// Finishes the spec.
    ///
    /// # Errors
    ///
    /// Returns the first error recorded while adding fields.
    pub fn build(self) -> IcebergResult<PartitionSpec> {
        if let Some(err) = self.error {
            return Err(err);
        }
        Ok(PartitionSpec {
            spec_id: self.spec_id,
            fields: self.fields,
        })
    }
}

/// A single partition value.
///
/// Floating-point values are not valid partition values in this model.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Literal {
    /// Boolean value.
    Boolean(bool),
    /// 32-bit integer (also bucket numbers and time offsets).
    Int(i32),
    /// 64-bit integer.
    Long(i64),
    /// Days since 1970-01-01.
    Date(i32),
    /// Microseconds since the epoch.
    Timestamp(i64),
    /// Decimal in its canonical text form.
    Decimal(String),
    /// UTF-8 string.
    String(String),
    /// Raw bytes.
    Binary(Vec<u8>),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Int(v) | Self::Date(v) => write!(f, "{v}"),
            Self::Long(v) | Self::Timestamp(v) => write!(f, "{v}"),
            Self::Decimal(s) | Self::String(s) => f.write_str(s),
            Self::Binary(bytes) => write!(f, "{} bytes", bytes.len()),
        }
    }
}

/// A partition tuple: one optional value per field of the spec.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct PartitionData {
    values: Vec<Option<Literal>>,
}

impl PartitionData {
    /// Creates a tuple from values in spec field order.
    #[must_use]
    pub fn new(values: Vec<Option<Literal>>) -> Self {
        Self { values }
    }

    /// Creates an all-null tuple of the given arity.
    #[must_use]
    pub fn nulls(arity: usize) -> Self {
        Self {
            values: vec![None; arity],
        }
    }

    /// Returns the values in spec field order.
    #[must_use]
    pub fn values(&self) -> &[Option<Literal>] {
        &self.values
    }

    /// Returns the number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the tuple has no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
