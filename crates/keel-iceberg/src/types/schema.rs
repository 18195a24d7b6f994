//! Table schemas and primitive types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{IcebergError, IcebergResult};

/// Primitive column types of the table format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum PrimitiveType {
    /// True or false.
    Boolean,
    /// 32-bit signed integer.
    Int,
    /// 64-bit signed integer.
    Long,
    /// 32-bit IEEE 754 float.
    Float,
    /// 64-bit IEEE 754 float.
    Double,
    /// Fixed-point decimal.
    Decimal {
        /// Total number of digits.
        precision: u32,
        /// Digits after the decimal point.
        scale: u32,
    },
    /// Calendar date without time.
    Date,
    /// Timestamp without time zone, microsecond precision.
    Timestamp,
    /// Timestamp with time zone, microsecond precision.
    Timestamptz,
    /// UTF-8 string.
    String,
    /// Arbitrary bytes.
    Binary,
}

impl PrimitiveType {
    /// Returns true if a column of this type may be widened to `target`.
    ///
    /// Allowed: identity, int to long, float to double, and decimal precision
    /// increases that keep the scale.
    #[must_use]
    pub fn can_promote_to(&self, target: &Self) -> bool {
        match (self, target) {
            (a, b) if a == b => true,
            (Self::Int, Self::Long) | (Self::Float, Self::Double) => true,
            (
                Self::Decimal {
                    precision: p1,
                    scale: s1,
                },
                Self::Decimal {
                    precision: p2,
                    scale: s2,
                },
            ) => s1 == s2 && p2 >= p1,
            _ => false,
        }
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean => f.write_str("boolean"),
            Self::Int => f.write_str("int"),
            Self::Long => f.write_str("long"),
            Self::Float => f.write_str("float"),
            Self::Double => f.write_str("double"),
            Self::Decimal { precision, scale } => write!(f, "decimal({precision},{scale})"),
            Self::Date => f.write_str("date"),
            Self::Timestamp => f.write_str("timestamp"),
            Self::Timestamptz => f.write_str("timestamptz"),
            Self::String => f.write_str("string"),
            Self::Binary => f.write_str("binary"),
        }
    }
}

impl FromStr for PrimitiveType {
    type Err = IcebergError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let parsed = match trimmed {
            "boolean" => Self::Boolean,
            "int" => Self::Int,
            "long" => Self::Long,
            "float" => Self::Float,
            "double" => Self::Double,
            "date" => Self::Date,
            "timestamp" => Self::Timestamp,
            "timestamptz" => Self::Timestamptz,
            "string" => Self::String,
            "binary" => Self::Binary,
            other => {
                let args = other
                    .strip_prefix("decimal(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .ok_or_else(|| IcebergError::unsupported(format!("unknown type '{s}'")))?;
                let (p, sc) = args
                    .split_once(',')
                    .ok_or_else(|| IcebergError::validation(format!("invalid decimal '{s}'")))?;
                let precision = p
                    .trim()
                    .parse()
                    .map_err(|_| IcebergError::validation(format!("invalid decimal '{s}'")))?;
                let scale = sc
                    .trim()
                    .parse()
                    .map_err(|_| IcebergError::validation(format!("invalid decimal '{s}'")))?;
                Self::Decimal { precision, scale }
            }
        };
        Ok(parsed)
    }
}

impl From<PrimitiveType> for String {
    fn from(value: PrimitiveType) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for PrimitiveType {
    type Error = IcebergError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A field in a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NestedField {
    /// Unique field ID.
    pub id: i32,

    /// Field name.
    pub name: String,

    /// Whether the field is required.
    pub required: bool,

    /// Field data type.
    #[serde(rename = "type")]
    pub field_type: PrimitiveType,

    /// Optional column comment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

impl NestedField {
    /// Creates an optional (nullable) field.
    #[must_use]
    pub fn optional(id: i32, name: impl Into<String>, field_type: PrimitiveType) -> Self {
        Self {
            id,
            name: name.into(),
            required: false,
            field_type,
            doc: None,
        }
    }

    /// Creates a required field.
    #[must_use]
    pub fn required(id: i32, name: impl Into<String>, field_type: PrimitiveType) -> Self {
        Self {
            required: true,
            ..Self::optional(id, name, field_type)
        }
    }

    /// Attaches a comment.
    #[must_use]
    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }
}

/// Table schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Schema ID.
    #[serde(rename = "schema-id")]
    pub schema_id: i32,

    /// Schema fields, in column order.
    #[serde(default)]
    pub fields: Vec<NestedField>,
}

impl Schema {
    /// Creates a schema with ID 0.
    #[must_use]
    pub fn new(fields: Vec<NestedField>) -> Self {
        Self {
            schema_id: 0,
            fields,
        }
    }

    /// Looks up a field by ID.
    #[must_use]
    pub fn field_by_id(&self, id: i32) -> Option<&NestedField> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// Looks up a field by name, case-insensitively.
    #[must_use]
    pub fn field_by_name(&self, name: &str) -> Option<&NestedField> {
        self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Returns the name of the column with the given ID.
    #[must_use]
    pub fn find_column_name(&self, id: i32) -> Option<&str> {
        self.field_by_id(id).map(|f| f.name.as_str())
    }

    /// Returns the highest field ID in use, or 0 for an empty schema.
    #[must_use]
    pub fn highest_field_id(&self) -> i32 {
        self.fields.iter().map(|f| f.id).max().unwrap_or(0)
    }

    /// Validates that field IDs and names are unique.
    ///
    /// # Errors
    ///
    /// Returns `IcebergError::Validation` on the first duplicate.
    pub fn validate(&self) -> IcebergResult<()> {
        for (i, field) in self.fields.iter().enumerate() {
            for other in &self.fields[i + 1..] {
                if other.id == field.id {
                    return Err(IcebergError::validation(format!(
                        "Duplicate field id {} in schema",
                        field.id
                    )));
                }
                if other.name.eq_ignore_ascii_case(&field.name) {
                    return Err(IcebergError::validation(format!(
                        "Duplicate column name '{}' in schema",
                        field.name
                    )));
                }
            }
        }
        Ok(())
    }
}
