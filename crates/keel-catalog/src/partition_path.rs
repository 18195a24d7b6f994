//! Decoding of Hive-style partition paths into partition tuples.
//!
//! Writers report the partition of every new data file as a relative path
//! such as `region=EU/ts_day=2024-03-05`. Each segment holds one field of the
//! partition spec, in spec order, with its value escaped the way Hive escapes
//! directory names.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use keel_iceberg::types::{
    Literal, PartitionData, PartitionField, PartitionSpec, PrimitiveType, Schema, Transform,
};

use crate::error::{CatalogError, CatalogResult};

/// Directory value standing for a null partition value.
pub const HIVE_DEFAULT_PARTITION: &str = "__HIVE_DEFAULT_PARTITION__";

const EPOCH_YEAR: i32 = 1970;

/// Decodes `path` into a partition tuple of `spec`.
///
/// Returns `Ok(None)` for an unpartitioned spec, whatever the path.
///
/// # Errors
///
/// Returns a precondition error if the path does not list the spec's fields
/// in order, or if a value cannot be parsed as its field's result type.
pub fn decode(path: &str, spec: &PartitionSpec, schema: &Schema) -> CatalogResult<Option<PartitionData>> {
    if spec.is_unpartitioned() {
        return Ok(None);
    }
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() != spec.fields.len() {
        return Err(CatalogError::precondition(format!(
            "Partition path '{path}' has {} segments but partition spec {} has {} fields",
            segments.len(),
            spec.spec_id,
            spec.fields.len()
        )));
    }

    let mut values = Vec::with_capacity(segments.len());
    for (segment, field) in segments.into_iter().zip(&spec.fields) {
        let (name, raw) = segment.split_once('=').ok_or_else(|| {
            CatalogError::precondition(format!("Malformed partition path segment '{segment}' in '{path}'"))
        })?;
        let name = unescape(name)?;
        if !name.eq_ignore_ascii_case(&field.name) {
            return Err(CatalogError::precondition(format!(
                "Expected partition field '{}' but found '{name}' in '{path}'",
                field.name
            )));
        }
        values.push(decode_value(raw, field, schema)?);
    }
    Ok(Some(PartitionData::new(values)))
}

fn decode_value(raw: &str, field: &PartitionField, schema: &Schema) -> CatalogResult<Option<Literal>> {
    if raw == HIVE_DEFAULT_PARTITION || field.transform == Transform::Void {
        return Ok(None);
    }
    let value = unescape(raw)?;
    let source = schema.field_by_id(field.source_id).ok_or_else(|| {
        CatalogError::precondition(format!(
            "Partition field '{}' refers to unknown column id {}",
            field.name, field.source_id
        ))
    })?;
    let invalid = || {
        CatalogError::precondition(format!(
            "Invalid value '{value}' for partition field '{}' ({})",
            field.name, field.transform
        ))
    };

    let literal = match field.transform {
        Transform::Identity | Transform::Truncate(_) => {
            parse_literal(&value, source.field_type).ok_or_else(invalid)?
        }
        Transform::Bucket(_) => Literal::Int(value.parse().map_err(|_| invalid())?),
        Transform::Year => Literal::Int(
            value
                .parse::<i32>()
                .ok()
                .and_then(|year| year.checked_sub(EPOCH_YEAR))
                .ok_or_else(invalid)?,
        ),
        Transform::Month => Literal::Int(months_from_epoch(&value).ok_or_else(invalid)?),
        Transform::Day => Literal::Int(days_from_epoch(&value).ok_or_else(invalid)?),
        Transform::Hour => Literal::Int(hours_from_epoch(&value).ok_or_else(invalid)?),
        Transform::Void => return Ok(None),
    };
    Ok(Some(literal))
}

fn parse_literal(value: &str, source: PrimitiveType) -> Option<Literal> {
    match source {
        PrimitiveType::Boolean => match value.to_ascii_lowercase().as_str() {
            "true" => Some(Literal::Boolean(true)),
            "false" => Some(Literal::Boolean(false)),
            _ => None,
        },
        PrimitiveType::Int => value.parse().ok().map(Literal::Int),
        PrimitiveType::Long => value.parse().ok().map(Literal::Long),
        PrimitiveType::Decimal { scale, .. } => parse_decimal(value, scale).map(Literal::Decimal),
        PrimitiveType::Date => {
            let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()?;
            Some(Literal::Date(days_since_epoch(date)?))
        }
        PrimitiveType::Timestamp | PrimitiveType::Timestamptz => parse_timestamp(value)
            .map(|ts| Literal::Timestamp(ts.and_utc().timestamp_micros())),
        PrimitiveType::String => Some(Literal::String(value.to_string())),
        PrimitiveType::Binary => Some(Literal::Binary(value.as_bytes().to_vec())),
        PrimitiveType::Float | PrimitiveType::Double => None,
    }
}

/// Checks a decimal literal and returns it unchanged.
fn parse_decimal(value: &str, scale: u32) -> Option<String> {
    let digits = value.strip_prefix('-').unwrap_or(value);
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    let valid = !int_part.is_empty()
        && all_digits(int_part)
        && all_digits(frac_part)
        && u32::try_from(frac_part.len()).is_ok_and(|len| len <= scale);
    valid.then(|| value.to_string())
}

fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

fn days_since_epoch(date: NaiveDate) -> Option<i32> {
    let epoch = NaiveDate::from_ymd_opt(EPOCH_YEAR, 1, 1)?;
    i32::try_from(date.signed_duration_since(epoch).num_days()).ok()
}

fn months_from_epoch(value: &str) -> Option<i32> {
    let (year, month) = value.split_once('-')?;
    let year: i32 = year.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, 1)?;
    let month = i32::try_from(month).ok()?;
    (year - EPOCH_YEAR).checked_mul(12)?.checked_add(month - 1)
}

fn days_from_epoch(value: &str) -> Option<i32> {
    days_since_epoch(NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()?)
}

fn hours_from_epoch(value: &str) -> Option<i32> {
    let (date, hour) = value.rsplit_once('-')?;
    let hour: i32 = hour.parse().ok().filter(|h| (0..24).contains(h))?;
    days_from_epoch(date)?.checked_mul(24)?.checked_add(hour)
}

/// Reverses Hive's `%XX` escaping of path characters.
fn unescape(value: &str) -> CatalogResult<String> {
    if !value.contains('%') {
        return Ok(value.to_string());
    }
    let malformed = || {
        CatalogError::precondition(format!(
            "Malformed escape sequence in partition path value '{value}'"
        ))
    };
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = value.get(i + 1..i + 3).ok_or_else(malformed)?;
            out.push(u8::from_str_radix(hex, 16).map_err(|_| malformed())?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| malformed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_iceberg::types::NestedField;

    fn schema() -> Schema {
        Schema::new(vec![
            NestedField::required(1, "id", PrimitiveType::Long),
            NestedField::optional(2, "region", PrimitiveType::String),
            NestedField::optional(3, "ts", PrimitiveType::Timestamp),
            NestedField::optional(4, "price", PrimitiveType::Decimal { precision: 9, scale: 2 }),
            NestedField::optional(5, "day", PrimitiveType::Date),
        ])
    }

    fn decode_one(path: &str, spec: &PartitionSpec) -> Vec<Option<Literal>> {
        decode(path, spec, &schema())
            .expect("decode")
            .expect("partitioned")
            .values()
            .to_vec()
    }

    #[test]
    fn test_unpartitioned_spec_yields_none() {
        let spec = PartitionSpec::unpartitioned();
        assert!(decode("anything", &spec, &schema()).expect("decode").is_none());
    }

    #[test]
    fn test_identity_and_bucket_values() {
        let spec = PartitionSpec::builder(&schema())
            .identity("region")
            .bucket("id", 8)
            .identity("price")
            .identity("day")
            .build()
            .expect("spec");
        let values = decode_one("region=North%20EU/id_bucket=3/price=12.50/day=1970-01-11", &spec);
        assert_eq!(
            values,
            vec![
                Some(Literal::String("North EU".into())),
                Some(Literal::Int(3)),
                Some(Literal::Decimal("12.50".into())),
                Some(Literal::Date(10)),
            ]
        );
    }

    #[test]
    fn test_time_transforms_are_epoch_offsets() {
        let schema = schema();
        for (transform, value, expected) in [
            (Transform::Year, "2024", 54),
            (Transform::Month, "1971-03", 14),
            (Transform::Day, "1970-02-01", 31),
            (Transform::Hour, "1970-01-02-05", 29),
        ] {
            let spec = PartitionSpec::builder(&schema).add("ts", transform).build().expect("spec");
            let path = format!("{}={value}", spec.fields[0].name);
            assert_eq!(decode_one(&path, &spec), vec![Some(Literal::Int(expected))], "{transform}");
        }
    }

    #[test]
    fn test_hour_offset_overflow_is_rejected() {
        // 89_478_485 days * 24 is 7 below i32::MAX.
        assert_eq!(hours_from_epoch("+246953-10-09-07"), Some(i32::MAX));
        assert_eq!(hours_from_epoch("+246953-10-09-23"), None);

        let spec = PartitionSpec::builder(&schema())
            .add("ts", Transform::Hour)
            .build()
            .expect("spec");
        assert!(matches!(
            decode("ts_hour=+246953-10-09-23", &spec, &schema()),
            Err(CatalogError::Precondition { .. })
        ));
    }

    #[test]
    fn test_identity_timestamp_to_micros() {
        let spec = PartitionSpec::builder(&schema()).identity("ts").build().expect("spec");
        assert_eq!(
            decode_one("ts=1970-01-01 00%3A00%3A01", &spec),
            vec![Some(Literal::Timestamp(1_000_000))]
        );
    }

    #[test]
    fn test_default_partition_is_null() {
        let spec = PartitionSpec::builder(&schema())
            .identity("region")
            .add("ts", Transform::Void)
            .build()
            .expect("spec");
        assert_eq!(
            decode_one("region=__HIVE_DEFAULT_PARTITION__/ts_null=whatever", &spec),
            vec![None, None]
        );
    }

    #[test]
    fn test_rejects_malformed_paths() {
        let spec = PartitionSpec::builder(&schema())
            .identity("region")
            .bucket("id", 8)
            .build()
            .expect("spec");
        for path in [
            "region=EU",
            "id_bucket=1/region=EU",
            "region=EU/id_bucket=x",
            "region/id_bucket=1",
            "region=%ZZ/id_bucket=1",
        ] {
            assert!(
                matches!(decode(path, &spec, &schema()), Err(CatalogError::Precondition { .. })),
                "{path}"
            );
        }
    }

    #[test]
    fn test_decimal_scale_is_checked() {
        assert_eq!(parse_decimal("-1.25", 2).as_deref(), Some("-1.25"));
        assert!(parse_decimal("1.255", 2).is_none());
        assert!(parse_decimal("abc", 2).is_none());
    }
}
