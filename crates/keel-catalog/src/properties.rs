//! Table properties understood by the catalog.
//!
//! Properties live in the metastore's flat string map. Unknown or malformed
//! values fall back to defaults instead of failing the load.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use keel_iceberg::types::FileFormat;
use serde::{Deserialize, Serialize};

/// Default data file format.
pub const WRITE_FORMAT_DEFAULT: &str = "write.format.default";
/// Legacy spelling of [`WRITE_FORMAT_DEFAULT`].
pub const LEGACY_FILE_FORMAT: &str = "iceberg.file_format";
/// Catalog implementation backing the table.
pub const ICEBERG_CATALOG: &str = "iceberg.catalog";
/// Root location of a `hadoop.catalog` catalog.
pub const ICEBERG_CATALOG_LOCATION: &str = "iceberg.catalog_location";
/// Identifier of the table inside its catalog, when it differs from `db.table`.
pub const ICEBERG_TABLE_IDENTIFIER: &str = "iceberg.table_identifier";
/// Engine capability flags; meaningful to the metastore only.
pub const CAPABILITIES: &str = "capabilities";
/// Parquet compression codec.
pub const PARQUET_COMPRESSION_CODEC: &str = "write.parquet.compression-codec";
/// Parquet compression level.
pub const PARQUET_COMPRESSION_LEVEL: &str = "write.parquet.compression-level";
/// Parquet row group size in bytes.
pub const PARQUET_ROW_GROUP_SIZE: &str = "write.parquet.row-group-size-bytes";
/// Parquet plain page size in bytes.
pub const PARQUET_PLAIN_PAGE_SIZE: &str = "write.parquet.page-size-bytes";
/// Parquet dictionary page size in bytes.
pub const PARQUET_DICT_PAGE_SIZE: &str = "write.parquet.dict-size-bytes";
/// Storage handler class of a table.
pub const STORAGE_HANDLER: &str = "storage_handler";
/// Table format marker written by some engines.
pub const TABLE_TYPE: &str = "table_type";

/// Storage handler class of snapshot-format tables.
pub const ICEBERG_STORAGE_HANDLER: &str = "org.apache.iceberg.mr.hive.HiveIcebergStorageHandler";

/// Default compression level when ZSTD is used.
pub const DEFAULT_ZSTD_COMPRESSION_LEVEL: i32 = 3;
/// Lowest valid ZSTD compression level.
pub const MIN_ZSTD_COMPRESSION_LEVEL: i32 = 1;
/// Highest valid ZSTD compression level.
pub const MAX_ZSTD_COMPRESSION_LEVEL: i32 = 22;

const MIB: u64 = 1024 * 1024;
/// Smallest accepted row group size.
pub const MIN_ROW_GROUP_SIZE: u64 = 8 * MIB;
/// Largest accepted row group size.
pub const MAX_ROW_GROUP_SIZE: u64 = 2047 * MIB;
/// Smallest accepted page size.
pub const MIN_PAGE_SIZE: u64 = 64 * 1024;
/// Largest accepted page size.
pub const MAX_PAGE_SIZE: u64 = 1024 * MIB;

/// Properties that only make sense in the metastore and are not passed to
/// the table-format catalog on create.
pub const METASTORE_ONLY_PROPERTIES: [&str; 4] = [
    LEGACY_FILE_FORMAT,
    ICEBERG_CATALOG_LOCATION,
    ICEBERG_TABLE_IDENTIFIER,
    CAPABILITIES,
];

/// Returns true if the metastore properties describe a snapshot-format table.
#[must_use]
pub fn is_iceberg_table(params: &HashMap<String, String>) -> bool {
    params
        .get(STORAGE_HANDLER)
        .is_some_and(|v| v == ICEBERG_STORAGE_HANDLER)
        || params
            .get(TABLE_TYPE)
            .is_some_and(|v| v.eq_ignore_ascii_case("ICEBERG"))
}

/// Returns `params` without metastore-only properties.
#[must_use]
pub fn strip_metastore_only(params: &HashMap<String, String>) -> HashMap<String, String> {
    params
        .iter()
        .filter(|(k, _)| !METASTORE_ONLY_PROPERTIES.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Kind of catalog a table is registered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IcebergCatalogKind {
    /// Tables addressed by location only.
    #[default]
    #[serde(rename = "hadoop.tables")]
    HadoopTables,
    /// A directory-based catalog rooted at `iceberg.catalog_location`.
    #[serde(rename = "hadoop.catalog")]
    HadoopCatalog,
    /// The metastore itself acts as the catalog.
    #[serde(rename = "hive.catalog")]
    HiveCatalog,
}

impl IcebergCatalogKind {
    /// Returns the property value naming this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HadoopTables => "hadoop.tables",
            Self::HadoopCatalog => "hadoop.catalog",
            Self::HiveCatalog => "hive.catalog",
        }
    }

    /// Reads the kind from table properties; `None` if absent or unknown.
    #[must_use]
    pub fn from_properties(params: &HashMap<String, String>) -> Option<Self> {
        params.get(ICEBERG_CATALOG)?.parse().ok()
    }
}

impl fmt::Display for IcebergCatalogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IcebergCatalogKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hadoop.tables" => Ok(Self::HadoopTables),
            "hadoop.catalog" => Ok(Self::HadoopCatalog),
            "hive.catalog" => Ok(Self::HiveCatalog),
            other => Err(format!("unknown catalog kind '{other}'")),
        }
    }
}

/// Compression codec for Parquet data files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CompressionCodec {
    /// No compression.
    None,
    /// gzip.
    Gzip,
    /// Snappy.
    Snappy,
    /// LZ4.
    Lz4,
    /// Zstandard.
    Zstd,
}

impl FromStr for CompressionCodec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "uncompressed" => Ok(Self::None),
            "gzip" => Ok(Self::Gzip),
            "snappy" => Ok(Self::Snappy),
            "lz4" => Ok(Self::Lz4),
            "zstd" => Ok(Self::Zstd),
            other => Err(format!("unknown compression codec '{other}'")),
        }
    }
}

/// Parquet compression settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParquetCompression {
    /// Codec.
    pub codec: CompressionCodec,
    /// Level; set only for ZSTD.
    pub level: Option<i32>,
}

impl ParquetCompression {
    /// Resolves compression from table properties.
    ///
    /// Defaults to Snappy. A ZSTD level outside the valid range falls back to
    /// the default level.
    #[must_use]
    pub fn from_properties(params: &HashMap<String, String>) -> Self {
        let codec = params
            .get(PARQUET_COMPRESSION_CODEC)
            .and_then(|v| v.parse().ok())
            .unwrap_or(CompressionCodec::Snappy);
        let level = (codec == CompressionCodec::Zstd).then(|| {
            params
                .get(PARQUET_COMPRESSION_LEVEL)
                .and_then(|v| v.trim().parse::<i32>().ok())
                .filter(|l| (MIN_ZSTD_COMPRESSION_LEVEL..=MAX_ZSTD_COMPRESSION_LEVEL).contains(l))
                .unwrap_or(DEFAULT_ZSTD_COMPRESSION_LEVEL)
        });
        Self { codec, level }
    }
}

fn bounded_size(params: &HashMap<String, String>, key: &str, min: u64, max: u64) -> u64 {
    params
        .get(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| (min..=max).contains(v))
        .unwrap_or(0)
}

/// Write-side defaults resolved from table properties.
///
/// Sizes of 0 mean "not set; use the writer's own default".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteDefaults {
    /// Data file format.
    pub file_format: FileFormat,
    /// Parquet compression.
    pub compression: ParquetCompression,
    /// Parquet row group size.
    pub row_group_size: u64,
    /// Parquet plain page size.
    pub plain_page_size: u64,
    /// Parquet dictionary page size.
    pub dict_page_size: u64,
}

impl WriteDefaults {
    /// Resolves write defaults from table properties.
    #[must_use]
    pub fn from_properties(params: &HashMap<String, String>) -> Self {
        let file_format = params
            .get(WRITE_FORMAT_DEFAULT)
            .or_else(|| params.get(LEGACY_FILE_FORMAT))
            .and_then(|v| v.parse().ok())
            .unwrap_or(FileFormat::Parquet);
        Self {
            file_format,
            compression: ParquetCompression::from_properties(params),
            row_group_size: bounded_size(
                params,
                PARQUET_ROW_GROUP_SIZE,
                MIN_ROW_GROUP_SIZE,
                MAX_ROW_GROUP_SIZE,
            ),
            plain_page_size: bounded_size(
                params,
                PARQUET_PLAIN_PAGE_SIZE,
                MIN_PAGE_SIZE,
                MAX_PAGE_SIZE,
            ),
            dict_page_size: bounded_size(
                params,
                PARQUET_DICT_PAGE_SIZE,
                MIN_PAGE_SIZE,
                MAX_PAGE_SIZE,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_when_unset() {
        let defaults = WriteDefaults::from_properties(&HashMap::new());
        assert_eq!(defaults.file_format, FileFormat::Parquet);
        assert_eq!(
            defaults.compression,
            ParquetCompression {
                codec: CompressionCodec::Snappy,
                level: None
            }
        );
        assert_eq!(defaults.row_group_size, 0);
        assert_eq!(defaults.plain_page_size, 0);
        assert_eq!(defaults.dict_page_size, 0);
    }

    #[test]
    fn test_file_format_prefers_current_key() {
        let p = props(&[(WRITE_FORMAT_DEFAULT, "orc"), (LEGACY_FILE_FORMAT, "avro")]);
        assert_eq!(WriteDefaults::from_properties(&p).file_format, FileFormat::Orc);
        let p = props(&[(LEGACY_FILE_FORMAT, "avro")]);
        assert_eq!(WriteDefaults::from_properties(&p).file_format, FileFormat::Avro);
        let p = props(&[(WRITE_FORMAT_DEFAULT, "csv")]);
        assert_eq!(WriteDefaults::from_properties(&p).file_format, FileFormat::Parquet);
    }

    #[test]
    fn test_zstd_level_range() {
        let level = |value: &str| {
            let p = props(&[
                (PARQUET_COMPRESSION_CODEC, "zstd"),
                (PARQUET_COMPRESSION_LEVEL, value),
            ]);
            ParquetCompression::from_properties(&p).level
        };
        assert_eq!(level("1"), Some(1));
        assert_eq!(level("22"), Some(22));
        assert_eq!(level("0"), Some(DEFAULT_ZSTD_COMPRESSION_LEVEL));
        assert_eq!(level("23"), Some(DEFAULT_ZSTD_COMPRESSION_LEVEL));
        assert_eq!(level("high"), Some(DEFAULT_ZSTD_COMPRESSION_LEVEL));

        let p = props(&[(PARQUET_COMPRESSION_CODEC, "gzip"), (PARQUET_COMPRESSION_LEVEL, "9")]);
        assert_eq!(ParquetCompression::from_properties(&p).level, None);
    }

    #[test]
    fn test_size_bounds() {
        let eight_mib = (8 * MIB).to_string();
        let one_gib = (1024 * MIB).to_string();
        let too_big = (2048 * MIB).to_string();
        let p = props(&[
            (PARQUET_ROW_GROUP_SIZE, eight_mib.as_str()),
            (PARQUET_PLAIN_PAGE_SIZE, "1024"),
            (PARQUET_DICT_PAGE_SIZE, one_gib.as_str()),
        ]);
        let defaults = WriteDefaults::from_properties(&p);
        assert_eq!(defaults.row_group_size, 8 * MIB);
        assert_eq!(defaults.plain_page_size, 0);
        assert_eq!(defaults.dict_page_size, 1024 * MIB);

        let p = props(&[(PARQUET_ROW_GROUP_SIZE, too_big.as_str())]);
        assert_eq!(WriteDefaults::from_properties(&p).row_group_size, 0);
    }

    #[test]
    fn test_table_detection_and_stripping() {
        assert!(is_iceberg_table(&props(&[(STORAGE_HANDLER, ICEBERG_STORAGE_HANDLER)])));
        assert!(is_iceberg_table(&props(&[(TABLE_TYPE, "iceberg")])));
        assert!(!is_iceberg_table(&props(&[(TABLE_TYPE, "hive")])));

        let stripped = strip_metastore_only(&props(&[
            (LEGACY_FILE_FORMAT, "parquet"),
            (ICEBERG_CATALOG_LOCATION, "/cat"),
            (ICEBERG_TABLE_IDENTIFIER, "a.b"),
            (CAPABILITIES, "x"),
            (WRITE_FORMAT_DEFAULT, "parquet"),
        ]));
        assert_eq!(stripped, props(&[(WRITE_FORMAT_DEFAULT, "parquet")]));
    }

    #[test]
    fn test_catalog_kind_parsing() {
        let p = props(&[(ICEBERG_CATALOG, "Hadoop.Catalog")]);
        assert_eq!(
            IcebergCatalogKind::from_properties(&p),
            Some(IcebergCatalogKind::HadoopCatalog)
        );
        assert_eq!(IcebergCatalogKind::from_properties(&HashMap::new()), None);
        assert!("glue".parse::<IcebergCatalogKind>().is_err());
    }
}
