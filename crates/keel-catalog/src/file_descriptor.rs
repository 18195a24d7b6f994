//! File descriptors: the per-file unit of scan planning.
//!
//! A descriptor is a plain value. It records where a data file's blocks live
//! by slot numbers into a shared [`HostIndex`], never by holding on to a
//! filesystem handle, so it stays valid after the resolving connection is
//! gone.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use keel_core::{BlockLocation, FileStatus, FileSystem, HostIndex, NetworkAddress};
use keel_iceberg::types::DataFile;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::CatalogResult;
use crate::metrics;

/// Returns the content hash used to key a data file's descriptor.
///
/// SHA-256 of the absolute path, hex-encoded.
#[must_use]
pub fn path_hash(path: &str) -> String {
    hex::encode(Sha256::digest(path.as_bytes()))
}

/// One replica of a block, by host slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaRef {
    /// Slot of the replica host in the table's host index.
    pub host_idx: usize,
    /// Whether the replica is cached in memory on that host.
    pub cached: bool,
}

/// Placement of one block of a data file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileBlock {
    /// Byte offset of the block.
    pub offset: u64,
    /// Block length in bytes.
    pub length: u64,
    /// Replicas, in the order the storage layer reported them.
    pub replicas: Vec<ReplicaRef>,
}

/// Everything the planner needs to know about one data file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// Path relative to the table root; absolute if the file lives elsewhere.
    pub relative_path: String,
    /// File length in bytes.
    pub file_length: u64,
    /// Last modification time.
    pub modification_time: Option<DateTime<Utc>>,
    /// Block placement; empty when the storage layer does not expose it.
    pub blocks: Vec<FileBlock>,
    /// Whether the file is erasure coded.
    pub erasure_coded: bool,
    /// Replicas whose disk id could not be resolved.
    pub num_unknown_disk_ids: u32,
}

impl FileDescriptor {
    /// Returns the absolute path of the file under `table_root`.
    #[must_use]
    pub fn absolute_path(&self, table_root: &str) -> String {
        if self.relative_path.starts_with('/') || self.relative_path.contains("://") {
            self.relative_path.clone()
        } else {
            format!("{}/{}", table_root.trim_end_matches('/'), self.relative_path)
        }
    }
}

fn relativize(path: &str, table_root: &str) -> String {
    let root = table_root.trim_end_matches('/');
    path.strip_prefix(root)
        .and_then(|rest| rest.strip_prefix('/'))
        .filter(|rest| !rest.is_empty())
        .map_or_else(|| path.to_string(), str::to_string)
}

/// Builds [`FileDescriptor`]s from filesystem metadata.
#[derive(Clone)]
pub struct FileDescriptorResolver {
    fs: Arc<dyn FileSystem>,
}

impl std::fmt::Debug for FileDescriptorResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileDescriptorResolver")
            .field("supports_storage_ids", &self.fs.supports_storage_ids())
            .finish()
    }
}

impl FileDescriptorResolver {
    /// Creates a resolver over `fs`.
    #[must_use]
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    /// Stats `file_path` and builds its descriptor.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be stat-ed or its block locations
    /// cannot be read.
    pub async fn resolve(
        &self,
        file_path: &str,
        table_root: &str,
        host_index: &HostIndex,
    ) -> CatalogResult<FileDescriptor> {
        let status = self.fs.stat(file_path).await?;
        self.resolve_status(&status, table_root, host_index).await
    }

    /// Builds a descriptor from an already-fetched status.
    ///
    /// Block locations attached to `status` are used as-is; otherwise they
    /// are queried when the storage layer supports them.
    ///
    /// # Errors
    ///
    /// Returns an error if block locations cannot be read or a replica host
    /// is not a valid `host:port` address.
    pub async fn resolve_status(
        &self,
        status: &FileStatus,
        table_root: &str,
        host_index: &HostIndex,
    ) -> CatalogResult<FileDescriptor> {
        let mut descriptor = FileDescriptor {
            relative_path: relativize(&status.path, table_root),
            file_length: status.length,
            modification_time: status.modification_time,
            blocks: Vec::new(),
            erasure_coded: status.erasure_coded,
            num_unknown_disk_ids: 0,
        };
        if !self.fs.supports_storage_ids() {
            return Ok(descriptor);
        }

        let queried;
        let locations: &[BlockLocation] = if let Some(located) = &status.block_locations {
            located
        } else {
            queried = self.fs.block_locations(status).await?;
            &queried
        };

        for location in locations {
            let mut replicas = Vec::with_capacity(location.replicas.len());
            for replica in &location.replicas {
                let address: NetworkAddress = replica.host.parse()?;
                if replica.disk_id.is_none() {
                    descriptor.num_unknown_disk_ids += 1;
                }
                replicas.push(ReplicaRef {
                    host_idx: host_index.get_or_insert(address),
                    cached: replica.cached,
                });
            }
            descriptor.blocks.push(FileBlock {
                offset: location.offset,
                length: location.length,
                replicas,
            });
        }

        if descriptor.num_unknown_disk_ids > 0 {
            tracing::debug!(
                path = %status.path,
                unknown = descriptor.num_unknown_disk_ids,
                "block replicas with unknown disk ids"
            );
            metrics::record_unknown_disk_ids(descriptor.num_unknown_disk_ids);
        }
        Ok(descriptor)
    }

    /// Resolves every data file of a snapshot, keyed by [`path_hash`].
    ///
    /// Each distinct path yields exactly one entry. When the storage layer
    /// exposes block placement, the table root is listed once with locations
    /// attached and only files missing from that listing are stat-ed.
    ///
    /// # Errors
    ///
    /// Fails on the first file that cannot be resolved.
    pub async fn resolve_all(
        &self,
        table_root: &str,
        data_files: &[DataFile],
        host_index: &HostIndex,
    ) -> CatalogResult<HashMap<String, FileDescriptor>> {
        let mut located: HashMap<String, FileStatus> = HashMap::new();
        if self.fs.supports_storage_ids() {
            for status in self.fs.list_located(table_root).await? {
                located.insert(status.path.clone(), status);
            }
        }

        let mut pending: HashMap<String, &str> = HashMap::with_capacity(data_files.len());
        for file in data_files {
            pending
                .entry(path_hash(&file.path))
                .or_insert(file.path.as_str());
        }

        let located = &located;
        let resolved = try_join_all(pending.into_iter().map(|(hash, path)| async move {
            let descriptor = match located.get(path) {
                Some(status) => self.resolve_status(status, table_root, host_index).await?,
                None => self.resolve(path, table_root, host_index).await?,
            };
            CatalogResult::Ok((hash, descriptor))
        }))
        .await?;

        tracing::debug!(
            table_root,
            files = resolved.len(),
            hosts = host_index.len(),
            "resolved file descriptors"
        );
        Ok(resolved.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::{BlockReplica, MemoryFileSystem};
    use keel_iceberg::types::{FileFormat, Metrics};

    const ROOT: &str = "/warehouse/sales/orders";

    fn data_file(path: &str) -> DataFile {
        DataFile {
            path: path.to_string(),
            format: FileFormat::Parquet,
            spec_id: 0,
            partition: None,
            record_count: 1,
            file_size_in_bytes: 10,
            metrics: Metrics::with_record_count(1),
        }
    }

    fn block(offset: u64, hosts: &[BlockReplica]) -> BlockLocation {
        BlockLocation {
            offset,
            length: 128,
            replicas: hosts.to_vec(),
        }
    }

    #[test]
    fn test_relativize() {
        assert_eq!(
            relativize("/warehouse/sales/orders/data/a.parquet", ROOT),
            "data/a.parquet"
        );
        assert_eq!(
            relativize("/warehouse/sales/orders/a.parquet", "/warehouse/sales/orders/"),
            "a.parquet"
        );
        assert_eq!(
            relativize("/elsewhere/a.parquet", ROOT),
            "/elsewhere/a.parquet"
        );
        assert_eq!(
            relativize("/warehouse/sales/orders_v2/a.parquet", ROOT),
            "/warehouse/sales/orders_v2/a.parquet"
        );
    }

    #[test]
    fn test_path_hash_is_stable_hex() {
        let hash = path_hash("/a");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, path_hash("/a"));
        assert_ne!(hash, path_hash("/b"));
    }

    #[tokio::test]
    async fn test_object_store_has_no_blocks() {
        let fs = MemoryFileSystem::new();
        fs.put_file(format!("{ROOT}/data/a.parquet"), 42);
        let resolver = FileDescriptorResolver::new(Arc::new(fs));

        let fd = resolver
            .resolve(&format!("{ROOT}/data/a.parquet"), ROOT, &HostIndex::new())
            .await
            .expect("resolve");
        assert_eq!(fd.relative_path, "data/a.parquet");
        assert_eq!(fd.file_length, 42);
        assert!(fd.blocks.is_empty());
        assert_eq!(fd.absolute_path(ROOT), format!("{ROOT}/data/a.parquet"));
    }

    #[tokio::test]
    async fn test_block_store_maps_hosts_and_counts_unknown_disks() {
        let fs = MemoryFileSystem::with_block_locations();
        let path = format!("{ROOT}/data/a.parquet");
        fs.put_file_with_blocks(
            path.clone(),
            256,
            vec![
                block(
                    0,
                    &[
                        BlockReplica::new("dn1:9866", 0),
                        BlockReplica::unknown_disk("dn2:9866"),
                    ],
                ),
                block(128, &[BlockReplica::new("dn2:9866", 1)]),
            ],
            true,
        );
        let resolver = FileDescriptorResolver::new(Arc::new(fs));
        let hosts = HostIndex::new();

        let fd = resolver.resolve(&path, ROOT, &hosts).await.expect("resolve");
        assert!(fd.erasure_coded);
        assert_eq!(fd.num_unknown_disk_ids, 1);
        assert_eq!(hosts.len(), 2);
        assert_eq!(fd.blocks.len(), 2);
        assert_eq!(
            fd.blocks[0].replicas[1].host_idx,
            fd.blocks[1].replicas[0].host_idx
        );
    }

    #[tokio::test]
    async fn test_invalid_replica_host_fails() {
        let fs = MemoryFileSystem::with_block_locations();
        let path = format!("{ROOT}/a.parquet");
        fs.put_file_with_blocks(
            path.clone(),
            1,
            vec![block(0, &[BlockReplica::new("dn1", 0)])],
            false,
        );
        let resolver = FileDescriptorResolver::new(Arc::new(fs));
        assert!(resolver.resolve(&path, ROOT, &HostIndex::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_resolve_all_one_entry_per_distinct_file() {
        let fs = MemoryFileSystem::with_block_locations();
        for name in ["a", "b"] {
            fs.put_file_with_blocks(
                format!("{ROOT}/data/{name}.parquet"),
                128,
                vec![block(0, &[BlockReplica::new("dn1:9866", 0)])],
                false,
            );
        }
        fs.put_file("/external/c.parquet", 7);
        let resolver = FileDescriptorResolver::new(Arc::new(fs));

        let files = vec![
            data_file(&format!("{ROOT}/data/a.parquet")),
            data_file(&format!("{ROOT}/data/b.parquet")),
            data_file(&format!("{ROOT}/data/a.parquet")),
            data_file("/external/c.parquet"),
        ];
        let hosts = HostIndex::new();
        let map = resolver
            .resolve_all(ROOT, &files, &hosts)
            .await
            .expect("resolve all");

        assert_eq!(map.len(), 3);
        let external = &map[&path_hash("/external/c.parquet")];
        assert_eq!(external.relative_path, "/external/c.parquet");
        assert_eq!(map[&path_hash(&format!("{ROOT}/data/b.parquet"))].blocks.len(), 1);
        assert_eq!(hosts.len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_all_fails_on_missing_file() {
        let resolver = FileDescriptorResolver::new(Arc::new(MemoryFileSystem::new()));
        let files = vec![data_file(&format!("{ROOT}/gone.parquet"))];
        let err = resolver
            .resolve_all(ROOT, &files, &HostIndex::new())
            .await
            .expect_err("missing file");
        assert!(matches!(err, crate::error::CatalogError::Storage(ref e) if e.is_not_found()));
    }
}
