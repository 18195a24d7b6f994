//! Filesystem contract for data-file metadata.
//!
//! The catalog never reads data files; it only needs their length, their
//! erasure-coding status and, where the storage layer exposes it, the hosts
//! holding each block. Distributed block stores report block placement;
//! object stores do not, and callers must degrade to descriptors without
//! block information.
//!
//! Statuses come in two flavours, mirroring how block stores answer:
//! - [`FileSystem::stat`] returns a plain status (no block locations).
//! - [`FileSystem::list_located`] returns statuses with block locations
//!   already attached, saving a round trip per file.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{Error, Result};

/// A single replica of a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockReplica {
    /// `hostname:port` of the node holding the replica.
    pub host: String,
    /// Disk (volume) the replica lives on, when the storage layer knows it.
    pub disk_id: Option<u32>,
    /// Whether the replica is held in the node's memory cache.
    pub cached: bool,
}

impl BlockReplica {
    /// Creates a replica on a known disk.
    #[must_use]
    pub fn new(host: impl Into<String>, disk_id: u32) -> Self {
        Self {
            host: host.into(),
            disk_id: Some(disk_id),
            cached: false,
        }
    }

    /// Creates a replica whose disk could not be determined.
    #[must_use]
    pub fn unknown_disk(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            disk_id: None,
            cached: false,
        }
    }
}

/// Placement of one block of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLocation {
    /// Byte offset of the block within the file.
    pub offset: u64,
    /// Block length in bytes.
    pub length: u64,
    /// Replicas of the block.
    pub replicas: Vec<BlockReplica>,
}

/// Metadata about a stored file.
#[derive(Debug, Clone)]
pub struct FileStatus {
    /// Absolute path of the file.
    pub path: String,
    /// File length in bytes.
    pub length: u64,
    /// Last modification time.
    pub modification_time: Option<DateTime<Utc>>,
    /// Whether the file is stored with erasure coding.
    pub erasure_coded: bool,
    /// Block locations, present only for located listings.
    pub block_locations: Option<Vec<BlockLocation>>,
}

/// Filesystem trait for data-file metadata.
///
/// All storage backends (block stores, object stores, memory) implement this trait.
#[async_trait]
pub trait FileSystem: Send + Sync + 'static {
    /// Returns the status of a single file, without block locations.
    ///
    /// Returns `Error::NotFound` if the file doesn't exist.
    async fn stat(&self, path: &str) -> Result<FileStatus>;

    /// Queries block locations for a file covering its whole length.
    async fn block_locations(&self, status: &FileStatus) -> Result<Vec<BlockLocation>>;

    /// Lists files under `prefix` with block locations attached.
    ///
    /// Returns an empty vec if nothing matches. Order is unspecified.
    async fn list_located(&self, prefix: &str) -> Result<Vec<FileStatus>>;

    /// Returns true if the storage layer exposes block placement and disk ids.
    fn supports_storage_ids(&self) -> bool;
}

#[derive(Debug, Clone)]
struct StoredFile {
    length: u64,
    modification_time: DateTime<Utc>,
    erasure_coded: bool,
    blocks: Vec<BlockLocation>,
}

/// In-memory filesystem for testing.
///
/// Thread-safe via `RwLock`. Not suitable for production.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileSystem {
    files: Arc<RwLock<HashMap<String, StoredFile>>>,
    storage_ids: bool,
}

impl MemoryFileSystem {
    /// Creates an object-store-like filesystem without block placement.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a block-store-like filesystem that reports block placement.
    #[must_use]
    pub fn with_block_locations() -> Self {
        Self {
            files: Arc::default(),
            storage_ids: true,
        }
    }

    /// Adds or replaces a file with no block placement.
    pub fn put_file(&self, path: impl Into<String>, length: u64) {
        self.put_file_with_blocks(path, length, Vec::new(), false);
    }

    /// Adds or replaces a file with explicit block placement.
    pub fn put_file_with_blocks(
        &self,
        path: impl Into<String>,
        length: u64,
        blocks: Vec<BlockLocation>,
        erasure_coded: bool,
    ) {
        let mut files = self
            .files
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        files.insert(
            path.into(),
            StoredFile {
                length,
                modification_time: Utc::now(),
                erasure_coded,
                blocks,
            },
        );
    }

    /// Removes a file. Succeeds even if the file doesn't exist.
    pub fn remove_file(&self, path: &str) {
        self.files
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(path);
    }

    fn status(path: &str, file: &StoredFile, located: bool) -> FileStatus {
        FileStatus {
            path: path.to_string(),
            length: file.length,
            modification_time: Some(file.modification_time),
            erasure_coded: file.erasure_coded,
            block_locations: located.then(|| file.blocks.clone()),
        }
    }
}

fn poisoned() -> Error {
    Error::storage("memory filesystem lock poisoned")
}

#[async_trait]
impl FileSystem for MemoryFileSystem {
    async fn stat(&self, path: &str) -> Result<FileStatus> {
        let files = self.files.read().map_err(|_| poisoned())?;
        files
            .get(path)
            .map(|f| Self::status(path, f, false))
            .ok_or_else(|| Error::NotFound(format!("file not found: {path}")))
    }

    async fn block_locations(&self, status: &FileStatus) -> Result<Vec<BlockLocation>> {
        let files = self.files.read().map_err(|_| poisoned())?;
        files
            .get(&status.path)
            .map(|f| f.blocks.clone())
            .ok_or_else(|| Error::NotFound(format!("file not found: {}", status.path)))
    }

    async fn list_located(&self, prefix: &str) -> Result<Vec<FileStatus>> {
        let files = self.files.read().map_err(|_| poisoned())?;
        Ok(files
            .iter()
            .filter(|(path, _)| path.starts_with(prefix))
            .map(|(path, f)| Self::status(path, f, true))
            .collect())
    }

    fn supports_storage_ids(&self) -> bool {
        self.storage_ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(offset: u64, length: u64, hosts: &[&str]) -> BlockLocation {
        BlockLocation {
            offset,
            length,
            replicas: hosts.iter().map(|h| BlockReplica::new(*h, 0)).collect(),
        }
    }

    #[tokio::test]
    async fn test_stat_has_no_block_locations() {
        let fs = MemoryFileSystem::with_block_locations();
        fs.put_file_with_blocks("/t/a.parq", 10, vec![block(0, 10, &["h:1"])], false);

        let status = fs.stat("/t/a.parq").await.expect("stat");
        assert_eq!(status.length, 10);
        assert!(status.block_locations.is_none());

        let blocks = fs.block_locations(&status).await.expect("blocks");
        assert_eq!(blocks.len(), 1);
    }

    #[tokio::test]
    async fn test_stat_missing_file() {
        let fs = MemoryFileSystem::new();
        let err = fs.stat("/missing").await.expect_err("should fail");
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_located_filters_by_prefix() {
        let fs = MemoryFileSystem::with_block_locations();
        fs.put_file_with_blocks("/t/data/a.parq", 10, vec![block(0, 10, &["h:1"])], true);
        fs.put_file("/other/b.parq", 5);

        let listed = fs.list_located("/t/").await.expect("list");
        assert_eq!(listed.len(), 1);
        assert!(listed[0].erasure_coded);
        assert_eq!(listed[0].block_locations.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn test_object_store_mode_has_no_storage_ids() {
        assert!(!MemoryFileSystem::new().supports_storage_ids());
        assert!(MemoryFileSystem::with_block_locations().supports_storage_ids());
    }
}
