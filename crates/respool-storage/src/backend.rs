//! Resource pool trait definitions
//!
//! Every backend implements [`ResourcePool`]. Size screening, digesting and
//! the directory walk are shared here so that all backends apply the same
//! policy regardless of where the bytes end up.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use respool_core::{ResourceDescriptor, ResourceDigest, ResourceHasher, ShardLayout, VerifiedResource};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::{debug, instrument};

use crate::error::{StorageError, StorageResult};

/// Default upper bound on the size of a pooled file (512 MiB)
pub const DEFAULT_MAXIMUM_SIZE: u64 = 512 * 1024 * 1024;

/// Read buffer used while digesting files
const DIGEST_BUFFER_SIZE: usize = 64 * 1024;

/// Pool-wide settings shared by every backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolOptions {
    /// Files smaller than this are never pooled
    pub minimum_size: u64,
    /// Files larger than this are never pooled
    pub maximum_size: u64,
    /// Digest to key sharding
    pub layout: ShardLayout,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            minimum_size: 0,
            maximum_size: DEFAULT_MAXIMUM_SIZE,
            layout: ShardLayout::default(),
        }
    }
}

impl PoolOptions {
    /// Whether a file of `size` bytes is eligible for pooling
    pub fn accepts_size(&self, size: u64) -> bool {
        size >= self.minimum_size && size <= self.maximum_size
    }
}

/// Outcome of ingesting a directory tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// Files newly written to the pool
    pub stored: u64,
    /// Files screened out or already present
    pub skipped: u64,
}

/// A content-addressed resource pool
#[async_trait]
pub trait ResourcePool: Send + Sync {
    /// Get backend name/type
    fn name(&self) -> &str;

    /// Pool-wide settings
    fn options(&self) -> &PoolOptions;

    /// Whether the pool holds the descriptor's content at exactly its claimed size
    async fn known(&self, descriptor: &ResourceDescriptor) -> StorageResult<bool>;

    /// Store a local file (returns true if newly written, false if skipped or already present)
    async fn ingest(&self, path: &Path) -> StorageResult<bool>;

    /// Stored sizes for the descriptors the pool holds; absent ones are dropped
    async fn verify_sizes(
        &self,
        descriptors: &[ResourceDescriptor],
    ) -> StorageResult<Vec<VerifiedResource>>;

    /// Write the stored content to `destination`, replacing any existing file
    async fn materialize(
        &self,
        descriptor: &ResourceDescriptor,
        destination: &Path,
    ) -> StorageResult<()>;

    /// The subset of `descriptors` the pool already knows
    async fn match_resources(
        &self,
        descriptors: &[ResourceDescriptor],
    ) -> StorageResult<Vec<ResourceDescriptor>> {
        let mut matched = Vec::new();
        for descriptor in descriptors {
            if self.known(descriptor).await? {
                matched.push(*descriptor);
            }
        }
        Ok(matched)
    }

    /// Ingest every file below `dir`, hidden entries included
    ///
    /// Symbolic links are neither followed nor stored.
    async fn ingest_directory(&self, dir: &Path) -> StorageResult<IngestSummary> {
        let mut summary = IngestSummary::default();
        for path in walk_files(dir).await? {
            if self.ingest(&path).await? {
                summary.stored += 1;
            } else {
                summary.skipped += 1;
            }
        }
        Ok(summary)
    }

    /// Materialize only if the claim matches what the pool holds
    async fn copy(
        &self,
        descriptor: &ResourceDescriptor,
        destination: &Path,
    ) -> StorageResult<()> {
        if !self.known(descriptor).await? {
            return Err(StorageError::UnknownResource(descriptor.to_string()));
        }
        self.materialize(descriptor, destination).await
    }
}

/// Size of `path` if it is a regular file within the pool's size bounds
///
/// Directories, symbolic links and other special files are skipped, as are
/// files outside `[minimum_size, maximum_size]`. A missing path is an error.
#[instrument(skip(options))]
pub async fn screen_candidate(path: &Path, options: &PoolOptions) -> StorageResult<Option<u64>> {
    let metadata = fs::symlink_metadata(path).await?;

    if !metadata.file_type().is_file() {
        debug!("Not a regular file, skipping");
        return Ok(None);
    }

    let size = metadata.len();
    if !options.accepts_size(size) {
        debug!(
            size,
            minimum = options.minimum_size,
            maximum = options.maximum_size,
            "Size out of bounds, skipping"
        );
        return Ok(None);
    }

    Ok(Some(size))
}

/// Digest a file without loading it into memory
pub async fn digest_file(path: &Path) -> StorageResult<ResourceDigest> {
    let mut file = fs::File::open(path).await?;
    let mut hasher = ResourceHasher::new();
    let mut buf = vec![0u8; DIGEST_BUFFER_SIZE];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hasher.finalize())
}

/// Ensure parent directory exists
pub(crate) async fn ensure_parent(path: &Path) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}

/// Unique sibling path for staging a write that is renamed into place
pub(crate) fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple()))
}

/// Best-effort removal of a staging file after a failed write
pub(crate) async fn discard_staging(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            debug!(path = %path.display(), error = %e, "Failed to remove staging file");
        }
    }
}

/// List non-directory entries below `dir`, depth first
async fn walk_files(dir: &Path) -> StorageResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let mut entries = fs::read_dir(&current).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                pending.push(entry.path());
            } else {
                files.push(entry.path());
            }
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn bounded(minimum_size: u64, maximum_size: u64) -> PoolOptions {
        PoolOptions {
            minimum_size,
            maximum_size,
            ..Default::default()
        }
    }

    #[test]
    fn test_default_options() {
        let options = PoolOptions::default();
        assert_eq!(options.minimum_size, 0);
        assert_eq!(options.maximum_size, DEFAULT_MAXIMUM_SIZE);
        assert_eq!(options.layout, ShardLayout::default());
    }

    #[test]
    fn test_accepts_size_is_inclusive() {
        let options = bounded(4, 8);
        assert!(!options.accepts_size(3));
        assert!(options.accepts_size(4));
        assert!(options.accepts_size(8));
        assert!(!options.accepts_size(9));
    }

    #[tokio::test]
    async fn test_screen_candidate() {
        let temp_dir = TempDir::new().unwrap();
        let options = bounded(2, 10);

        let small = temp_dir.path().join("small");
        std::fs::write(&small, b"x").unwrap();
        let fits = temp_dir.path().join("fits");
        std::fs::write(&fits, b"12345").unwrap();
        let large = temp_dir.path().join("large");
        std::fs::write(&large, vec![0u8; 11]).unwrap();

        assert_eq!(screen_candidate(&small, &options).await.unwrap(), None);
        assert_eq!(screen_candidate(&fits, &options).await.unwrap(), Some(5));
        assert_eq!(screen_candidate(&large, &options).await.unwrap(), None);
        assert_eq!(screen_candidate(temp_dir.path(), &options).await.unwrap(), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_screen_candidate_skips_symlinks() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("target");
        std::fs::write(&target, b"linked content").unwrap();
        let link = temp_dir.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let options = PoolOptions::default();
        assert_eq!(screen_candidate(&link, &options).await.unwrap(), None);
        assert!(screen_candidate(&target, &options).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_screen_candidate_missing_path_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let err = screen_candidate(&temp_dir.path().join("nope"), &PoolOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_digest_file_matches_in_memory() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data");
        // Spans several read buffers
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        let digest = digest_file(&path).await.unwrap();
        assert_eq!(digest, ResourceDigest::from_data(&data));
    }

    #[test]
    fn test_staging_path_is_sibling() {
        let path = Path::new("/pool/1/2/abcdef");
        let staging = staging_path(path);
        assert_eq!(staging.parent(), path.parent());
        assert_ne!(staging, staging_path(path));
        assert!(staging
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(".abcdef."));
    }
}
