//! Local existence hints for remote objects
//!
//! The S3 pool records an empty marker file for every key it has stored or
//! seen, laid out like a filesystem pool. A marker only says "this key was
//! present at some point"; the remote store stays authoritative, so callers
//! that find a marker to be stale remove it.

use std::path::{Path, PathBuf};

use respool_core::{ResourceDigest, ShardLayout};
use tokio::fs;
use tracing::debug;

use crate::backend::ensure_parent;
use crate::error::{StorageError, StorageResult};

/// Directory of empty marker files mirroring the sharded key layout
#[derive(Debug, Clone)]
pub struct MarkerCache {
    root: PathBuf,
    layout: ShardLayout,
}

impl MarkerCache {
    pub fn new(root: impl AsRef<Path>, layout: ShardLayout) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            layout,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get marker path
    pub fn marker_path(&self, digest: &ResourceDigest) -> PathBuf {
        self.root.join(self.layout.relative_path(digest))
    }

    /// Whether a marker exists for `digest`
    pub async fn contains(&self, digest: &ResourceDigest) -> StorageResult<bool> {
        Ok(fs::try_exists(self.marker_path(digest)).await?)
    }

    /// Record that `digest` is present remotely
    pub async fn record(&self, digest: &ResourceDigest) -> StorageResult<()> {
        let path = self.marker_path(digest);
        ensure_parent(&path).await?;
        fs::write(&path, b"").await?;
        Ok(())
    }

    /// Drop a stale marker
    pub async fn forget(&self, digest: &ResourceDigest) -> StorageResult<()> {
        match fs::remove_file(self.marker_path(digest)).await {
            Ok(()) => {
                debug!(digest = %digest, "Removed stale marker");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()), // Already gone
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}
