//! Local filesystem resource pool
//!
//! Each resource lives at `<root>/<seg_0>/.../<seg_n-1>/<digest>`, with the
//! segments computed by the pool's [`ShardLayout`](respool_core::ShardLayout).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use respool_core::{ResourceDescriptor, ResourceDigest, VerifiedResource};
use tokio::fs;
use tracing::{debug, info, instrument};

use crate::backend::{
    digest_file, discard_staging, ensure_parent, screen_candidate, staging_path, PoolOptions,
    ResourcePool,
};
use crate::error::{StorageError, StorageResult};

/// Local filesystem resource pool
pub struct FilesystemPool {
    /// Root directory
    root: PathBuf,
    options: PoolOptions,
}

impl FilesystemPool {
    /// Create a new filesystem pool, creating the root directory if needed
    pub async fn new(root: impl AsRef<Path>, options: PoolOptions) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root, options })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get resource path
    pub fn resource_path(&self, digest: &ResourceDigest) -> PathBuf {
        self.root.join(self.options.layout.relative_path(digest))
    }

    /// Stored size, or `None` if the resource is absent
    async fn stat_resource(&self, digest: &ResourceDigest) -> StorageResult<Option<u64>> {
        match fs::metadata(self.resource_path(digest)).await {
            Ok(metadata) => Ok(Some(metadata.len())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

#[async_trait]
impl ResourcePool for FilesystemPool {
    fn name(&self) -> &str {
        "local"
    }

    fn options(&self) -> &PoolOptions {
        &self.options
    }

    #[instrument(skip(self), fields(digest = %descriptor.digest))]
    async fn known(&self, descriptor: &ResourceDescriptor) -> StorageResult<bool> {
        Ok(self.stat_resource(&descriptor.digest).await? == Some(descriptor.size))
    }

    #[instrument(skip(self))]
    async fn ingest(&self, path: &Path) -> StorageResult<bool> {
        let Some(size) = screen_candidate(path, &self.options).await? else {
            return Ok(false);
        };

        let digest = digest_file(path).await?;
        let target = self.resource_path(&digest);

        // Check if already exists (deduplication)
        if fs::try_exists(&target).await? {
            debug!(digest = %digest, "Resource already exists, skipping write");
            return Ok(false);
        }

        ensure_parent(&target).await?;

        // Stage beside the target and rename, so a concurrent ingest of the
        // same content never observes a half-written file.
        let staging = staging_path(&target);
        let result: std::io::Result<()> = async {
            fs::copy(path, &staging).await?;
            fs::rename(&staging, &target).await
        }
        .await;

        if let Err(e) = result {
            discard_staging(&staging).await;
            return Err(StorageError::Io(e));
        }

        info!(digest = %digest, size, "Stored resource");
        Ok(true)
    }

    #[instrument(skip(self, descriptors), fields(count = descriptors.len()))]
    async fn verify_sizes(
        &self,
        descriptors: &[ResourceDescriptor],
    ) -> StorageResult<Vec<VerifiedResource>> {
        let mut verified = Vec::new();
        for descriptor in descriptors {
            if let Some(size) = self.stat_resource(&descriptor.digest).await? {
                verified.push(VerifiedResource::new(*descriptor, size));
            }
        }
        Ok(verified)
    }

    #[instrument(skip(self), fields(digest = %descriptor.digest))]
    async fn materialize(
        &self,
        descriptor: &ResourceDescriptor,
        destination: &Path,
    ) -> StorageResult<()> {
        let source = self.resource_path(&descriptor.digest);
        ensure_parent(destination).await?;

        let staging = staging_path(destination);
        let result: std::io::Result<()> = async {
            fs::copy(&source, &staging).await?;
            fs::rename(&staging, destination).await
        }
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(e) => {
                discard_staging(&staging).await;
                if e.kind() == std::io::ErrorKind::NotFound && !fs::try_exists(&source).await? {
                    Err(StorageError::ResourceNotFound(descriptor.digest))
                } else {
                    Err(StorageError::Io(e))
                }
            }
        }
    }
}
