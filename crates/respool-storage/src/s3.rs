//! S3-compatible resource pool
//!
//! Objects are stored under `<prefix>/<seg_0>/.../<seg_n-1>/<digest>`, the
//! same sharded layout the filesystem pool uses on disk. An optional local
//! [`MarkerCache`] short-circuits repeated uploads of content this process
//! already knows to be present.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::retry::RetryConfig;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::{primitives::ByteStream, Client};
use respool_core::{ResourceDescriptor, ResourceDigest, VerifiedResource};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

use crate::backend::{
    digest_file, discard_staging, ensure_parent, screen_candidate, staging_path, PoolOptions,
    ResourcePool,
};
use crate::error::{StorageError, StorageResult};
use crate::markers::MarkerCache;

/// Region used when neither the config nor the environment names one
pub const DEFAULT_REGION: &str = "us-east-1";

/// S3 resource pool configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct S3PoolConfig {
    /// S3 bucket name
    pub bucket: String,
    /// Prefix for all keys (may be empty)
    pub prefix: String,
    /// Region (for AWS S3)
    pub region: Option<String>,
    /// Endpoint URL (for MinIO, R2, etc.)
    pub endpoint: Option<String>,
    /// Static access key; the SDK's environment chain is used when absent
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Directory for local existence markers
    pub marker_dir: Option<PathBuf>,
}

impl S3PoolConfig {
    /// Create config for AWS S3
    pub fn aws(bucket: &str, region: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            region: Some(region.to_string()),
            ..Default::default()
        }
    }

    /// Create config for S3-compatible service (MinIO, R2, etc.)
    pub fn compatible(bucket: &str, endpoint: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            endpoint: Some(endpoint.to_string()),
            ..Default::default()
        }
    }

    /// Set a key prefix
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    /// Use a static credential pair
    pub fn with_credentials(mut self, access_key_id: &str, secret_access_key: &str) -> Self {
        self.access_key_id = Some(access_key_id.to_string());
        self.secret_access_key = Some(secret_access_key.to_string());
        self
    }

    pub fn with_region(mut self, region: &str) -> Self {
        self.region = Some(region.to_string());
        self
    }

    /// Keep local existence markers under `dir`
    pub fn with_markers(mut self, dir: impl AsRef<Path>) -> Self {
        self.marker_dir = Some(dir.as_ref().to_path_buf());
        self
    }
}

/// S3 resource pool
pub struct S3Pool {
    client: Client,
    config: S3PoolConfig,
    options: PoolOptions,
    markers: Option<MarkerCache>,
}

impl S3Pool {
    /// Create a new S3 pool
    ///
    /// The client is built once and shared by every call. SDK retries are
    /// disabled; callers decide whether to retry.
    pub async fn new(config: S3PoolConfig, options: PoolOptions) -> StorageResult<Self> {
        if config.bucket.is_empty() {
            return Err(StorageError::InvalidConfig("S3 bucket name is empty".to_string()));
        }

        let region = RegionProviderChain::first_try(config.region.clone().map(Region::new))
            .or_default_provider()
            .or_else(Region::new(DEFAULT_REGION));

        let mut aws_config = aws_config::from_env()
            .region(region)
            .retry_config(RetryConfig::disabled());

        match (&config.access_key_id, &config.secret_access_key) {
            (Some(access_key_id), Some(secret_access_key)) => {
                aws_config = aws_config.credentials_provider(Credentials::new(
                    access_key_id.clone(),
                    secret_access_key.clone(),
                    None,
                    None,
                    "respool",
                ));
            }
            (None, None) => {}
            _ => {
                return Err(StorageError::InvalidConfig(
                    "S3 access key id and secret access key must be given together".to_string(),
                ))
            }
        }

        if let Some(endpoint) = &config.endpoint {
            aws_config = aws_config.endpoint_url(endpoint);
        }

        let sdk_config = aws_config.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.endpoint.is_some()) // Use path style for non-AWS
            .build();

        let client = Client::from_conf(s3_config);

        let markers = config
            .marker_dir
            .as_ref()
            .map(|dir| MarkerCache::new(dir, options.layout.clone()));

        Ok(Self {
            client,
            config,
            options,
            markers,
        })
    }

    pub fn config(&self) -> &S3PoolConfig {
        &self.config
    }

    /// Build the full key for a resource
    pub fn object_key(&self, digest: &ResourceDigest) -> String {
        self.options.layout.object_key(&self.config.prefix, digest)
    }

    /// Stored size, or `None` if the object is absent
    async fn stat_object(&self, key: &str) -> StorageResult<Option<u64>> {
        match self
            .client
            .head_object()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(resp) => stored_size(key, resp.content_length).map(Some),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(None)
                } else {
                    Err(StorageError::S3(service_error.to_string()))
                }
            }
        }
    }

    async fn has_marker(&self, digest: &ResourceDigest) -> StorageResult<bool> {
        match &self.markers {
            Some(markers) => markers.contains(digest).await,
            None => Ok(false),
        }
    }

    async fn record_marker(&self, digest: &ResourceDigest) -> StorageResult<()> {
        match &self.markers {
            Some(markers) => markers.record(digest).await,
            None => Ok(()),
        }
    }

    /// Upload a local file under `key`
    async fn put_file(&self, key: &str, path: &Path) -> StorageResult<()> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::S3(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.config.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| StorageError::S3(e.to_string()))?;

        Ok(())
    }
}

/// Size reported by a HEAD response; an object of unknown size is an error
fn stored_size(key: &str, content_length: Option<i64>) -> StorageResult<u64> {
    content_length
        .and_then(|len| u64::try_from(len).ok())
        .ok_or_else(|| StorageError::S3(format!("HEAD response for {key} missing Content-Length")))
}

/// Stream an object body into a new file, returning the bytes written
async fn write_body(mut body: ByteStream, path: &Path) -> StorageResult<u64> {
    let mut file = fs::File::create(path).await?;
    let mut written = 0u64;

    while let Some(chunk) = body
        .try_next()
        .await
        .map_err(|e| StorageError::S3(e.to_string()))?
    {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.sync_all().await?;
    Ok(written)
}

#[async_trait]
impl ResourcePool for S3Pool {
    fn name(&self) -> &str {
        "s3"
    }

    fn options(&self) -> &PoolOptions {
        &self.options
    }

    #[instrument(skip(self), fields(digest = %descriptor.digest))]
    async fn known(&self, descriptor: &ResourceDescriptor) -> StorageResult<bool> {
        let key = self.object_key(&descriptor.digest);
        Ok(self.stat_object(&key).await? == Some(descriptor.size))
    }

    #[instrument(skip(self))]
    async fn ingest(&self, path: &Path) -> StorageResult<bool> {
        let Some(size) = screen_candidate(path, &self.options).await? else {
            return Ok(false);
        };

        let digest = digest_file(path).await?;

        if self.has_marker(&digest).await? {
            debug!(digest = %digest, "Marker present, skipping upload");
            return Ok(false);
        }

        let key = self.object_key(&digest);

        // Check if already exists (deduplication)
        if self.stat_object(&key).await?.is_some() {
            debug!(digest = %digest, "Resource already exists, skipping upload");
            self.record_marker(&digest).await?;
            return Ok(false);
        }

        self.put_file(&key, path).await?;
        self.record_marker(&digest).await?;

        info!(digest = %digest, size, key = %key, "Uploaded resource");
        Ok(true)
    }

    #[instrument(skip(self, descriptors), fields(count = descriptors.len()))]
    async fn verify_sizes(
        &self,
        descriptors: &[ResourceDescriptor],
    ) -> StorageResult<Vec<VerifiedResource>> {
        let mut verified = Vec::new();

        for descriptor in descriptors {
            let digest = &descriptor.digest;
            if self.markers.is_some() && !self.has_marker(digest).await? {
                continue;
            }

            match self.stat_object(&self.object_key(digest)).await? {
                Some(size) => verified.push(VerifiedResource::new(*descriptor, size)),
                None => {
                    // The remote is authoritative; a marker without an object is stale.
                    if let Some(markers) = &self.markers {
                        markers.forget(digest).await?;
                    }
                }
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
        let key = self.object_key(&descriptor.digest);

        let response = match self
            .client
            .get_object()
            .bucket(&self.config.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let service_error = e.into_service_error();
                return if service_error.is_no_such_key() {
                    Err(StorageError::ResourceNotFound(descriptor.digest))
                } else {
                    Err(StorageError::S3(service_error.to_string()))
                };
            }
        };

        ensure_parent(destination).await?;

        let expected = response.content_length.map(|len| len.max(0) as u64);
        let staging = staging_path(destination);

        let result = match write_body(response.body, &staging).await {
            Ok(written) if expected.is_some_and(|len| len != written) => Err(StorageError::S3(
                format!(
                    "short read for {}: expected {} bytes, got {}",
                    key,
                    expected.unwrap_or_default(),
                    written
                ),
            )),
            Ok(_) => fs::rename(&staging, destination).await.map_err(StorageError::Io),
            Err(e) => Err(e),
        };

        if result.is_err() {
            discard_staging(&staging).await;
        }
        result
    }
}
