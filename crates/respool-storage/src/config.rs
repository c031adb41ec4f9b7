//! Pool configuration and backend selection
//!
//! A deployment names its pool with a single location string:
//!
//! - `s3://ACCESS_KEY:SECRET@bucket.server/prefix` selects the S3 pool,
//!   talking to `https://server` (or the AWS default endpoint when the host
//!   is just a bucket name)
//! - `file:///srv/resources` or a bare path selects the filesystem pool
//! - any other string is taken as a filesystem path, with a warning when it
//!   looks like a URL
//! - an empty location selects the filesystem pool at
//!   [`DEFAULT_RESOURCE_DIR`]

use std::path::PathBuf;
use std::sync::Arc;

use percent_encoding::percent_decode_str;
use respool_core::{ShardLayout, DEFAULT_LEVELS, DEFAULT_MODULI};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

use crate::backend::{PoolOptions, ResourcePool, DEFAULT_MAXIMUM_SIZE};
use crate::error::{StorageError, StorageResult};
use crate::local::FilesystemPool;
use crate::s3::{S3Pool, S3PoolConfig};

/// Filesystem root used when no location is configured
pub const DEFAULT_RESOURCE_DIR: &str = "/var/lib/respool/resources";

/// Resource pool configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Storage backend
    pub backend: BackendConfig,
    /// Smallest file size accepted by `ingest`
    #[serde(default)]
    pub minimum_size: u64,
    /// Largest file size accepted by `ingest`
    #[serde(default = "default_maximum_size")]
    pub maximum_size: u64,
    /// Key sharding parameters
    #[serde(default)]
    pub sharding: ShardingConfig,
}

fn default_maximum_size() -> u64 {
    DEFAULT_MAXIMUM_SIZE
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            minimum_size: 0,
            maximum_size: DEFAULT_MAXIMUM_SIZE,
            sharding: ShardingConfig::default(),
        }
    }
}

/// Storage backend configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BackendConfig {
    /// Local filesystem
    #[serde(rename = "local")]
    Local { path: String },
    /// S3-compatible storage
    #[serde(rename = "s3")]
    S3 {
        bucket: String,
        #[serde(default)]
        prefix: String,
        region: Option<String>,
        endpoint: Option<String>,
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
        marker_dir: Option<String>,
    },
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::Local {
            path: DEFAULT_RESOURCE_DIR.to_string(),
        }
    }
}

/// Sharding configuration (validated when the pool is built)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardingConfig {
    pub levels: usize,
    pub moduli: Vec<u32>,
}

impl Default for ShardingConfig {
    fn default() -> Self {
        Self {
            levels: DEFAULT_LEVELS,
            moduli: DEFAULT_MODULI.to_vec(),
        }
    }
}

impl PoolConfig {
    /// Create config with local storage
    pub fn local(path: &str) -> Self {
        Self {
            backend: BackendConfig::Local {
                path: path.to_string(),
            },
            ..Default::default()
        }
    }

    /// Parse a location string into a config with default bounds and sharding
    pub fn from_location(location: &str) -> StorageResult<Self> {
        let location = location.trim();
        if location.is_empty() {
            return Ok(Self::default());
        }

        let backend = match Url::parse(location) {
            Ok(url) if url.scheme() == "s3" => s3_backend_from_url(&url)?,
            Ok(url) if url.scheme() == "file" => {
                let path = url.to_file_path().map_err(|_| {
                    StorageError::InvalidConfig(format!("invalid file location: {location}"))
                })?;
                BackendConfig::Local {
                    path: path.to_string_lossy().into_owned(),
                }
            }
            // Single-letter schemes are drive letters, not URLs
            Ok(url) if url.scheme().len() > 1 => {
                warn!(
                    scheme = url.scheme(),
                    location = %location,
                    "Unrecognised location scheme, using it as a filesystem path"
                );
                BackendConfig::Local {
                    path: location.to_string(),
                }
            }
            _ => BackendConfig::Local {
                path: location.to_string(),
            },
        };

        Ok(Self {
            backend,
            ..Default::default()
        })
    }

    /// Build config from a variable lookup
    ///
    /// Reads `RESPOOL_LOCATION`, `RESPOOL_MIN_SIZE`, `RESPOOL_MAX_SIZE` and
    /// `RESPOOL_MARKER_DIR`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> StorageResult<Self> {
        let mut config = match lookup("RESPOOL_LOCATION") {
            Some(location) => Self::from_location(&location)?,
            None => Self::default(),
        };

        if let Some(value) = lookup("RESPOOL_MIN_SIZE") {
            config.minimum_size = parse_size("RESPOOL_MIN_SIZE", &value)?;
        }
        if let Some(value) = lookup("RESPOOL_MAX_SIZE") {
            config.maximum_size = parse_size("RESPOOL_MAX_SIZE", &value)?;
        }
        if let Some(dir) = lookup("RESPOOL_MARKER_DIR") {
            config = config.with_marker_dir(&dir);
        }

        Ok(config)
    }

    /// Set the marker directory (only meaningful for S3)
    pub fn with_marker_dir(mut self, dir: &str) -> Self {
        match &mut self.backend {
            BackendConfig::S3 { marker_dir, .. } => *marker_dir = Some(dir.to_string()),
            BackendConfig::Local { path } => {
                warn!(
                    marker_dir = %dir,
                    path = %path,
                    "Marker directory ignored for filesystem pool"
                );
            }
        }
        self
    }

    /// Set the size bounds
    pub fn with_size_bounds(mut self, minimum_size: u64, maximum_size: u64) -> Self {
        self.minimum_size = minimum_size;
        self.maximum_size = maximum_size;
        self
    }

    /// Validated pool-wide options
    pub fn pool_options(&self) -> StorageResult<PoolOptions> {
        if self.minimum_size > self.maximum_size {
            return Err(StorageError::InvalidConfig(format!(
                "minimum_size {} exceeds maximum_size {}",
                self.minimum_size, self.maximum_size
            )));
        }

        let layout = ShardLayout::new(self.sharding.levels, self.sharding.moduli.clone())?;

        Ok(PoolOptions {
            minimum_size: self.minimum_size,
            maximum_size: self.maximum_size,
            layout,
        })
    }

    /// Construct the configured backend
    ///
    /// Options are validated before any I/O happens.
    pub async fn build(&self) -> StorageResult<Arc<dyn ResourcePool>> {
        let options = self.pool_options()?;

        match &self.backend {
            BackendConfig::Local { path } => {
                info!(path = %path, "Opening filesystem resource pool");
                Ok(Arc::new(FilesystemPool::new(path, options).await?))
            }
            BackendConfig::S3 {
                bucket,
                prefix,
                region,
                endpoint,
                access_key_id,
                secret_access_key,
                marker_dir,
            } => {
                info!(bucket = %bucket, prefix = %prefix, "Opening S3 resource pool");
                let config = S3PoolConfig {
                    bucket: bucket.clone(),
                    prefix: prefix.clone(),
                    region: region.clone(),
                    endpoint: endpoint.clone(),
                    access_key_id: access_key_id.clone(),
                    secret_access_key: secret_access_key.clone(),
                    marker_dir: marker_dir.as_ref().map(PathBuf::from),
                };
                Ok(Arc::new(S3Pool::new(config, options).await?))
            }
        }
    }
}

fn s3_backend_from_url(url: &Url) -> StorageResult<BackendConfig> {
    let host = url
        .host_str()
        .ok_or_else(|| StorageError::InvalidConfig("S3 location has no bucket".to_string()))?;
    let host = decode(host)?;

    let (bucket, server) = match host.split_once('.') {
        Some((bucket, server)) => (bucket.to_string(), Some(server.to_string())),
        None => (host, None),
    };
    if bucket.is_empty() {
        return Err(StorageError::InvalidConfig("S3 location has no bucket".to_string()));
    }

    let endpoint = server.map(|server| match url.port() {
        Some(port) => format!("https://{server}:{port}"),
        None => format!("https://{server}"),
    });

    let access_key_id = match url.username() {
        "" => None,
        user => Some(decode(user)?),
    };
    let secret_access_key = url.password().map(decode).transpose()?;

    let prefix = decode(url.path())?.trim_matches('/').to_string();

    let marker_dir = url
        .query_pairs()
        .find(|(key, _)| key == "marker_dir")
        .map(|(_, value)| value.into_owned());

    Ok(BackendConfig::S3 {
        bucket,
        prefix,
        region: None,
        endpoint,
        access_key_id,
        secret_access_key,
        marker_dir,
    })
}

fn decode(s: &str) -> StorageResult<String> {
    percent_decode_str(s)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|e| StorageError::InvalidConfig(format!("invalid percent-encoding: {e}")))
}

fn parse_size(name: &str, value: &str) -> StorageResult<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| StorageError::InvalidConfig(format!("{name} is not a byte count: {value}")))
}
