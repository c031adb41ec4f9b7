//! Storage backends for the content-addressed resource pool
//!
//! This crate provides the [`ResourcePool`] contract and its implementations
//! over a local directory tree and over S3-compatible object storage, plus
//! the configuration that selects between them at startup.

pub mod backend;
pub mod config;
pub mod error;
pub mod local;
pub mod markers;
pub mod s3;

pub use backend::{
    digest_file, screen_candidate, IngestSummary, PoolOptions, ResourcePool, DEFAULT_MAXIMUM_SIZE,
};
pub use config::{BackendConfig, PoolConfig, ShardingConfig, DEFAULT_RESOURCE_DIR};
pub use error::{StorageError, StorageResult};
pub use local::FilesystemPool;
pub use markers::MarkerCache;
pub use s3::{S3Pool, S3PoolConfig};
