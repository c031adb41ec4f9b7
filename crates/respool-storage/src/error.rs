//! Storage error types

use respool_core::ResourceDigest;
use thiserror::Error;

/// Storage error type
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Resource not found: {0}")]
    ResourceNotFound(ResourceDigest),

    #[error("Resource not known to the pool: {0}")]
    UnknownResource(String),

    #[error("Invalid pool configuration: {0}")]
    InvalidConfig(String),

    #[error("S3 error: {0}")]
    S3(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Core error: {0}")]
    Core(#[from] respool_core::Error),
}

impl StorageError {
    /// Whether this error only means "content not present"
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::ResourceNotFound(_) => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Result type alias
pub type StorageResult<T> = Result<T, StorageError>;
