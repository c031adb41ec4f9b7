//! Error types for respool-core

use thiserror::Error;

/// Core error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid digest: {0}")]
    InvalidDigest(String),

    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("Sharding expects one modulus per level: {levels} levels, {moduli} moduli")]
    ShardingMismatch { levels: usize, moduli: usize },

    #[error("Modulus for sharding level {level} must be non-zero")]
    ZeroModulus { level: usize },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
