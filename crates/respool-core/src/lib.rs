//! Content addressing for the resource pool
//!
//! This crate holds the pure parts of the pool: content digests, the
//! descriptors callers present, and the sharding scheme that maps a digest
//! onto a storage key. Nothing in here performs I/O.

pub mod descriptor;
pub mod digest;
pub mod error;
pub mod layout;

pub use descriptor::{ResourceDescriptor, VerifiedResource};
pub use digest::{ResourceDigest, ResourceHasher, DIGEST_LEN};
pub use error::{Error, Result};
pub use layout::{ShardLayout, DEFAULT_LEVELS, DEFAULT_MODULI};
