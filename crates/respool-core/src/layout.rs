//! Key sharding
//!
//! Resources are spread over a fixed hierarchy of directories so that no
//! single directory (or listing prefix) grows without bound. Level `i` of the
//! hierarchy is the digest, read as an integer, modulo `moduli[i]`:
//!
//! ```text
//! <root>/<digest mod m0>/<digest mod m1>/.../<digest>
//! ```
//!
//! The default `[269, 251]` yields about 67k leaf directories, which keeps
//! each one far below common per-directory limits even with billions of
//! objects. The mapping is part of the on-disk contract: two pools with the
//! same layout agree on where every digest lives.

use std::path::PathBuf;

use crate::digest::ResourceDigest;
use crate::error::{Error, Result};

/// Default number of sharding levels
pub const DEFAULT_LEVELS: usize = 2;

/// Default modulus per sharding level
pub const DEFAULT_MODULI: [u32; DEFAULT_LEVELS] = [269, 251];

/// Validated sharding parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardLayout {
    moduli: Vec<u32>,
}

impl ShardLayout {
    /// Create a layout, requiring exactly one non-zero modulus per level
    pub fn new(levels: usize, moduli: Vec<u32>) -> Result<Self> {
        if moduli.len() != levels {
            return Err(Error::ShardingMismatch {
                levels,
                moduli: moduli.len(),
            });
        }
        if let Some(level) = moduli.iter().position(|&m| m == 0) {
            return Err(Error::ZeroModulus { level });
        }
        Ok(Self { moduli })
    }

    /// Number of directory levels above each object
    pub fn levels(&self) -> usize {
        self.moduli.len()
    }

    pub fn moduli(&self) -> &[u32] {
        &self.moduli
    }

    /// Directory segments for a digest, outermost first
    pub fn segments(&self, digest: &ResourceDigest) -> Vec<String> {
        self.moduli
            .iter()
            .map(|&m| digest.modulo(m).to_string())
            .collect()
    }

    /// Path of the object relative to the pool root
    pub fn relative_path(&self, digest: &ResourceDigest) -> PathBuf {
        let mut path: PathBuf = self.segments(digest).into_iter().collect();
        path.push(digest.to_hex());
        path
    }

    /// `/`-separated object key under `prefix`
    ///
    /// Slashes around the prefix are trimmed, and an empty prefix yields a key
    /// without a leading slash.
    pub fn object_key(&self, prefix: &str, digest: &ResourceDigest) -> String {
        let mut parts = Vec::with_capacity(self.levels() + 2);
        let prefix = prefix.trim_matches('/');
        if !prefix.is_empty() {
            parts.push(prefix.to_string());
        }
        parts.extend(self.segments(digest));
        parts.push(digest.to_hex());
        parts.join("/")
    }
}

impl Default for ShardLayout {
    fn default() -> Self {
        Self {
            moduli: DEFAULT_MODULI.to_vec(),
        }
    }
}
