//! Content digests
//!
//! Every resource is identified by the SHA-1 digest of its bytes. The digest
//! is rendered as 40 lowercase hex characters, and for sharding it is read as
//! one big-endian unsigned integer.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha1::{Digest, Sha1};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Length of a digest in bytes
pub const DIGEST_LEN: usize = 20;

/// SHA-1 digest identifying a resource
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceDigest([u8; DIGEST_LEN]);

impl ResourceDigest {
    /// Compute digest from data
    pub fn from_data(data: &[u8]) -> Self {
        let mut hasher = ResourceHasher::new();
        hasher.update(data);
        hasher.finalize()
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse from hex string (either case)
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim()).map_err(|e| Error::InvalidDigest(e.to_string()))?;
        if bytes.len() != DIGEST_LEN {
            return Err(Error::InvalidDigest(format!(
                "Expected {} bytes, got {}",
                DIGEST_LEN,
                bytes.len()
            )));
        }
        let mut digest = [0u8; DIGEST_LEN];
        digest.copy_from_slice(&bytes);
        Ok(Self(digest))
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Convert to lowercase hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Remainder of the digest, read as a big-endian integer, divided by `modulus`.
    ///
    /// Reduces byte by byte, so the full 160-bit value is never materialized.
    /// Panics if `modulus` is zero; [`crate::ShardLayout`] rejects zero moduli
    /// at construction.
    pub fn modulo(&self, modulus: u32) -> u32 {
        let modulus = u64::from(modulus);
        let rem = self
            .0
            .iter()
            .fold(0u64, |acc, &byte| ((acc << 8) | u64::from(byte)) % modulus);
        rem as u32
    }
}

impl fmt::Display for ResourceDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for ResourceDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceDigest({})", &self.to_hex()[..12])
    }
}

impl FromStr for ResourceDigest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl Serialize for ResourceDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ResourceDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Incremental digest computation for content that arrives in pieces
#[derive(Clone, Default)]
pub struct ResourceHasher {
    inner: Sha1,
}

impl ResourceHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    pub fn finalize(self) -> ResourceDigest {
        let result = self.inner.finalize();
        let mut digest = [0u8; DIGEST_LEN];
        digest.copy_from_slice(&result);
        ResourceDigest(digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        let digest = ResourceDigest::from_data(b"hello world");
        assert_eq!(digest.to_hex(), "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed");
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let mut hasher = ResourceHasher::new();
        hasher.update(b"hello ");
        hasher.update(b"world");
        assert_eq!(hasher.finalize(), ResourceDigest::from_data(b"hello world"));
    }

    #[test]
    fn test_from_hex_normalizes_case() {
        let upper = ResourceDigest::from_hex("2AAE6C35C94FCFB415DBE95F408B9CE91EE846ED").unwrap();
        assert_eq!(upper.to_hex(), "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed");
    }

    #[test]
    fn test_from_hex_rejects_bad_input() {
        assert!(ResourceDigest::from_hex("abcd").is_err());
        assert!(ResourceDigest::from_hex("zz").is_err());
        assert!(ResourceDigest::from_hex(&"0".repeat(64)).is_err());
    }

    #[test]
    fn test_modulo_small_values() {
        let mut bytes = [0u8; DIGEST_LEN];
        bytes[DIGEST_LEN - 1] = 0xff;
        bytes[DIGEST_LEN - 2] = 0x01;
        let digest = ResourceDigest::from_bytes(bytes);
        // 0x01ff = 511
        assert_eq!(digest.modulo(269), 511 % 269);
        assert_eq!(digest.modulo(251), 511 % 251);
        assert_eq!(digest.modulo(1), 0);
    }

    #[test]
    fn test_modulo_matches_u128_arithmetic() {
        // Leading 4 bytes zero, so the value fits in a u128.
        let digest = ResourceDigest::from_hex("00000000ffeeddccbbaa99887766554433221100").unwrap();
        let value = u128::from_str_radix("ffeeddccbbaa99887766554433221100", 16).unwrap();
        for modulus in [2u32, 7, 251, 269, 65_521, u32::MAX] {
            assert_eq!(u128::from(digest.modulo(modulus)), value % u128::from(modulus));
        }
    }

    #[test]
    fn test_serde_as_hex_string() {
        let digest = ResourceDigest::from_data(b"hello world");
        let json = serde_json::to_string(&digest).unwrap();
        assert_eq!(json, "\"2aae6c35c94fcfb415dbe95f408b9ce91ee846ed\"");
        let parsed: ResourceDigest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, digest);
    }
}
