//! # Hashing Utilities
//!
//! Hash functions used by the ledger:
//!
//! - **SHA3-256** is the default everywhere. Addresses are derived from it,
//!   envelope payloads are digested with it before signing, and swap hash
//!   locks use it unless a channel is configured otherwise.
//! - **SHA-256** and **BLAKE3** are selectable for swap hash locks so a
//!   channel can interoperate with a counterparty that locks with either.
//!
//! All three produce 32-byte digests, so a hash lock is always 32 bytes no
//! matter which algorithm produced it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::Sha256;
use sha3::{Digest, Sha3_256};

use crate::config::HASH_OUTPUT_LENGTH;

/// A 32-byte digest.
pub type Digest32 = [u8; HASH_OUTPUT_LENGTH];

/// Compute the SHA3-256 hash of the input data.
///
/// # Example
///
/// ```
/// use chanswap_protocol::crypto::sha3_256;
///
/// let hash = sha3_256(b"12345");
/// assert_eq!(
///     hex::encode(hash),
///     "7d4e3eec80026719639ed4dba68916eb94c7a49a053e05c8f9578fe4e5a3d7ea"
/// );
/// ```
pub fn sha3_256(data: &[u8]) -> Digest32 {
    let mut hasher = Sha3_256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute the SHA-256 hash of the input data.
pub fn sha256(data: &[u8]) -> Digest32 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute the BLAKE3 hash of the input data.
pub fn blake3_hash(data: &[u8]) -> Digest32 {
    *blake3::hash(data).as_bytes()
}

// ---------------------------------------------------------------------------
// HashAlgorithm
// ---------------------------------------------------------------------------

/// Hash function selectable per channel for swap hash locks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    #[serde(rename = "sha3-256", alias = "sha3_256", alias = "sha3")]
    Sha3_256,
    #[serde(rename = "sha256", alias = "sha-256")]
    Sha256,
    Blake3,
}

impl HashAlgorithm {
    /// Digest `data` with this algorithm.
    pub fn digest(&self, data: &[u8]) -> Digest32 {
        match self {
            HashAlgorithm::Sha3_256 => sha3_256(data),
            HashAlgorithm::Sha256 => sha256(data),
            HashAlgorithm::Blake3 => blake3_hash(data),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha3_256 => "sha3-256",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Blake3 => "blake3",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha3-256" | "sha3_256" | "sha3" => Ok(HashAlgorithm::Sha3_256),
            "sha256" | "sha-256" => Ok(HashAlgorithm::Sha256),
            "blake3" => Ok(HashAlgorithm::Blake3),
            other => Err(format!("unknown hash algorithm '{other}'")),
        }
    }
}
