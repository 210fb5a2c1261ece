//! # Addresses
//!
//! A ledger address is derived from a signer's public key:
//!
//! ```text
//! public_key (32 bytes)
//!     -> SHA3-256(public_key) -> 32 bytes
//!     -> Base58Check(hash)    -> 2ZpM8...
//! ```
//!
//! The checksum catches typos when an address is pasted into `emit` or
//! `transfer` arguments. Balances are keyed by address, never by raw key.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::HASH_OUTPUT_LENGTH;
use crate::crypto::hash::sha3_256;
use crate::crypto::keys::PublicKey;

/// Errors that can occur while parsing an address.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    /// The string is not valid Base58Check (bad alphabet or checksum).
    #[error("invalid address encoding: {0}")]
    Encoding(String),

    /// The decoded payload has the wrong length.
    #[error("invalid address length: expected {expected} bytes, got {got}")]
    Length {
        /// Expected number of bytes.
        expected: usize,
        /// Actual number of bytes.
        got: usize,
    },
}

/// A public-key-derived account address.
///
/// # Examples
///
/// ```
/// use chanswap_protocol::crypto::Keypair;
/// use chanswap_protocol::identity::Address;
///
/// let kp = Keypair::generate();
/// let address = Address::from_public_key(&kp.public_key());
/// let parsed: Address = address.to_string().parse().unwrap();
/// assert_eq!(address, parsed);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Address([u8; HASH_OUTPUT_LENGTH]);

impl Address {
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        Self(sha3_256(public_key.as_bytes()))
    }

    pub fn as_bytes(&self) -> &[u8; HASH_OUTPUT_LENGTH] {
        &self.0
    }

    /// Returns `true` if this address was derived from `public_key`.
    pub fn matches(&self, public_key: &PublicKey) -> bool {
        *self == Self::from_public_key(public_key)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s.trim())
            .with_check(None)
            .into_vec()
            .map_err(|e| AddressError::Encoding(e.to_string()))?;
        let hash: [u8; HASH_OUTPUT_LENGTH] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| AddressError::Length {
                    expected: HASH_OUTPUT_LENGTH,
                    got: bytes.len(),
                })?;
        Ok(Self(hash))
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).with_check().into_string())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::Keypair;

    #[test]
    fn derivation_is_deterministic() {
        let kp = Keypair::from_seed(&[3u8; 32]);
        assert_eq!(
            Address::from_public_key(&kp.public_key()),
            Address::from_public_key(&kp.public_key())
        );
    }

    #[test]
    fn different_keys_different_addresses() {
        let a = Address::from_public_key(&Keypair::generate().public_key());
        let b = Address::from_public_key(&Keypair::generate().public_key());
        assert_ne!(a, b);
    }

    #[test]
    fn string_roundtrip_and_matches() {
        let kp = Keypair::generate();
        let address = Address::from_public_key(&kp.public_key());
        let parsed: Address = address.to_string().parse().unwrap();
        assert_eq!(parsed, address);
        assert!(parsed.matches(&kp.public_key()));
        assert!(!parsed.matches(&Keypair::generate().public_key()));
    }

    #[test]
    fn corrupted_checksum_rejected() {
        let address = Address::from_public_key(&Keypair::generate().public_key()).to_string();
        let mut chars: Vec<char> = address.chars().collect();
        let last = chars.len() - 1;
        chars[last] = if chars[last] == '2' { '3' } else { '2' };
        let corrupted: String = chars.into_iter().collect();
        assert!(matches!(
            corrupted.parse::<Address>(),
            Err(AddressError::Encoding(_))
        ));
    }

    #[test]
    fn wrong_length_rejected() {
        let short = bs58::encode([9u8; 20]).with_check().into_string();
        assert_eq!(
            short.parse::<Address>(),
            Err(AddressError::Length {
                expected: 32,
                got: 20
            })
        );
    }

    #[test]
    fn serde_as_string() {
        let address = Address::from_public_key(&Keypair::generate().public_key());
        let json = serde_json::to_string(&address).unwrap();
        assert_eq!(json, format!("\"{address}\""));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, address);
    }
}
