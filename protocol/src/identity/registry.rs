//! # Key Registry
//!
//! Registered signers, keyed by address. The authorization gate resolves a
//! signer's key here before it looks at signatures or nonces; a key that
//! was never added cannot sign anything.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::address::Address;
use crate::crypto::keys::PublicKey;

/// Errors from registry operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("user {0} already exists")]
    AlreadyExists(Address),

    #[error("public key {0} is not registered")]
    UnknownKey(String),

    #[error("address {0} is not registered")]
    UnknownAddress(Address),
}

/// One registered signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub address: Address,
    pub public_key: PublicKey,
    pub registered_at: DateTime<Utc>,
}

/// Concurrent address -> key table.
#[derive(Debug, Default)]
pub struct KeyRegistry {
    users: DashMap<Address, Registration>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a public key and returns its address.
    pub fn add_user(&self, public_key: &PublicKey) -> Result<Address, RegistryError> {
        let address = Address::from_public_key(public_key);
        match self.users.entry(address) {
            Entry::Occupied(_) => Err(RegistryError::AlreadyExists(address)),
            Entry::Vacant(slot) => {
                slot.insert(Registration {
                    address,
                    public_key: *public_key,
                    registered_at: Utc::now(),
                });
                debug!(address = %address, "user registered");
                Ok(address)
            }
        }
    }

    /// Confirms a key is registered and returns its address.
    pub fn check_keys(&self, public_key: &PublicKey) -> Result<Address, RegistryError> {
        let address = Address::from_public_key(public_key);
        if self.users.contains_key(&address) {
            Ok(address)
        } else {
            Err(RegistryError::UnknownKey(public_key.to_base58()))
        }
    }

    pub fn public_key_of(&self, address: &Address) -> Result<PublicKey, RegistryError> {
        self.users
            .get(address)
            .map(|r| r.public_key)
            .ok_or(RegistryError::UnknownAddress(*address))
    }

    pub fn registration(&self, address: &Address) -> Option<Registration> {
        self.users.get(address).map(|r| r.clone())
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
