//! # Identity Module
//!
//! Who is allowed to sign requests, and under which address their balances
//! are filed.
//!
//! 1. **Address**: Base58Check of SHA3-256 over the Ed25519 public key.
//! 2. **KeyRegistry**: the set of registered signers. The authorization
//!    gate refuses any envelope whose key is not in it.

pub mod address;
pub mod registry;

pub use address::{Address, AddressError};
pub use registry::{KeyRegistry, Registration, RegistryError};
