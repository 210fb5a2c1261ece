//! # Cryptographic Primitives
//!
//! Thin, typed wrappers over audited implementations:
//!
//! - **Ed25519** (`ed25519-dalek`) for request signatures.
//! - **SHA3-256** (`sha3`) for addresses, payload digests and default hash locks.
//! - **SHA-256** (`sha2`) and **BLAKE3** (`blake3`) as alternative hash locks.

pub mod hash;
pub mod keys;
pub mod signatures;

pub use hash::{blake3_hash, sha256, sha3_256, Digest32, HashAlgorithm};
pub use keys::{KeyError, Keypair, PublicKey, Signature};
pub use signatures::{sign_payload, verify_payload, SignatureError};
