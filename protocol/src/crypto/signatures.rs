//! # Digital Signatures
//!
//! Signing and verification of request payloads.
//!
//! A payload is never signed raw: it is first digested with SHA3-256 and the
//! 32-byte digest is what the Ed25519 key signs. Verifiers recompute the
//! digest from the payload they were handed, so any byte that differs
//! between what was signed and what arrived makes verification fail.

use thiserror::Error;

use super::hash::sha3_256;
use super::keys::{Keypair, PublicKey, Signature};

/// Errors during signature operations.
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("signature verification failed")]
    VerificationFailed,
}

/// Sign the SHA3-256 digest of `payload`.
///
/// ```
/// use chanswap_protocol::crypto::{sign_payload, verify_payload, Keypair};
///
/// let kp = Keypair::generate();
/// let sig = sign_payload(&kp, b"payload");
/// assert!(verify_payload(&kp.public_key(), b"payload", &sig).is_ok());
/// ```
pub fn sign_payload(keypair: &Keypair, payload: &[u8]) -> Signature {
    keypair.sign(&sha3_256(payload))
}

/// Verify a signature produced by [`sign_payload`].
pub fn verify_payload(
    public_key: &PublicKey,
    payload: &[u8],
    signature: &Signature,
) -> Result<(), SignatureError> {
    if public_key.verify(&sha3_256(payload), signature) {
        Ok(())
    } else {
        Err(SignatureError::VerificationFailed)
    }
}
