//! Signed request envelopes.
//!
//! A client signs `(channel, chaincode, method, args, nonce)` and appends
//! three trailing arguments to the business arguments:
//!
//! ```text
//! [arg_0, ..., arg_n, nonce, base58(public_key), base58(signature)]
//! ```
//!
//! The signing payload is versioned and every field is length-prefixed, so
//! no two distinct requests share a payload. Names are lower-cased before
//! encoding because channel, chaincode and method lookups are
//! case-insensitive.

use thiserror::Error;

use crate::config::{ENVELOPE_TRAILER_LEN, ENVELOPE_VERSION};
use crate::crypto::keys::{KeyError, Keypair, PublicKey, Signature};
use crate::crypto::signatures::{sign_payload, verify_payload, SignatureError};
use crate::identity::Address;

/// Errors while decoding an envelope off the wire.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// Fewer arguments than the trailer needs.
    #[error("signed request is missing its nonce/key/signature trailer ({got} arguments)")]
    MissingTrailer { got: usize },

    #[error("nonce is not an unsigned integer: '{0}'")]
    BadNonce(String),

    #[error("bad public key: {0}")]
    BadPublicKey(#[source] KeyError),

    #[error("bad signature encoding: {0}")]
    BadSignature(#[source] KeyError),
}

/// A decoded signed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub channel: String,
    pub chaincode: String,
    pub method: String,
    pub args: Vec<String>,
    pub nonce: u64,
    pub public_key: PublicKey,
    pub signature: Signature,
}

/// Canonical bytes a signer commits to.
pub fn signing_payload(
    channel: &str,
    chaincode: &str,
    method: &str,
    args: &[String],
    nonce: u64,
    public_key: &PublicKey,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(128 + args.iter().map(String::len).sum::<usize>());

    buf.push(ENVELOPE_VERSION);
    push_field(&mut buf, channel.to_lowercase().as_bytes());
    push_field(&mut buf, chaincode.to_lowercase().as_bytes());
    push_field(&mut buf, method.to_lowercase().as_bytes());

    buf.extend_from_slice(&(args.len() as u32).to_le_bytes());
    for arg in args {
        push_field(&mut buf, arg.as_bytes());
    }

    buf.extend_from_slice(&nonce.to_le_bytes());
    buf.extend_from_slice(public_key.as_bytes());
    buf
}

fn push_field(buf: &mut Vec<u8>, field: &[u8]) {
    buf.extend_from_slice(&(field.len() as u32).to_le_bytes());
    buf.extend_from_slice(field);
}

impl Envelope {
    /// Builds and signs an envelope.
    pub fn sign(
        keypair: &Keypair,
        channel: &str,
        chaincode: &str,
        method: &str,
        args: Vec<String>,
        nonce: u64,
    ) -> Self {
        let public_key = keypair.public_key();
        let payload = signing_payload(channel, chaincode, method, &args, nonce, &public_key);
        Self {
            channel: channel.to_string(),
            chaincode: chaincode.to_string(),
            method: method.to_string(),
            args,
            nonce,
            public_key,
            signature: sign_payload(keypair, &payload),
        }
    }

    /// Splits the trailer off a wire argument list. The signature is not
    /// checked here; see [`Envelope::verify`].
    pub fn from_wire(
        channel: &str,
        chaincode: &str,
        method: &str,
        wire: &[String],
    ) -> Result<Self, EnvelopeError> {
        if wire.len() < ENVELOPE_TRAILER_LEN {
            return Err(EnvelopeError::MissingTrailer { got: wire.len() });
        }
        let (args, trailer) = wire.split_at(wire.len() - ENVELOPE_TRAILER_LEN);

        let nonce = trailer[0]
            .parse::<u64>()
            .map_err(|_| EnvelopeError::BadNonce(trailer[0].clone()))?;
        let public_key = PublicKey::from_base58(&trailer[1]).map_err(EnvelopeError::BadPublicKey)?;
        let signature = Signature::from_base58(&trailer[2]).map_err(EnvelopeError::BadSignature)?;

        Ok(Self {
            channel: channel.to_string(),
            chaincode: chaincode.to_string(),
            method: method.to_string(),
            args: args.to_vec(),
            nonce,
            public_key,
            signature,
        })
    }

    /// Wire form: business args followed by the trailer.
    pub fn to_wire(&self) -> Vec<String> {
        let mut wire = Vec::with_capacity(self.args.len() + ENVELOPE_TRAILER_LEN);
        wire.extend(self.args.iter().cloned());
        wire.push(self.nonce.to_string());
        wire.push(self.public_key.to_base58());
        wire.push(self.signature.to_base58());
        wire
    }

    pub fn payload(&self) -> Vec<u8> {
        signing_payload(
            &self.channel,
            &self.chaincode,
            &self.method,
            &self.args,
            self.nonce,
            &self.public_key,
        )
    }

    /// Checks the signature against the embedded public key.
    pub fn verify(&self) -> Result<(), SignatureError> {
        self.verify_with(&self.public_key)
    }

    /// Checks the signature against a key the caller already trusts.
    pub fn verify_with(&self, public_key: &PublicKey) -> Result<(), SignatureError> {
        verify_payload(public_key, &self.payload(), &self.signature)
    }

    /// Address of the embedded public key.
    pub fn signer(&self) -> Address {
        Address::from_public_key(&self.public_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn sign_wire_decode_verify() {
        let kp = Keypair::generate();
        let env = Envelope::sign(&kp, "fiat", "fiat", "emit", args(&["addr", "1"]), 42);
        let wire = env.to_wire();
        assert_eq!(wire.len(), 5);
        assert_eq!(wire[2], "42");

        let decoded = Envelope::from_wire("fiat", "fiat", "emit", &wire).unwrap();
        assert_eq!(decoded, env);
        decoded.verify().unwrap();
        assert_eq!(decoded.signer(), Address::from_public_key(&kp.public_key()));
    }

    #[test]
    fn names_are_case_insensitive() {
        let kp = Keypair::generate();
        let env = Envelope::sign(&kp, "CC", "cc", "swapBegin", args(&["x"]), 1);
        let decoded = Envelope::from_wire("cc", "CC", "SWAPBEGIN", &env.to_wire()).unwrap();
        decoded.verify().unwrap();
    }

    #[test]
    fn envelope_is_bound_to_method() {
        let kp = Keypair::generate();
        let env = Envelope::sign(&kp, "fiat", "fiat", "emit", args(&["a", "1"]), 1);
        let replayed = Envelope::from_wire("fiat", "fiat", "transfer", &env.to_wire()).unwrap();
        assert!(replayed.verify().is_err());
    }

    #[test]
    fn envelope_is_bound_to_channel() {
        let kp = Keypair::generate();
        let env = Envelope::sign(&kp, "fiat", "fiat", "emit", args(&["a", "1"]), 1);
        let replayed = Envelope::from_wire("cc", "fiat", "emit", &env.to_wire()).unwrap();
        assert!(replayed.verify().is_err());
    }

    #[test]
    fn tampered_args_fail_verification() {
        let kp = Keypair::generate();
        let mut wire = Envelope::sign(&kp, "fiat", "fiat", "emit", args(&["a", "1"]), 1).to_wire();
        wire[1] = "1000".into();
        let decoded = Envelope::from_wire("fiat", "fiat", "emit", &wire).unwrap();
        assert!(decoded.verify().is_err());
    }

    #[test]
    fn tampered_nonce_fails_verification() {
        let kp = Keypair::generate();
        let mut wire = Envelope::sign(&kp, "fiat", "fiat", "emit", args(&["a"]), 7).to_wire();
        wire[1] = "8".into();
        let decoded = Envelope::from_wire("fiat", "fiat", "emit", &wire).unwrap();
        assert!(decoded.verify().is_err());
    }

    #[test]
    fn verify_with_other_key_fails() {
        let kp = Keypair::generate();
        let env = Envelope::sign(&kp, "fiat", "fiat", "emit", args(&["a", "1"]), 1);
        env.verify_with(&kp.public_key()).unwrap();
        assert!(env.verify_with(&Keypair::generate().public_key()).is_err());
    }

    #[test]
    fn argument_boundaries_matter() {
        let pk = Keypair::generate().public_key();
        let a = signing_payload("c", "c", "m", &args(&["ab", "c"]), 1, &pk);
        let b = signing_payload("c", "c", "m", &args(&["a", "bc"]), 1, &pk);
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_trailers() {
        let short = args(&["1", "2"]);
        assert!(matches!(
            Envelope::from_wire("c", "c", "m", &short),
            Err(EnvelopeError::MissingTrailer { got: 2 })
        ));

        let kp = Keypair::generate();
        let mut wire = Envelope::sign(&kp, "c", "c", "m", vec![], 1).to_wire();
        wire[0] = "-1".into();
        assert!(matches!(
            Envelope::from_wire("c", "c", "m", &wire),
            Err(EnvelopeError::BadNonce(_))
        ));

        let mut wire = Envelope::sign(&kp, "c", "c", "m", vec![], 1).to_wire();
        wire[1] = "xyz".into();
        assert!(matches!(
            Envelope::from_wire("c", "c", "m", &wire),
            Err(EnvelopeError::BadPublicKey(_))
        ));

        let mut wire = Envelope::sign(&kp, "c", "c", "m", vec![], 1).to_wire();
        wire[2] = kp.public_key().to_base58();
        assert!(matches!(
            Envelope::from_wire("c", "c", "m", &wire),
            Err(EnvelopeError::BadSignature(_))
        ));
    }
}
