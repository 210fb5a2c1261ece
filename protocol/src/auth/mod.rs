//! # Request Authorization
//!
//! Signed envelopes and the nonce gate that admits them.
//!
//! - **envelope**: canonical signing payload and the wire trailer
//!   `[nonce, public key, signature]`.
//! - **nonce**: per-signer replay state with an optional TTL window, plus
//!   the client-side millisecond nonce source.
//! - **gate**: registry lookup, signature check and nonce critical section.

pub mod envelope;
pub mod gate;
pub mod nonce;

pub use envelope::{signing_payload, Envelope, EnvelopeError};
pub use gate::{AuthError, AuthGate, Authorized, NonceKey};
pub use nonce::{NonceRejection, NonceSource, NonceState};
