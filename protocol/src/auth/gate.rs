//! Transaction authorization gate.
//!
//! Every state-mutating signed call passes through [`AuthGate::authorize`].
//! The checks, in order:
//!
//! 1. **Registered signer**: the envelope's key must be in the registry.
//! 2. **Signature**: Ed25519 over the envelope payload digest.
//! 3. **Nonce**: against the signer's [`NonceState`] for this
//!    `(channel, chaincode)` and the chaincode's TTL.
//!
//! Steps 1 and 2 run without any lock. Step 3 and the business mutation run
//! under the per-key nonce mutex, and the nonce is recorded only if the
//! mutation succeeds. A rejected request therefore leaves no trace, and two
//! requests carrying the same nonce can never both mutate state.
//!
//! ## Locking
//!
//! - `DashMap` maps each [`NonceKey`] to an `Arc<Mutex<NonceState>>`. The
//!   map shard lock is released before the per-key mutex is taken.
//! - Disjoint keys never contend. There is no global lock.
//! - Lock order across the workspace is nonce, then per-swap ordering lock,
//!   then swap record, then balances. Business closures must not re-enter
//!   the gate.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

use super::envelope::{Envelope, EnvelopeError};
use super::nonce::{NonceRejection, NonceState};
use crate::identity::{Address, KeyRegistry};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Authorization failures. None of them mutate state.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The envelope could not be decoded.
    #[error("malformed signed request: {0}")]
    Malformed(#[from] EnvelopeError),

    /// The signer's key is not registered.
    #[error("unknown signer {0}")]
    UnknownSigner(String),

    /// The signature does not verify over the payload.
    #[error("invalid signature from {signer}")]
    InvalidSignature { signer: Address },

    /// The nonce was replayed, out of order or stale.
    #[error("incorrect nonce {nonce} for {signer}: {reason}")]
    IncorrectNonce {
        signer: Address,
        nonce: u64,
        reason: String,
    },
}

impl AuthError {
    fn from_rejection(signer: Address, nonce: u64, rejection: NonceRejection) -> Self {
        let reason = match rejection {
            NonceRejection::NotIncreasing { last } => {
                format!("must be greater than last accepted {last}")
            }
            NonceRejection::Replayed => "already used".to_string(),
            NonceRejection::Stale { newest, ttl_ms } => {
                format!("older than {ttl_ms}ms before newest accepted {newest}")
            }
        };
        AuthError::IncorrectNonce {
            signer,
            nonce,
            reason,
        }
    }
}

// ---------------------------------------------------------------------------
// NonceKey
// ---------------------------------------------------------------------------

/// Scope of one nonce sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NonceKey {
    pub signer: Address,
    pub channel: String,
    pub chaincode: String,
}

impl NonceKey {
    pub fn new(signer: Address, channel: &str, chaincode: &str) -> Self {
        Self {
            signer,
            channel: channel.to_lowercase(),
            chaincode: chaincode.to_lowercase(),
        }
    }
}

impl fmt::Display for NonceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.channel, self.chaincode, self.signer)
    }
}

/// What a business closure learns about the authorized caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Authorized {
    pub signer: Address,
    pub nonce: u64,
}

// ---------------------------------------------------------------------------
// AuthGate
// ---------------------------------------------------------------------------

/// Signature and nonce gate shared by every channel of a network.
#[derive(Debug)]
pub struct AuthGate {
    registry: Arc<KeyRegistry>,
    nonces: DashMap<NonceKey, Arc<Mutex<NonceState>>>,
}

impl AuthGate {
    pub fn new(registry: Arc<KeyRegistry>) -> Self {
        Self {
            registry,
            nonces: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<KeyRegistry> {
        &self.registry
    }

    /// Verifies `envelope`, then runs `apply` inside the nonce critical
    /// section. The nonce is consumed only when `apply` returns `Ok`.
    pub fn authorize<T, E>(
        &self,
        envelope: &Envelope,
        ttl: Duration,
        apply: impl FnOnce(Authorized) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<AuthError>,
    {
        let signer = self.verify_signer(envelope)?;
        let key = NonceKey::new(signer, &envelope.channel, &envelope.chaincode);
        let ttl_ms = ttl.as_millis() as u64;

        let slot = self.slot(&key);
        let mut state = slot.lock();

        if let Err(rejection) = state.check(envelope.nonce, ttl_ms) {
            warn!(
                channel = %key.channel,
                signer = %signer,
                nonce = envelope.nonce,
                ?rejection,
                "nonce rejected"
            );
            return Err(AuthError::from_rejection(signer, envelope.nonce, rejection).into());
        }

        let out = apply(Authorized {
            signer,
            nonce: envelope.nonce,
        })?;

        state.record(envelope.nonce, ttl_ms);
        debug!(
            channel = %key.channel,
            signer = %signer,
            nonce = envelope.nonce,
            method = %envelope.method,
            "request authorized"
        );
        Ok(out)
    }

    /// Gate-only admission with no business mutation attached.
    pub fn admit(&self, envelope: &Envelope, ttl: Duration) -> Result<Address, AuthError> {
        self.authorize(envelope, ttl, |auth| Ok::<_, AuthError>(auth.signer))
    }

    /// Snapshot of a nonce sequence.
    pub fn nonce_state(&self, key: &NonceKey) -> Option<NonceState> {
        self.nonces.get(key).map(|slot| slot.lock().clone())
    }

    fn verify_signer(&self, envelope: &Envelope) -> Result<Address, AuthError> {
        let signer = self.registry.check_keys(&envelope.public_key).map_err(|_| {
            warn!(channel = %envelope.channel, key = %envelope.public_key, "unknown signer");
            AuthError::UnknownSigner(envelope.public_key.to_base58())
        })?;

        let registered = self
            .registry
            .public_key_of(&signer)
            .map_err(|_| AuthError::UnknownSigner(envelope.public_key.to_base58()))?;
        if envelope.verify_with(&registered).is_err() {
            warn!(channel = %envelope.channel, signer = %signer, "invalid signature");
            return Err(AuthError::InvalidSignature { signer });
        }
        Ok(signer)
    }

    fn slot(&self, key: &NonceKey) -> Arc<Mutex<NonceState>> {
        if let Some(slot) = self.nonces.get(key) {
            return Arc::clone(&slot);
        }
        Arc::clone(&self.nonces.entry(key.clone()).or_default())
    }
}
