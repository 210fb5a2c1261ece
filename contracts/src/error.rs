//! Chaincode error taxonomy.
//!
//! Every failure a caller can observe is a [`ChaincodeError`]. Callers match
//! on [`ChaincodeError::kind`] rather than on message text; the messages
//! still carry the fragments clients grep for (`incorrect nonce`,
//! `invalid signature`, `insufficient funds`, `expired`).

use std::fmt;

use chanswap_protocol::auth::{AuthError, EnvelopeError};
use chanswap_protocol::identity::{AddressError, RegistryError};
use chanswap_protocol::ledger::{AmountParseError, LedgerError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Stable error classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Auth,
    InsufficientFunds,
    NotFound,
    InvalidState,
    HashMismatch,
    InvalidArgument,
    Forbidden,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Auth => "AUTH",
            ErrorKind::InsufficientFunds => "INSUFFICIENT_FUNDS",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::InvalidState => "INVALID_STATE",
            ErrorKind::HashMismatch => "HASH_MISMATCH",
            ErrorKind::InvalidArgument => "INVALID_ARGUMENT",
            ErrorKind::Forbidden => "FORBIDDEN",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Errors returned by `invoke` and `query`.
#[derive(Debug, Error)]
pub enum ChaincodeError {
    /// Signature, signer or nonce rejected by the gate.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Ledger refused a posting.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Key registry refused the operation.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// No channel with this name.
    #[error("channel {0} not found")]
    UnknownChannel(String),

    /// The chaincode has no such method, or it was called the wrong way.
    #[error("method {method} not found on {chaincode}")]
    UnknownMethod { chaincode: String, method: String },

    /// No swap record with this transaction id on this channel.
    #[error("{kind} {tx_id} not found")]
    SwapNotFound { kind: &'static str, tx_id: String },

    /// The record is not in the state the operation requires.
    #[error("{kind} {id} is {current}, expected {expected}")]
    InvalidState {
        kind: &'static str,
        id: String,
        current: String,
        expected: String,
    },

    /// The record passed its expiry before completion.
    #[error("{kind} {tx_id} expired at {expires_at}")]
    Expired {
        kind: &'static str,
        tx_id: String,
        expires_at: DateTime<Utc>,
    },

    /// The record has not expired yet, so it cannot be cancelled.
    #[error("{kind} {tx_id} cannot be cancelled before {expires_at}")]
    NotExpired {
        kind: &'static str,
        tx_id: String,
        expires_at: DateTime<Utc>,
    },

    /// The revealed preimage does not hash to the lock.
    #[error("hash mismatch: preimage does not open the lock of {kind} {tx_id}")]
    HashMismatch { kind: &'static str, tx_id: String },

    /// An argument failed to parse or validate.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The caller is authenticated but not allowed to do this.
    #[error("forbidden: {0}")]
    Forbidden(String),
}

impl ChaincodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChaincodeError::Auth(_) => ErrorKind::Auth,
            ChaincodeError::Ledger(LedgerError::InsufficientFunds { .. }) => {
                ErrorKind::InsufficientFunds
            }
            ChaincodeError::Registry(RegistryError::AlreadyExists(_)) => ErrorKind::InvalidArgument,
            ChaincodeError::Registry(_) => ErrorKind::NotFound,
            ChaincodeError::UnknownChannel(_)
            | ChaincodeError::UnknownMethod { .. }
            | ChaincodeError::SwapNotFound { .. } => ErrorKind::NotFound,
            ChaincodeError::InvalidState { .. }
            | ChaincodeError::Expired { .. }
            | ChaincodeError::NotExpired { .. } => ErrorKind::InvalidState,
            ChaincodeError::HashMismatch { .. } => ErrorKind::HashMismatch,
            ChaincodeError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            ChaincodeError::Forbidden(_) => ErrorKind::Forbidden,
        }
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        ChaincodeError::InvalidArgument(msg.into())
    }
}

impl From<EnvelopeError> for ChaincodeError {
    fn from(err: EnvelopeError) -> Self {
        ChaincodeError::Auth(AuthError::Malformed(err))
    }
}

impl From<AddressError> for ChaincodeError {
    fn from(err: AddressError) -> Self {
        ChaincodeError::InvalidArgument(err.to_string())
    }
}

impl From<AmountParseError> for ChaincodeError {
    fn from(err: AmountParseError) -> Self {
        ChaincodeError::InvalidArgument(err.to_string())
    }
}

impl From<serde_json::Error> for ChaincodeError {
    fn from(err: serde_json::Error) -> Self {
        ChaincodeError::InvalidArgument(format!("bad json: {err}"))
    }
}
