//! # Balance Ledger
//!
//! Per-channel regular and allowed balances, with string-encoded amounts.

pub mod amount;
pub mod balance;

pub use amount::{Amount, AmountParseError};
pub use balance::{BalanceKey, BalanceKind, Ledger, LedgerError, Posting};
