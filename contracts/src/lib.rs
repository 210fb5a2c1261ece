//! # Channel Swap Ledger Chaincode
//!
//! Channel-side logic for the swap ledger. Every channel hosts one token
//! chaincode named after it; a [`Network`] hosts the channels and routes
//! invokes and queries to them.
//!
//! - **Token**: issuance, transfers, group supplies and balance queries on
//!   one channel, following the home-channel rule.
//! - **Swap**: hash-locked single-asset swaps mirrored on the source and
//!   destination channels.
//! - **MultiSwap**: the same lifecycle with several asset legs under one
//!   hash lock.
//! - **Network**: transaction ids, the auth gate, the `acl` channel, the
//!   expiry sweep and the conservation audit.
//!
//! ## Design Principles
//!
//! 1. Balances never go below zero. A debit checks and subtracts under one lock.
//! 2. State transitions are explicit: enum variants, not boolean flags.
//! 3. A rejected invoke has no side effects.
//! 4. Every record is serializable (serde) for query payloads.

pub mod error;
pub mod method;
pub mod multiswap;
pub mod network;
pub mod swap;
pub mod token;

pub use error::{ChaincodeError, ErrorKind};
pub use method::{Access, Method};
pub use multiswap::{AssetsArg, MultiSwapRecord};
pub use network::{AclEntry, InvokeResponse, Network, SweepReport, TxContext, ACL_CHANNEL};
pub use swap::{AssetLeg, HashLock, Swap, SwapBook, SwapCoordinator, SwapHeader, SwapRecord, SwapStatus};
pub use token::{group_symbol, home_channel, LegDirection, Metadata, TokenChaincode};
