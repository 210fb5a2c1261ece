// Copyright (c) 2026 Channel Swap Ledger Contributors. MIT License.
// See LICENSE for details.

//! # Channel Swap Ledger Core Library
//!
//! The pieces every channel of the ledger shares:
//!
//! - **config**: Protocol constants and the JSON network configuration.
//! - **crypto**: Ed25519 keys, SHA3-256 / SHA-256 / BLAKE3 hashing.
//! - **identity**: Public-key-derived addresses and the key registry.
//! - **auth**: Signed request envelopes and the nonce/TTL gate.
//! - **ledger**: Regular and allowed balances with atomic postings.
//!
//! Chaincodes and the swap coordinators live in `chanswap-contracts`, which
//! builds on these types.

pub mod auth;
pub mod config;
pub mod crypto;
pub mod identity;
pub mod ledger;
