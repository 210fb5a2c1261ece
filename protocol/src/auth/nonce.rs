//! Nonce bookkeeping.
//!
//! Nonces are client-generated millisecond counters. A [`NonceState`] tracks
//! what one signer has already used against one chaincode; the TTL decides
//! how much reordering is tolerated:
//!
//! - `ttl == 0`: strictly increasing. Anything `<=` the last accepted nonce
//!   is rejected.
//! - `ttl > 0`: any unused nonce no older than `newest - ttl` is accepted,
//!   in any order. Used nonces are remembered for exactly that window;
//!   older ones fall out of the window and are rejected as stale instead.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Why a nonce was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceRejection {
    /// Not greater than the last accepted nonce (`ttl == 0`).
    NotIncreasing { last: u64 },
    /// Already used inside the window.
    Replayed,
    /// Older than `newest - ttl`.
    Stale { newest: u64, ttl_ms: u64 },
}

/// Per-(signer, channel, chaincode) replay state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonceState {
    /// Newest accepted nonce. `None` until the first accept.
    newest: Option<u64>,
    /// Nonces accepted within `ttl` of `newest`. Empty when `ttl == 0`.
    window: BTreeSet<u64>,
}

impl NonceState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn newest(&self) -> Option<u64> {
        self.newest
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Checks `nonce` without mutating anything.
    pub fn check(&self, nonce: u64, ttl_ms: u64) -> Result<(), NonceRejection> {
        let Some(newest) = self.newest else {
            return Ok(());
        };

        if ttl_ms == 0 {
            return if nonce > newest {
                Ok(())
            } else {
                Err(NonceRejection::NotIncreasing { last: newest })
            };
        }

        if nonce < newest.saturating_sub(ttl_ms) {
            return Err(NonceRejection::Stale { newest, ttl_ms });
        }
        if self.window.contains(&nonce) {
            return Err(NonceRejection::Replayed);
        }
        Ok(())
    }

    /// Records an accepted nonce. Call only after [`check`](Self::check)
    /// passed under the same lock.
    pub fn record(&mut self, nonce: u64, ttl_ms: u64) {
        let newest = self.newest.map_or(nonce, |n| n.max(nonce));
        self.newest = Some(newest);

        if ttl_ms == 0 {
            self.window.clear();
            return;
        }

        self.window.insert(nonce);
        let floor = newest.saturating_sub(ttl_ms);
        if self.window.first().is_some_and(|&oldest| oldest < floor) {
            self.window = self.window.split_off(&floor);
        }
    }

    /// Check-and-record in one step.
    pub fn accept(&mut self, nonce: u64, ttl_ms: u64) -> Result<(), NonceRejection> {
        self.check(nonce, ttl_ms)?;
        self.record(nonce, ttl_ms);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// NonceSource
// ---------------------------------------------------------------------------

/// Client-side nonce generator: wall-clock milliseconds, bumped by one when
/// two calls land in the same millisecond so the sequence never repeats.
#[derive(Debug, Default)]
pub struct NonceSource {
    last: AtomicU64,
}

impl NonceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> u64 {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        let mut current = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(current + 1);
            match self.last.compare_exchange_weak(
                current,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(observed) => current = observed,
            }
        }
    }
}
