//! # Channel Balance Ledger
//!
//! One [`Ledger`] per channel. It holds two parallel maps keyed by
//! `(owner, group)`:
//!
//! - **Regular** balances, for groups whose home is this channel.
//! - **Allowed** balances, for groups that arrived from another channel
//!   through a swap.
//!
//! Every slot is an `Arc<Mutex<Amount>>` inside a `DashMap`, so disjoint
//! keys never contend. A debit checks and subtracts under the slot's lock.
//! Multi-key mutations go through [`Ledger::apply`], which locks every
//! touched slot in key order and either applies all postings or none.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::amount::Amount;
use crate::identity::Address;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during balance operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// Attempted to debit more than the available balance.
    #[error("insufficient funds: {owner} holds {available} {group} ({kind}), needs {requested}")]
    InsufficientFunds {
        owner: Address,
        group: String,
        kind: BalanceKind,
        available: Amount,
        requested: Amount,
    },
}

// ---------------------------------------------------------------------------
// Keys and postings
// ---------------------------------------------------------------------------

/// Which of the two balance maps a slot lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BalanceKind {
    Regular,
    Allowed,
}

impl fmt::Display for BalanceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BalanceKind::Regular => write!(f, "regular"),
            BalanceKind::Allowed => write!(f, "allowed"),
        }
    }
}

/// Address of one balance slot within a channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BalanceKey {
    pub kind: BalanceKind,
    pub owner: Address,
    pub group: String,
}

impl BalanceKey {
    pub fn new(kind: BalanceKind, owner: Address, group: &str) -> Self {
        Self {
            kind,
            owner,
            group: group.to_uppercase(),
        }
    }

    pub fn regular(owner: Address, group: &str) -> Self {
        Self::new(BalanceKind::Regular, owner, group)
    }

    pub fn allowed(owner: Address, group: &str) -> Self {
        Self::new(BalanceKind::Allowed, owner, group)
    }
}

/// Signed change to one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Posting {
    Credit(BalanceKey, Amount),
    Debit(BalanceKey, Amount),
}

impl Posting {
    fn key(&self) -> &BalanceKey {
        match self {
            Posting::Credit(key, _) | Posting::Debit(key, _) => key,
        }
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Balances of one channel.
#[derive(Debug)]
pub struct Ledger {
    channel: String,
    slots: DashMap<BalanceKey, Arc<Mutex<Amount>>>,
}

impl Ledger {
    pub fn new(channel: &str) -> Self {
        Self {
            channel: channel.to_lowercase(),
            slots: DashMap::new(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Adds `amount` to a regular balance. Always succeeds.
    pub fn credit(&self, owner: Address, group: &str, amount: Amount) {
        self.add(&BalanceKey::regular(owner, group), &amount);
    }

    pub fn debit(&self, owner: Address, group: &str, amount: Amount) -> Result<(), LedgerError> {
        self.apply(&[Posting::Debit(BalanceKey::regular(owner, group), amount)])
    }

    pub fn allowed_credit(&self, owner: Address, group: &str, amount: Amount) {
        self.add(&BalanceKey::allowed(owner, group), &amount);
    }

    pub fn allowed_debit(
        &self,
        owner: Address,
        group: &str,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        self.apply(&[Posting::Debit(BalanceKey::allowed(owner, group), amount)])
    }

    pub fn query(&self, owner: Address, group: &str) -> Amount {
        self.get(&BalanceKey::regular(owner, group))
    }

    pub fn allowed_query(&self, owner: Address, group: &str) -> Amount {
        self.get(&BalanceKey::allowed(owner, group))
    }

    pub fn get(&self, key: &BalanceKey) -> Amount {
        self.slots
            .get(key)
            .map(|slot| slot.lock().clone())
            .unwrap_or_default()
    }

    /// Applies every posting or none of them.
    ///
    /// Slots are locked in `BalanceKey` order, so two concurrent `apply`
    /// calls over overlapping keys cannot deadlock. Postings on the same key
    /// are applied in slice order against a scratch copy; nothing is written
    /// back unless all of them succeed.
    pub fn apply(&self, postings: &[Posting]) -> Result<(), LedgerError> {
        let keys: BTreeSet<&BalanceKey> = postings.iter().map(Posting::key).collect();
        let slots: Vec<(&BalanceKey, Arc<Mutex<Amount>>)> =
            keys.into_iter().map(|k| (k, self.slot(k))).collect();
        let mut guards: BTreeMap<&BalanceKey, MutexGuard<'_, Amount>> =
            slots.iter().map(|(k, slot)| (*k, slot.lock())).collect();

        let mut scratch: BTreeMap<&BalanceKey, Amount> =
            guards.iter().map(|(k, g)| (*k, (**g).clone())).collect();

        for posting in postings {
            let key = posting.key();
            let current = scratch.get(key).cloned().unwrap_or_default();
            let next = match posting {
                Posting::Credit(_, amount) => &current + amount,
                Posting::Debit(_, amount) => {
                    current
                        .checked_sub(amount)
                        .ok_or_else(|| LedgerError::InsufficientFunds {
                            owner: key.owner,
                            group: key.group.clone(),
                            kind: key.kind,
                            available: current.clone(),
                            requested: amount.clone(),
                        })?
                }
            };
            scratch.insert(key, next);
        }

        for (key, value) in scratch {
            if let Some(guard) = guards.get_mut(key) {
                **guard = value;
            }
        }

        debug!(channel = %self.channel, postings = postings.len(), "ledger postings applied");
        Ok(())
    }

    /// Every non-zero balance of `owner` in one map, keyed by group.
    pub fn balances_of(&self, owner: Address, kind: BalanceKind) -> BTreeMap<String, Amount> {
        self.snapshot()
            .into_iter()
            .filter(|(k, v)| k.owner == owner && k.kind == kind && !v.is_zero())
            .map(|(k, v)| (k.group, v))
            .collect()
    }

    /// Sum of all balances of `group` in one map.
    pub fn group_total(&self, kind: BalanceKind, group: &str) -> Amount {
        let group = group.to_uppercase();
        self.snapshot()
            .into_iter()
            .filter(|(k, _)| k.kind == kind && k.group == group)
            .map(|(_, v)| v)
            .sum()
    }

    /// Point-in-time copy of every slot. Slots are read one at a time, so a
    /// concurrent `apply` may be partially visible.
    pub fn snapshot(&self) -> Vec<(BalanceKey, Amount)> {
        let slots: Vec<(BalanceKey, Arc<Mutex<Amount>>)> = self
            .slots
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();
        slots
            .into_iter()
            .map(|(key, slot)| {
                let value = slot.lock().clone();
                (key, value)
            })
            .collect()
    }

    fn add(&self, key: &BalanceKey, amount: &Amount) {
        *self.slot(key).lock() += amount;
        debug!(channel = %self.channel, group = %key.group, kind = %key.kind, "ledger credit applied");
    }

    fn slot(&self, key: &BalanceKey) -> Arc<Mutex<Amount>> {
        if let Some(slot) = self.slots.get(key) {
            return Arc::clone(&slot);
        }
        Arc::clone(&self.slots.entry(key.clone()).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::Keypair;

    fn addr() -> Address {
        Address::from_public_key(&Keypair::generate().public_key())
    }

    fn amt(v: u128) -> Amount {
        Amount::new(v)
    }

    #[test]
    fn credit_then_debit() {
        let ledger = Ledger::new("fiat");
        let u = addr();
        ledger.credit(u, "FIAT", amt(10));
        ledger.debit(u, "fiat", amt(4)).unwrap();
        assert_eq!(ledger.query(u, "FIAT"), amt(6));
    }

    #[test]
    fn debit_beyond_balance_fails_without_change() {
        let ledger = Ledger::new("fiat");
        let u = addr();
        ledger.credit(u, "FIAT", amt(3));
        let err = ledger.debit(u, "FIAT", amt(4)).unwrap_err();
        assert!(err.to_string().contains("insufficient funds"));
        assert_eq!(ledger.query(u, "FIAT"), amt(3));
    }

    #[test]
    fn regular_and_allowed_are_separate() {
        let ledger = Ledger::new("cc");
        let u = addr();
        ledger.allowed_credit(u, "FIAT", amt(2));
        assert_eq!(ledger.query(u, "FIAT"), Amount::ZERO);
        assert_eq!(ledger.allowed_query(u, "FIAT"), amt(2));
        assert!(ledger.debit(u, "FIAT", amt(1)).is_err());
        ledger.allowed_debit(u, "FIAT", amt(2)).unwrap();
        assert_eq!(ledger.allowed_query(u, "FIAT"), Amount::ZERO);
    }

    #[test]
    fn credits_grow_past_u128() {
        let ledger = Ledger::new("fiat");
        let u = addr();
        ledger.credit(u, "FIAT", amt(u128::MAX));
        ledger.credit(u, "FIAT", amt(1));
        let expected: Amount = "340282366920938463463374607431768211456".parse().unwrap();
        assert_eq!(ledger.query(u, "FIAT"), expected);
        ledger.debit(u, "FIAT", amt(u128::MAX)).unwrap();
        assert_eq!(ledger.query(u, "FIAT"), amt(1));
    }

    #[test]
    fn apply_is_all_or_nothing() {
        let ledger = Ledger::new("industrial");
        let u = addr();
        let v = addr();
        ledger.credit(u, "INDUSTRIAL_202010", amt(5));
        ledger.credit(u, "INDUSTRIAL_202101", amt(1));

        let res = ledger.apply(&[
            Posting::Debit(BalanceKey::regular(u, "INDUSTRIAL_202010"), amt(5)),
            Posting::Credit(BalanceKey::regular(v, "INDUSTRIAL_202010"), amt(5)),
            Posting::Debit(BalanceKey::regular(u, "INDUSTRIAL_202101"), amt(2)),
        ]);
        assert!(matches!(res, Err(LedgerError::InsufficientFunds { .. })));
        assert_eq!(ledger.query(u, "INDUSTRIAL_202010"), amt(5));
        assert_eq!(ledger.query(v, "INDUSTRIAL_202010"), Amount::ZERO);
        assert_eq!(ledger.query(u, "INDUSTRIAL_202101"), amt(1));
    }

    #[test]
    fn apply_same_key_in_order() {
        let ledger = Ledger::new("fiat");
        let u = addr();
        let key = BalanceKey::regular(u, "FIAT");
        ledger
            .apply(&[
                Posting::Credit(key.clone(), amt(2)),
                Posting::Debit(key.clone(), amt(2)),
            ])
            .unwrap();
        assert!(ledger
            .apply(&[
                Posting::Debit(key.clone(), amt(1)),
                Posting::Credit(key, amt(1)),
            ])
            .is_err());
    }

    #[test]
    fn balances_of_and_totals() {
        let ledger = Ledger::new("industrial");
        let u = addr();
        let v = addr();
        ledger.credit(u, "INDUSTRIAL_202010", amt(2));
        ledger.credit(u, "INDUSTRIAL_202101", amt(3));
        ledger.credit(v, "INDUSTRIAL_202010", amt(4));
        ledger.allowed_credit(u, "FIAT", amt(9));

        let mine = ledger.balances_of(u, BalanceKind::Regular);
        assert_eq!(mine.len(), 2);
        assert_eq!(mine["INDUSTRIAL_202101"], amt(3));
        assert_eq!(
            ledger.group_total(BalanceKind::Regular, "INDUSTRIAL_202010"),
            amt(6)
        );
        assert_eq!(ledger.group_total(BalanceKind::Allowed, "FIAT"), amt(9));
    }

    #[test]
    fn concurrent_debits_never_overspend() {
        let ledger = Ledger::new("fiat");
        let u = addr();
        ledger.credit(u, "FIAT", amt(100));

        let successes: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        (0..50)
                            .filter(|_| ledger.debit(u, "FIAT", amt(1)).is_ok())
                            .count()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(successes, 100);
        assert_eq!(ledger.query(u, "FIAT"), Amount::ZERO);
    }

    #[test]
    fn concurrent_crossing_transfers_do_not_deadlock() {
        let ledger = Ledger::new("fiat");
        let a = addr();
        let b = addr();
        ledger.credit(a, "FIAT", amt(1_000));
        ledger.credit(b, "FIAT", amt(1_000));

        let transfer = |from: Address, to: Address| {
            for _ in 0..200 {
                let _ = ledger.apply(&[
                    Posting::Debit(BalanceKey::regular(from, "FIAT"), amt(1)),
                    Posting::Credit(BalanceKey::regular(to, "FIAT"), amt(1)),
                ]);
            }
        };
        std::thread::scope(|s| {
            s.spawn(|| transfer(a, b));
            s.spawn(|| transfer(b, a));
        });

        let total = &ledger.query(a, "FIAT") + &ledger.query(b, "FIAT");
        assert_eq!(total, amt(2_000));
    }
}
