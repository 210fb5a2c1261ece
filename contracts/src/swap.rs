//! # Hash-Locked Cross-Channel Swaps
//!
//! A swap moves value from a source channel to a destination channel under
//! a hash lock. The lifecycle per transaction id is:
//!
//! 1. **Begin** (source channel, signed): the creator's legs are debited on
//!    the source and a `Pending` record is committed on both channels.
//! 2. **Done** (destination channel, unsigned): whoever knows the preimage
//!    reveals it; the legs are credited to the creator on the destination and
//!    both copies move to `Done`.
//! 3. **Cancel** (after expiry): both copies move to `Cancelled` and the
//!    source debit is refunded.
//!
//! `Done` and `Cancelled` are terminal. Single-asset [`SwapRecord`]s and
//! multi-asset records share this machinery through the [`Swap`] trait, a
//! generic [`SwapBook`] per channel and the [`SwapCoordinator`].
//!
//! ## Locking
//!
//! Each record sits behind its own mutex. The coordinator additionally
//! holds a per-transaction-id ordering lock across both channel copies, so
//! completion, mirroring and cancellation of one swap are serialized while
//! unrelated swaps proceed in parallel. Lock order: ordering lock, record,
//! balances.

use std::fmt;
use std::sync::Arc;

use chanswap_protocol::crypto::{Digest32, HashAlgorithm};
use chanswap_protocol::identity::Address;
use chanswap_protocol::ledger::Amount;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::ChaincodeError;
use crate::token::{LegDirection, TokenChaincode};

// ---------------------------------------------------------------------------
// HashLock
// ---------------------------------------------------------------------------

/// `H(preimage)` under the channel's configured hash function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashLock {
    #[serde(with = "hex_digest")]
    pub hash: Digest32,
    pub algorithm: HashAlgorithm,
}

impl HashLock {
    /// Parses a hex-encoded 32-byte lock.
    pub fn parse(hex_str: &str, algorithm: HashAlgorithm) -> Result<Self, ChaincodeError> {
        let bytes = hex::decode(hex_str.trim())
            .map_err(|e| ChaincodeError::invalid_argument(format!("hash lock: {e}")))?;
        let hash: Digest32 = bytes.as_slice().try_into().map_err(|_| {
            ChaincodeError::invalid_argument(format!(
                "hash lock must be 32 bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self { hash, algorithm })
    }

    pub fn from_preimage(preimage: &[u8], algorithm: HashAlgorithm) -> Self {
        Self {
            hash: algorithm.digest(preimage),
            algorithm,
        }
    }

    /// Returns `true` if `preimage` hashes to this lock.
    pub fn opens(&self, preimage: &[u8]) -> bool {
        self.algorithm.digest(preimage) == self.hash
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.hash)
    }
}

mod hex_digest {
    use chanswap_protocol::crypto::Digest32;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(digest: &Digest32, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(digest))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Digest32, D::Error> {
        let raw = String::deserialize(d)?;
        let bytes = hex::decode(&raw).map_err(de::Error::custom)?;
        bytes
            .as_slice()
            .try_into()
            .map_err(|_| de::Error::custom("hash must be 32 bytes"))
    }
}

// ---------------------------------------------------------------------------
// Status and records
// ---------------------------------------------------------------------------

/// Lifecycle state of a swap record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapStatus {
    Pending,
    Done,
    Cancelled,
}

impl SwapStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SwapStatus::Pending)
    }
}

impl fmt::Display for SwapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwapStatus::Pending => write!(f, "Pending"),
            SwapStatus::Done => write!(f, "Done"),
            SwapStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// One `(group, amount)` leg. The JSON names match the `Assets` argument of
/// `multiSwapBegin`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetLeg {
    pub group: String,
    pub amount: Amount,
}

/// Fields shared by every kind of swap record. Both channel copies hold
/// identical headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapHeader {
    pub tx_id: String,
    pub source_channel: String,
    pub dest_channel: String,
    pub hash_lock: HashLock,
    pub status: SwapStatus,
    pub creator: Address,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SwapHeader {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// A single-asset swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapRecord {
    #[serde(flatten)]
    pub header: SwapHeader,
    pub asset_group: String,
    pub amount: Amount,
}

/// Behaviour shared by single- and multi-asset records.
pub trait Swap: Clone + Serialize + Send + Sync + 'static {
    /// Name used in errors and logs.
    const KIND: &'static str;

    fn header(&self) -> &SwapHeader;

    fn header_mut(&mut self) -> &mut SwapHeader;

    /// The legs that are debited on begin and credited on done or refund.
    fn legs(&self) -> Vec<AssetLeg>;

    /// This record type's book on a channel.
    fn book(chaincode: &TokenChaincode) -> &SwapBook<Self>;
}

impl Swap for SwapRecord {
    const KIND: &'static str = "swap";

    fn header(&self) -> &SwapHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut SwapHeader {
        &mut self.header
    }

    fn legs(&self) -> Vec<AssetLeg> {
        vec![AssetLeg {
            group: self.asset_group.clone(),
            amount: self.amount.clone(),
        }]
    }

    fn book(chaincode: &TokenChaincode) -> &SwapBook<Self> {
        chaincode.swaps()
    }
}

// ---------------------------------------------------------------------------
// SwapBook
// ---------------------------------------------------------------------------

/// One channel's copy of every swap record of one kind.
#[derive(Debug)]
pub struct SwapBook<R> {
    records: DashMap<String, Arc<Mutex<R>>>,
}

impl<R> Default for SwapBook<R> {
    fn default() -> Self {
        Self {
            records: DashMap::new(),
        }
    }
}

impl<R: Swap> SwapBook<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, tx_id: &str) -> bool {
        self.records.contains_key(tx_id)
    }

    /// Commits a new record. Transaction ids are never reused.
    pub fn insert(&self, record: R) -> Result<(), ChaincodeError> {
        let tx_id = record.header().tx_id.clone();
        match self.records.entry(tx_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                let current = existing.get().lock().header().status;
                Err(ChaincodeError::InvalidState {
                    kind: R::KIND,
                    id: tx_id,
                    current: current.to_string(),
                    expected: "absent".into(),
                })
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(record)));
                Ok(())
            }
        }
    }

    /// Removes a record. Only used to unwind a begin that could not be
    /// mirrored.
    fn remove(&self, tx_id: &str) {
        self.records.remove(tx_id);
    }

    pub fn get(&self, tx_id: &str) -> Result<R, ChaincodeError> {
        Ok(self.slot(tx_id)?.lock().clone())
    }

    /// Pending → Done after the status, expiry and hash checks. `settle`
    /// runs under the record lock; if it fails, the record stays Pending.
    pub fn complete(
        &self,
        tx_id: &str,
        preimage: &[u8],
        now: DateTime<Utc>,
        settle: impl FnOnce(&R) -> Result<(), ChaincodeError>,
    ) -> Result<R, ChaincodeError> {
        let slot = self.slot(tx_id)?;
        let mut record = slot.lock();
        let header = record.header();

        expect_pending::<R>(header)?;
        if header.is_expired(now) {
            return Err(ChaincodeError::Expired {
                kind: R::KIND,
                tx_id: tx_id.to_string(),
                expires_at: header.expires_at,
            });
        }
        if !header.hash_lock.opens(preimage) {
            return Err(ChaincodeError::HashMismatch {
                kind: R::KIND,
                tx_id: tx_id.to_string(),
            });
        }

        settle(&*record)?;
        record.header_mut().status = SwapStatus::Done;
        Ok(record.clone())
    }

    /// Pending → Cancelled once expired. `refund` runs under the record lock.
    pub fn cancel(
        &self,
        tx_id: &str,
        now: DateTime<Utc>,
        refund: impl FnOnce(&R) -> Result<(), ChaincodeError>,
    ) -> Result<R, ChaincodeError> {
        let slot = self.slot(tx_id)?;
        let mut record = slot.lock();
        let header = record.header();

        expect_pending::<R>(header)?;
        if !header.is_expired(now) {
            return Err(ChaincodeError::NotExpired {
                kind: R::KIND,
                tx_id: tx_id.to_string(),
                expires_at: header.expires_at,
            });
        }

        refund(&*record)?;
        record.header_mut().status = SwapStatus::Cancelled;
        Ok(record.clone())
    }

    /// Pending → `status` without any balance effect. Applies the other
    /// channel's transition to this copy.
    pub fn mark(&self, tx_id: &str, status: SwapStatus) -> Result<R, ChaincodeError> {
        let slot = self.slot(tx_id)?;
        let mut record = slot.lock();
        expect_pending::<R>(record.header())?;
        record.header_mut().status = status;
        Ok(record.clone())
    }

    /// Ids of Pending records that originate on `channel` and have expired.
    pub fn expired_from(&self, channel: &str, now: DateTime<Utc>) -> Vec<String> {
        self.matching(|h| {
            h.status == SwapStatus::Pending && h.source_channel == channel && h.is_expired(now)
        })
    }

    /// Legs currently held in escrow by Pending records that originate on
    /// `channel`.
    pub fn escrowed_from(&self, channel: &str) -> Vec<AssetLeg> {
        self.snapshot()
            .into_iter()
            .filter(|r| {
                let h = r.header();
                h.status == SwapStatus::Pending && h.source_channel == channel
            })
            .flat_map(|r| r.legs())
            .collect()
    }

    fn matching(&self, pred: impl Fn(&SwapHeader) -> bool) -> Vec<String> {
        self.snapshot()
            .into_iter()
            .filter(|r| pred(r.header()))
            .map(|r| r.header().tx_id.clone())
            .collect()
    }

    fn snapshot(&self) -> Vec<R> {
        let slots: Vec<Arc<Mutex<R>>> = self
            .records
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        slots.into_iter().map(|slot| slot.lock().clone()).collect()
    }

    fn slot(&self, tx_id: &str) -> Result<Arc<Mutex<R>>, ChaincodeError> {
        self.records
            .get(tx_id)
            .map(|slot| Arc::clone(&slot))
            .ok_or_else(|| ChaincodeError::SwapNotFound {
                kind: R::KIND,
                tx_id: tx_id.to_string(),
            })
    }
}

fn expect_pending<R: Swap>(header: &SwapHeader) -> Result<(), ChaincodeError> {
    if header.status == SwapStatus::Pending {
        Ok(())
    } else {
        Err(ChaincodeError::InvalidState {
            kind: R::KIND,
            id: header.tx_id.clone(),
            current: header.status.to_string(),
            expected: SwapStatus::Pending.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// SwapCoordinator
// ---------------------------------------------------------------------------

/// Drives both channel copies of a swap through its lifecycle.
#[derive(Debug, Default)]
pub struct SwapCoordinator {
    ordering: DashMap<String, Arc<Mutex<()>>>,
}

impl SwapCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Debits the legs on `source` and commits the record on both channels.
    pub fn begin<R: Swap>(
        &self,
        source: &TokenChaincode,
        dest: &TokenChaincode,
        record: R,
    ) -> Result<R, ChaincodeError> {
        let tx_id = record.header().tx_id.clone();
        let lock = self.ordering_lock(&tx_id);
        let guard = lock.lock();
        let result = Self::mirror(source, dest, record);
        drop(guard);
        self.release_settled::<R>(source, &tx_id);
        result
    }

    fn mirror<R: Swap>(
        source: &TokenChaincode,
        dest: &TokenChaincode,
        record: R,
    ) -> Result<R, ChaincodeError> {
        let header = record.header().clone();
        let legs = record.legs();
        source.apply_legs(header.creator, &legs, LegDirection::Debit)?;

        if let Err(err) = R::book(source).insert(record.clone()) {
            source.apply_legs(header.creator, &legs, LegDirection::Credit)?;
            return Err(err);
        }
        if let Err(err) = R::book(dest).insert(record.clone()) {
            R::book(source).remove(&header.tx_id);
            source.apply_legs(header.creator, &legs, LegDirection::Credit)?;
            return Err(err);
        }

        info!(
            kind = R::KIND,
            tx_id = %header.tx_id,
            source = %header.source_channel,
            dest = %header.dest_channel,
            creator = %header.creator,
            legs = legs.len(),
            "swap begun and mirrored"
        );
        Ok(record)
    }

    /// Opens the lock on `dest`, credits the creator there and marks both
    /// copies Done.
    pub fn done<R: Swap>(
        &self,
        dest: &TokenChaincode,
        source: &TokenChaincode,
        tx_id: &str,
        preimage: &[u8],
        now: DateTime<Utc>,
    ) -> Result<R, ChaincodeError> {
        let lock = self.ordering_lock(tx_id);
        let guard = lock.lock();
        let result = R::book(dest)
            .complete(tx_id, preimage, now, |rec| {
                dest.apply_legs(rec.header().creator, &rec.legs(), LegDirection::Credit)
            })
            .map(|record| {
                if let Err(err) = R::book(source).mark(tx_id, SwapStatus::Done) {
                    error!(kind = R::KIND, tx_id, %err, "source copy diverged on done");
                }
                info!(
                    kind = R::KIND,
                    tx_id,
                    channel = %dest.name(),
                    creator = %record.header().creator,
                    "swap done"
                );
                record
            });
        drop(guard);
        self.release_settled::<R>(source, tx_id);
        result
    }

    /// Cancels an expired swap: the source copy is refunded first, then the
    /// destination copy is marked Cancelled.
    pub fn cancel<R: Swap>(
        &self,
        source: &TokenChaincode,
        dest: &TokenChaincode,
        tx_id: &str,
        now: DateTime<Utc>,
    ) -> Result<R, ChaincodeError> {
        let lock = self.ordering_lock(tx_id);
        let guard = lock.lock();
        let result = R::book(source)
            .cancel(tx_id, now, |rec| {
                source.apply_legs(rec.header().creator, &rec.legs(), LegDirection::Credit)
            })
            .map(|record| {
                if let Err(err) = R::book(dest).mark(tx_id, SwapStatus::Cancelled) {
                    error!(kind = R::KIND, tx_id, %err, "destination copy diverged on cancel");
                }
                info!(
                    kind = R::KIND,
                    tx_id,
                    channel = %source.name(),
                    creator = %record.header().creator,
                    "swap cancelled and refunded"
                );
                record
            });
        drop(guard);
        self.release_settled::<R>(source, tx_id);
        result
    }

    /// Number of transaction ids holding an ordering lock.
    pub fn in_flight(&self) -> usize {
        self.ordering.len()
    }

    fn ordering_lock(&self, tx_id: &str) -> Arc<Mutex<()>> {
        Arc::clone(&self.ordering.entry(tx_id.to_string()).or_default())
    }

    /// Drops the ordering lock of a swap whose source copy is absent or
    /// terminal. Any later call for the same id fails its Pending check.
    fn release_settled<R: Swap>(&self, source: &TokenChaincode, tx_id: &str) {
        let live = matches!(
            R::book(source).get(tx_id),
            Ok(record) if record.header().status == SwapStatus::Pending
        );
        if !live {
            self.ordering.remove(tx_id);
        }
    }
}
