//! # Token Chaincode
//!
//! One token chaincode runs on every channel and carries the channel's name.
//! It owns the channel's [`Ledger`] and its two swap books. This module holds
//! the channel-local logic: issuance, transfers, the home-channel rule and
//! the read-only queries. Swap orchestration across channels lives in
//! [`crate::network`] and [`crate::swap`].
//!
//! ## Home-channel rule
//!
//! A group's home channel is its symbol (the part before `_`) in lower case:
//! `FIAT` lives on `fiat`, `INDUSTRIAL_202010` on `industrial`. On its home
//! channel a group is held in regular balances; anywhere else it is held in
//! allowed balances.

use std::collections::BTreeMap;
use std::time::Duration;

use chanswap_protocol::config::{ChannelConfig, ConfigError, GROUP_SEPARATOR};
use chanswap_protocol::crypto::HashAlgorithm;
use chanswap_protocol::identity::Address;
use chanswap_protocol::ledger::{Amount, BalanceKey, BalanceKind, Ledger, Posting};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::ChaincodeError;
use crate::multiswap::MultiSwapRecord;
use crate::swap::{AssetLeg, HashLock, SwapBook, SwapHeader, SwapRecord, SwapStatus};

/// Upper-case symbol of a group: `INDUSTRIAL_202010` -> `INDUSTRIAL`.
pub fn group_symbol(group: &str) -> String {
    group
        .split(GROUP_SEPARATOR)
        .next()
        .unwrap_or_default()
        .to_uppercase()
}

/// Home channel of a group: `INDUSTRIAL_202010` -> `industrial`.
pub fn home_channel(group: &str) -> String {
    group_symbol(group).to_lowercase()
}

/// Which way a batch of swap legs moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegDirection {
    Debit,
    Credit,
}

/// Channel description returned by the `metadata` query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Metadata {
    pub name: String,
    pub symbol: String,
    pub issuer: Option<Address>,
    pub nonce_ttl_ms: u64,
    pub swap_expiry_secs: u64,
    pub hash_algorithm: HashAlgorithm,
    pub groups: Vec<String>,
    pub initialized: bool,
}

/// The token chaincode of one channel.
#[derive(Debug)]
pub struct TokenChaincode {
    config: ChannelConfig,
    issuer: Option<Address>,
    ledger: Ledger,
    swaps: SwapBook<SwapRecord>,
    multiswaps: SwapBook<MultiSwapRecord>,
    initialized: Mutex<bool>,
}

impl TokenChaincode {
    pub fn new(config: ChannelConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let issuer = config.issuer_address()?;
        Ok(Self {
            ledger: Ledger::new(&config.name),
            issuer,
            swaps: SwapBook::new(),
            multiswaps: SwapBook::new(),
            initialized: Mutex::new(false),
            config,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn symbol(&self) -> &str {
        &self.config.symbol
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn swaps(&self) -> &SwapBook<SwapRecord> {
        &self.swaps
    }

    pub fn multiswaps(&self) -> &SwapBook<MultiSwapRecord> {
        &self.multiswaps
    }

    pub fn nonce_ttl(&self) -> Duration {
        self.config.nonce_ttl()
    }

    /// Balance map `group` lives in on this channel.
    pub fn balance_kind(&self, group: &str) -> BalanceKind {
        if home_channel(group) == self.name() {
            BalanceKind::Regular
        } else {
            BalanceKind::Allowed
        }
    }

    /// Debits or credits every leg for `owner` atomically, each on the
    /// balance map the home-channel rule selects.
    pub fn apply_legs(
        &self,
        owner: Address,
        legs: &[AssetLeg],
        direction: LegDirection,
    ) -> Result<(), ChaincodeError> {
        let postings: Vec<Posting> = legs
            .iter()
            .map(|leg| {
                let key = BalanceKey::new(self.balance_kind(&leg.group), owner, &leg.group);
                match direction {
                    LegDirection::Debit => Posting::Debit(key, leg.amount.clone()),
                    LegDirection::Credit => Posting::Credit(key, leg.amount.clone()),
                }
            })
            .collect();
        self.ledger.apply(&postings)?;
        Ok(())
    }

    fn require_issuer(&self, caller: Address) -> Result<(), ChaincodeError> {
        match self.issuer {
            Some(issuer) if issuer == caller => Ok(()),
            Some(_) => Err(ChaincodeError::Forbidden(format!(
                "{caller} is not the issuer of {}",
                self.symbol()
            ))),
            None => Err(ChaincodeError::Forbidden(format!(
                "channel {} has no issuer",
                self.name()
            ))),
        }
    }

    // -----------------------------------------------------------------------
    // Signed operations. The caller has already passed the gate.
    // -----------------------------------------------------------------------

    /// Issuer mints `amount` of the channel symbol to `to`.
    pub fn emit(&self, caller: Address, to: Address, amount: Amount) -> Result<(), ChaincodeError> {
        self.require_issuer(caller)?;
        positive(&amount)?;
        info!(channel = %self.name(), to = %to, %amount, "emitted");
        self.ledger.credit(to, self.symbol(), amount);
        Ok(())
    }

    /// Moves `amount` of the channel symbol from `caller` to `to`.
    pub fn transfer(
        &self,
        caller: Address,
        to: Address,
        amount: Amount,
    ) -> Result<(), ChaincodeError> {
        let symbol = self.symbol().to_string();
        self.transfer_group(caller, to, &symbol, amount)
    }

    /// Credits every configured group supply to the issuer. Runs once.
    pub fn initialize(&self, caller: Address) -> Result<(), ChaincodeError> {
        self.require_issuer(caller)?;
        let mut initialized = self.initialized.lock();
        if *initialized {
            return Err(ChaincodeError::InvalidState {
                kind: "channel",
                id: self.name().to_string(),
                current: "initialized".into(),
                expected: "uninitialized".into(),
            });
        }

        let mut postings = Vec::with_capacity(self.config.groups.len());
        for (suffix, supply) in &self.config.groups {
            let group = self.sub_group(suffix)?;
            let amount: Amount = supply.parse()?;
            postings.push(Posting::Credit(BalanceKey::regular(caller, &group), amount));
        }
        self.ledger.apply(&postings)?;
        *initialized = true;

        info!(channel = %self.name(), groups = postings.len(), "initialized");
        Ok(())
    }

    /// Moves `amount` of the sub-group `<SYMBOL>_<suffix>` from `caller` to
    /// `to`.
    pub fn transfer_industrial(
        &self,
        caller: Address,
        to: Address,
        suffix: &str,
        amount: Amount,
    ) -> Result<(), ChaincodeError> {
        let group = self.sub_group(suffix)?;
        self.transfer_group(caller, to, &group, amount)
    }

    fn transfer_group(
        &self,
        caller: Address,
        to: Address,
        group: &str,
        amount: Amount,
    ) -> Result<(), ChaincodeError> {
        positive(&amount)?;
        if caller == to {
            return Err(ChaincodeError::invalid_argument("cannot transfer to yourself"));
        }
        let kind = self.balance_kind(group);
        self.ledger.apply(&[
            Posting::Debit(BalanceKey::new(kind, caller, group), amount.clone()),
            Posting::Credit(BalanceKey::new(kind, to, group), amount.clone()),
        ])?;
        debug!(channel = %self.name(), from = %caller, to = %to, group, %amount, "transferred");
        Ok(())
    }

    fn sub_group(&self, suffix: &str) -> Result<String, ChaincodeError> {
        if suffix.is_empty() || suffix.contains(GROUP_SEPARATOR) {
            return Err(ChaincodeError::invalid_argument(format!(
                "invalid group suffix '{suffix}'"
            )));
        }
        Ok(format!("{}{GROUP_SEPARATOR}{suffix}", self.symbol()))
    }

    // -----------------------------------------------------------------------
    // Swap records
    // -----------------------------------------------------------------------

    /// Checks that a swap of `token` from this channel to `dest` touches the
    /// token's home channel.
    pub fn check_route(&self, token: &str, dest: &str) -> Result<(), ChaincodeError> {
        if dest == self.name() {
            return Err(ChaincodeError::invalid_argument(format!(
                "swap destination must differ from {}",
                self.name()
            )));
        }
        let home = home_channel(token);
        if home != self.name() && home != dest {
            return Err(ChaincodeError::invalid_argument(format!(
                "{} can only be swapped to or from its home channel {home}",
                token.to_uppercase()
            )));
        }
        Ok(())
    }

    /// Header of a new Pending record created on this channel.
    pub fn new_header(
        &self,
        tx_id: &str,
        created_at: DateTime<Utc>,
        dest: &str,
        creator: Address,
        hash_hex: &str,
    ) -> Result<SwapHeader, ChaincodeError> {
        let expiry = chrono::Duration::from_std(self.config.swap_expiry())
            .map_err(|e| ChaincodeError::invalid_argument(format!("swap expiry: {e}")))?;
        let expires_at = created_at.checked_add_signed(expiry).ok_or_else(|| {
            ChaincodeError::invalid_argument(format!(
                "swap expiry of {}s is out of range",
                self.config.swap_expiry_secs
            ))
        })?;
        Ok(SwapHeader {
            tx_id: tx_id.to_string(),
            source_channel: self.name().to_string(),
            dest_channel: dest.to_string(),
            hash_lock: HashLock::parse(hash_hex, self.config.hash_algorithm)?,
            status: SwapStatus::Pending,
            creator,
            created_at,
            expires_at,
        })
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Balance of the channel symbol.
    pub fn balance_of(&self, owner: Address) -> Amount {
        let symbol = self.symbol();
        self.ledger
            .get(&BalanceKey::new(self.balance_kind(symbol), owner, symbol))
    }

    /// Allowed balance of a foreign group on this channel.
    pub fn allowed_balance_of(&self, owner: Address, token: &str) -> Amount {
        self.ledger.allowed_query(owner, token)
    }

    /// Regular sub-group balances of the channel symbol, keyed by suffix.
    pub fn industrial_balance_of(&self, owner: Address) -> BTreeMap<String, Amount> {
        let prefix = format!("{}{GROUP_SEPARATOR}", self.symbol());
        self.ledger
            .balances_of(owner, BalanceKind::Regular)
            .into_iter()
            .filter_map(|(group, amount)| {
                group
                    .strip_prefix(&prefix)
                    .map(|suffix| (suffix.to_string(), amount))
            })
            .collect()
    }

    pub fn metadata(&self) -> Metadata {
        Metadata {
            name: self.name().to_string(),
            symbol: self.symbol().to_string(),
            issuer: self.issuer,
            nonce_ttl_ms: self.config.nonce_ttl_ms,
            swap_expiry_secs: self.config.swap_expiry_secs,
            hash_algorithm: self.config.hash_algorithm,
            groups: self.config.groups.keys().cloned().collect(),
            initialized: *self.initialized.lock(),
        }
    }
}

fn positive(amount: &Amount) -> Result<(), ChaincodeError> {
    if amount.is_zero() {
        Err(ChaincodeError::invalid_argument("amount must be positive"))
    } else {
        Ok(())
    }
}
