//! # Channel Network
//!
//! A [`Network`] hosts every channel of one deployment, the shared key
//! registry and the auth gate. It is the only entry point clients use:
//!
//! - [`Network::invoke`]: mutating calls. Signed methods go through the
//!   gate first; `swapDone`/`multiSwapDone` are authorized by the preimage.
//! - [`Network::query`]: read-only calls. No nonce is consumed.
//!
//! Every invoke is assigned a transaction id and a timestamp before it runs.
//! A swap's source and destination copies are committed from that one
//! ordered transaction.
//!
//! The reserved `acl` channel exposes the key registry (`addUser`,
//! `checkKeys`).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chanswap_protocol::auth::{AuthGate, Envelope};
use chanswap_protocol::config::{ChannelConfig, ConfigError, NetworkConfig};
use chanswap_protocol::crypto::PublicKey;
use chanswap_protocol::identity::{Address, KeyRegistry, RegistryError};
use chanswap_protocol::ledger::{Amount, BalanceKind};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::ChaincodeError;
use crate::method::{Access, Method};
use crate::multiswap::{AssetsArg, MultiSwapRecord};
use crate::swap::{Swap, SwapCoordinator, SwapRecord};
use crate::token::{home_channel, TokenChaincode};

/// Name of the channel (and chaincode) that fronts the key registry.
pub const ACL_CHANNEL: &str = "acl";

/// Identity of one ordered transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxContext {
    pub tx_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Result of a successful invoke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeResponse {
    pub tx_id: String,
    pub payload: Vec<u8>,
}

/// Payload of `acl/checkKeys`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AclEntry {
    pub address: Address,
    /// Base58.
    pub public_key: String,
    pub registered_at: DateTime<Utc>,
}

/// Outcome of one expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub swaps: usize,
    pub multiswaps: usize,
    pub failed: usize,
}

impl SweepReport {
    pub fn cancelled(&self) -> usize {
        self.swaps + self.multiswaps
    }
}

/// All channels of a deployment plus the shared registry and gate.
#[derive(Debug)]
pub struct Network {
    channels: HashMap<String, Arc<TokenChaincode>>,
    registry: Arc<KeyRegistry>,
    gate: AuthGate,
    coordinator: SwapCoordinator,
    seq: AtomicU64,
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

impl Network {
    /// An empty network with a fresh key registry.
    pub fn new() -> Self {
        let registry = Arc::new(KeyRegistry::new());
        Self {
            channels: HashMap::new(),
            gate: AuthGate::new(Arc::clone(&registry)),
            registry,
            coordinator: SwapCoordinator::new(),
            seq: AtomicU64::new(0),
        }
    }

    /// Builds every channel of `config`.
    pub fn from_config(config: &NetworkConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut network = Self::new();
        for channel in &config.channels {
            network.add_channel(channel.clone())?;
        }
        info!(channels = network.channels.len(), "network ready");
        Ok(network)
    }

    /// Adds one channel and its token chaincode.
    pub fn add_channel(
        &mut self,
        config: ChannelConfig,
    ) -> Result<Arc<TokenChaincode>, ConfigError> {
        let name = config.name.to_lowercase();
        if name == ACL_CHANNEL {
            return Err(ConfigError::InvalidChannel {
                channel: name,
                reason: "name is reserved".into(),
            });
        }
        if self.channels.contains_key(&name) {
            return Err(ConfigError::DuplicateChannel(name));
        }
        let chaincode = Arc::new(TokenChaincode::new(config)?);
        self.channels.insert(name, Arc::clone(&chaincode));
        Ok(chaincode)
    }

    pub fn registry(&self) -> &Arc<KeyRegistry> {
        &self.registry
    }

    pub fn gate(&self) -> &AuthGate {
        &self.gate
    }

    /// Looks up a channel by (case-insensitive) name.
    pub fn channel(&self, name: &str) -> Result<&Arc<TokenChaincode>, ChaincodeError> {
        self.channels
            .get(&name.to_lowercase())
            .ok_or_else(|| ChaincodeError::UnknownChannel(name.to_string()))
    }

    /// Channel names in sorted order.
    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.keys().cloned().collect();
        names.sort();
        names
    }

    /// Registers a public key directly, bypassing the `acl` channel.
    pub fn add_user(&self, public_key: &PublicKey) -> Result<Address, ChaincodeError> {
        Ok(self.registry.add_user(public_key)?)
    }

    // -----------------------------------------------------------------------
    // Invoke
    // -----------------------------------------------------------------------

    /// Runs a mutating method at the current time.
    pub fn invoke(
        &self,
        channel: &str,
        chaincode: &str,
        method: &str,
        args: &[String],
    ) -> Result<InvokeResponse, ChaincodeError> {
        self.invoke_at(Utc::now(), channel, chaincode, method, args)
    }

    /// Runs a mutating method with `now` as the transaction timestamp.
    pub fn invoke_at(
        &self,
        now: DateTime<Utc>,
        channel: &str,
        chaincode: &str,
        method: &str,
        args: &[String],
    ) -> Result<InvokeResponse, ChaincodeError> {
        let ctx = self.next_tx(channel, method, now);
        let result = if channel.eq_ignore_ascii_case(ACL_CHANNEL) {
            self.invoke_acl(chaincode, method, args)
        } else {
            self.invoke_token(&ctx, channel, chaincode, method, args)
        };

        match result {
            Ok(payload) => {
                debug!(channel, method, tx_id = %ctx.tx_id, "invoke committed");
                Ok(InvokeResponse {
                    tx_id: ctx.tx_id,
                    payload,
                })
            }
            Err(err) => {
                warn!(channel, method, tx_id = %ctx.tx_id, kind = %err.kind(), %err, "invoke rejected");
                Err(err)
            }
        }
    }

    fn invoke_token(
        &self,
        ctx: &TxContext,
        channel: &str,
        chaincode: &str,
        method: &str,
        args: &[String],
    ) -> Result<Vec<u8>, ChaincodeError> {
        let cc = self.chaincode(channel, chaincode, method)?;
        let m = resolve(cc, method)?;

        match m.access() {
            Access::Query => Err(ChaincodeError::UnknownMethod {
                chaincode: cc.name().to_string(),
                method: format!("{m} (query only)"),
            }),
            Access::UnsignedInvoke => {
                let args = m.args(args).map_err(ChaincodeError::InvalidArgument)?;
                let (tx_id, preimage) = (&args[0], args[1].as_bytes());
                match m {
                    Method::SwapDone => self.done::<SwapRecord>(cc, tx_id, preimage, ctx.timestamp),
                    _ => self.done::<MultiSwapRecord>(cc, tx_id, preimage, ctx.timestamp),
                }
            }
            Access::SignedInvoke => {
                let envelope = Envelope::from_wire(channel, chaincode, method, args)?;
                self.gate.authorize(&envelope, cc.nonce_ttl(), |auth| {
                    self.apply_signed(ctx, cc, m, &envelope.args, auth.signer)
                })
            }
        }
    }

    fn apply_signed(
        &self,
        ctx: &TxContext,
        cc: &TokenChaincode,
        method: Method,
        args: &[String],
        caller: Address,
    ) -> Result<Vec<u8>, ChaincodeError> {
        let args = method.args(args).map_err(ChaincodeError::InvalidArgument)?;
        match method {
            Method::Emit => {
                cc.emit(caller, args[0].parse()?, args[1].parse()?)?;
                Ok(Vec::new())
            }
            Method::Transfer => {
                cc.transfer(caller, args[0].parse()?, args[1].parse()?)?;
                debug!(channel = %cc.name(), reference = %args[2], "transfer reference");
                Ok(Vec::new())
            }
            Method::Initialize => {
                cc.initialize(caller)?;
                Ok(Vec::new())
            }
            Method::TransferIndustrial => {
                cc.transfer_industrial(caller, args[0].parse()?, &args[1], args[2].parse()?)?;
                debug!(channel = %cc.name(), reference = %args[3], "transfer reference");
                Ok(Vec::new())
            }
            Method::SwapBegin => {
                let (token, dest, amount, hash) = (&args[0], &args[1], &args[2], &args[3]);
                let record = self.swap_begin(ctx, cc, caller, token, dest, amount, hash)?;
                Ok(serde_json::to_vec(&record)?)
            }
            Method::MultiSwapBegin => {
                let (token, assets, dest, hash) = (&args[0], &args[1], &args[2], &args[3]);
                let record = self.multiswap_begin(ctx, cc, caller, token, assets, dest, hash)?;
                Ok(serde_json::to_vec(&record)?)
            }
            Method::SwapCancel => {
                let record = self.cancel::<SwapRecord>(cc, caller, &args[0], ctx.timestamp)?;
                Ok(serde_json::to_vec(&record)?)
            }
            Method::MultiSwapCancel => {
                let record = self.cancel::<MultiSwapRecord>(cc, caller, &args[0], ctx.timestamp)?;
                Ok(serde_json::to_vec(&record)?)
            }
            other => Err(ChaincodeError::UnknownMethod {
                chaincode: cc.name().to_string(),
                method: other.to_string(),
            }),
        }
    }

    fn invoke_acl(
        &self,
        chaincode: &str,
        method: &str,
        args: &[String],
    ) -> Result<Vec<u8>, ChaincodeError> {
        self.acl_chaincode(chaincode, method)?;
        if !method.eq_ignore_ascii_case("addUser") {
            return Err(unknown_acl(method));
        }
        let [public_key, ..] = args else {
            return Err(ChaincodeError::invalid_argument(
                "addUser takes a base58 public key",
            ));
        };
        let address = self.add_user(&parse_public_key(public_key)?)?;
        info!(%address, "user added");
        Ok(serde_json::to_vec(&address)?)
    }

    // -----------------------------------------------------------------------
    // Swaps
    // -----------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    fn swap_begin(
        &self,
        ctx: &TxContext,
        source: &TokenChaincode,
        creator: Address,
        token: &str,
        dest: &str,
        amount: &str,
        hash_hex: &str,
    ) -> Result<SwapRecord, ChaincodeError> {
        let group = token.to_uppercase();
        let amount: Amount = amount.parse()?;
        if amount.is_zero() {
            return Err(ChaincodeError::invalid_argument("amount must be positive"));
        }
        let dest = self.channel(dest)?;
        source.check_route(&group, dest.name())?;

        let header = source.new_header(&ctx.tx_id, ctx.timestamp, dest.name(), creator, hash_hex)?;
        let record = SwapRecord {
            header,
            asset_group: group,
            amount,
        };
        self.coordinator.begin(source, dest, record)
    }

    #[allow(clippy::too_many_arguments)]
    fn multiswap_begin(
        &self,
        ctx: &TxContext,
        source: &TokenChaincode,
        creator: Address,
        token: &str,
        assets: &str,
        dest: &str,
        hash_hex: &str,
    ) -> Result<MultiSwapRecord, ChaincodeError> {
        let legs = AssetsArg::parse(assets, token)?;
        let dest = self.channel(dest)?;
        source.check_route(token, dest.name())?;

        let header = source.new_header(&ctx.tx_id, ctx.timestamp, dest.name(), creator, hash_hex)?;
        let record = MultiSwapRecord {
            header,
            token: token.to_uppercase(),
            assets: legs,
        };
        self.coordinator.begin(source, dest, record)
    }

    fn done<R: Swap>(
        &self,
        dest: &TokenChaincode,
        tx_id: &str,
        preimage: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Vec<u8>, ChaincodeError> {
        let current = R::book(dest).get(tx_id)?;
        let header = current.header();
        if header.dest_channel != dest.name() {
            return Err(ChaincodeError::invalid_argument(format!(
                "{} {tx_id} completes on {}, not {}",
                R::KIND,
                header.dest_channel,
                dest.name()
            )));
        }
        let source = self.channel(&header.source_channel)?;
        let record = self.coordinator.done::<R>(dest, source, tx_id, preimage, now)?;
        Ok(serde_json::to_vec(&record)?)
    }

    fn cancel<R: Swap>(
        &self,
        source: &TokenChaincode,
        caller: Address,
        tx_id: &str,
        now: DateTime<Utc>,
    ) -> Result<R, ChaincodeError> {
        let current = R::book(source).get(tx_id)?;
        let header = current.header();
        if header.source_channel != source.name() {
            return Err(ChaincodeError::invalid_argument(format!(
                "{} {tx_id} is cancelled on {}, not {}",
                R::KIND,
                header.source_channel,
                source.name()
            )));
        }
        if header.creator != caller {
            return Err(ChaincodeError::Forbidden(format!(
                "only the creator may cancel {} {tx_id}",
                R::KIND
            )));
        }
        let dest = self.channel(&header.dest_channel)?;
        self.coordinator.cancel::<R>(source, dest, tx_id, now)
    }

    /// Cancels every Pending swap and multiswap that has expired at `now`,
    /// refunding the creators on the source channels.
    pub fn expire_swaps(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        for source in self.channels.values() {
            let (ok, failed) = self.sweep::<SwapRecord>(source, now);
            report.swaps += ok;
            report.failed += failed;
            let (ok, failed) = self.sweep::<MultiSwapRecord>(source, now);
            report.multiswaps += ok;
            report.failed += failed;
        }
        if report.cancelled() > 0 || report.failed > 0 {
            info!(
                swaps = report.swaps,
                multiswaps = report.multiswaps,
                failed = report.failed,
                "expiry sweep"
            );
        }
        report
    }

    fn sweep<R: Swap>(&self, source: &TokenChaincode, now: DateTime<Utc>) -> (usize, usize) {
        let (mut ok, mut failed) = (0, 0);
        for tx_id in R::book(source).expired_from(source.name(), now) {
            let result = R::book(source)
                .get(&tx_id)
                .and_then(|rec| self.channel(&rec.header().dest_channel).cloned())
                .and_then(|dest| self.coordinator.cancel::<R>(source, &dest, &tx_id, now));
            match result {
                Ok(_) => ok += 1,
                // A concurrent done may win the race; the record is then terminal.
                Err(ChaincodeError::InvalidState { .. }) => {}
                Err(err) => {
                    warn!(kind = R::KIND, tx_id = %tx_id, %err, "expiry cancel failed");
                    failed += 1;
                }
            }
        }
        (ok, failed)
    }

    // -----------------------------------------------------------------------
    // Query
    // -----------------------------------------------------------------------

    /// Runs a read-only method and returns its JSON payload.
    pub fn query(
        &self,
        channel: &str,
        chaincode: &str,
        method: &str,
        args: &[String],
    ) -> Result<Vec<u8>, ChaincodeError> {
        if channel.eq_ignore_ascii_case(ACL_CHANNEL) {
            return self.query_acl(chaincode, method, args);
        }

        let cc = self.chaincode(channel, chaincode, method)?;
        let m = resolve(cc, method)?;
        if m.access() != Access::Query {
            return Err(ChaincodeError::UnknownMethod {
                chaincode: cc.name().to_string(),
                method: format!("{m} (invoke only)"),
            });
        }
        let args = m.args(args).map_err(ChaincodeError::InvalidArgument)?;

        let payload = match m {
            Method::BalanceOf => serde_json::to_vec(&cc.balance_of(args[0].parse()?))?,
            Method::AllowedBalanceOf => {
                serde_json::to_vec(&cc.allowed_balance_of(args[0].parse()?, &args[1]))?
            }
            Method::IndustrialBalanceOf => {
                serde_json::to_vec(&cc.industrial_balance_of(args[0].parse()?))?
            }
            Method::SwapGet => serde_json::to_vec(&cc.swaps().get(&args[0])?)?,
            Method::MultiSwapGet => serde_json::to_vec(&cc.multiswaps().get(&args[0])?)?,
            _ => serde_json::to_vec(&cc.metadata())?,
        };
        Ok(payload)
    }

    fn query_acl(
        &self,
        chaincode: &str,
        method: &str,
        args: &[String],
    ) -> Result<Vec<u8>, ChaincodeError> {
        self.acl_chaincode(chaincode, method)?;
        if !method.eq_ignore_ascii_case("checkKeys") {
            return Err(unknown_acl(method));
        }
        let [public_key, ..] = args else {
            return Err(ChaincodeError::invalid_argument(
                "checkKeys takes a base58 public key",
            ));
        };
        let public_key = parse_public_key(public_key)?;
        let address = self.registry.check_keys(&public_key)?;
        let registration = self
            .registry
            .registration(&address)
            .ok_or(RegistryError::UnknownAddress(address))?;
        Ok(serde_json::to_vec(&AclEntry {
            address,
            public_key: registration.public_key.to_base58(),
            registered_at: registration.registered_at,
        })?)
    }

    // -----------------------------------------------------------------------
    // Audit
    // -----------------------------------------------------------------------

    /// Total value of `group` across the network: regular balances on its
    /// home channel, allowed balances everywhere else and amounts escrowed
    /// by Pending swaps on their source channel.
    pub fn total_supply(&self, group: &str) -> Amount {
        let group = group.to_uppercase();
        let home = home_channel(&group);
        let mut total = Amount::ZERO;

        for cc in self.channels.values() {
            let kind = if cc.name() == home {
                BalanceKind::Regular
            } else {
                BalanceKind::Allowed
            };
            total += &cc.ledger().group_total(kind, &group);

            let escrowed = cc
                .swaps()
                .escrowed_from(cc.name())
                .into_iter()
                .chain(cc.multiswaps().escrowed_from(cc.name()))
                .filter(|leg| leg.group == group);
            for leg in escrowed {
                total += &leg.amount;
            }
        }
        total
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn next_tx(&self, channel: &str, method: &str, now: DateTime<Utc>) -> TxContext {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let mut hasher = Sha256::new();
        hasher.update(channel.to_lowercase().as_bytes());
        hasher.update(method.as_bytes());
        hasher.update(seq.to_le_bytes());
        hasher.update(now.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
        TxContext {
            tx_id: hex::encode(hasher.finalize()),
            timestamp: now,
        }
    }

    fn chaincode(
        &self,
        channel: &str,
        chaincode: &str,
        method: &str,
    ) -> Result<&Arc<TokenChaincode>, ChaincodeError> {
        let cc = self.channel(channel)?;
        if !chaincode.eq_ignore_ascii_case(cc.name()) {
            return Err(ChaincodeError::UnknownMethod {
                chaincode: chaincode.to_string(),
                method: method.to_string(),
            });
        }
        Ok(cc)
    }

    fn acl_chaincode(&self, chaincode: &str, method: &str) -> Result<(), ChaincodeError> {
        if chaincode.eq_ignore_ascii_case(ACL_CHANNEL) {
            Ok(())
        } else {
            Err(ChaincodeError::UnknownMethod {
                chaincode: chaincode.to_string(),
                method: method.to_string(),
            })
        }
    }
}

fn resolve(cc: &TokenChaincode, method: &str) -> Result<Method, ChaincodeError> {
    method
        .parse::<Method>()
        .map_err(|_| ChaincodeError::UnknownMethod {
            chaincode: cc.name().to_string(),
            method: method.to_string(),
        })
}

fn unknown_acl(method: &str) -> ChaincodeError {
    ChaincodeError::UnknownMethod {
        chaincode: ACL_CHANNEL.to_string(),
        method: method.to_string(),
    }
}

fn parse_public_key(raw: &str) -> Result<PublicKey, ChaincodeError> {
    PublicKey::from_base58(raw)
        .map_err(|e| ChaincodeError::invalid_argument(format!("public key: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use chanswap_protocol::crypto::Keypair;

    fn network() -> (Network, Keypair) {
        let issuer = Keypair::generate();
        let address = Address::from_public_key(&issuer.public_key());
        let network = Network::from_config(&NetworkConfig::devnet(&address)).unwrap();
        network.add_user(&issuer.public_key()).unwrap();
        (network, issuer)
    }

    #[test]
    fn devnet_channels() {
        let (network, _) = network();
        assert_eq!(network.channel_names(), vec!["cc", "fiat", "industrial"]);
        assert!(network.channel("FIAT").is_ok());
        assert_eq!(
            network.channel("nope").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn acl_channel_is_reserved() {
        let mut network = Network::new();
        assert!(network.add_channel(ChannelConfig::new("acl", "ACL")).is_err());
        network.add_channel(ChannelConfig::new("fiat", "FIAT")).unwrap();
        assert!(matches!(
            network.add_channel(ChannelConfig::new("FIAT", "FIAT")),
            Err(ConfigError::DuplicateChannel(_))
        ));
    }

    #[test]
    fn acl_add_user_and_check_keys() {
        let network = Network::new();
        let kp = Keypair::generate();
        let pk = kp.public_key().to_base58();

        network.invoke("acl", "acl", "addUser", &[pk.clone()]).unwrap();
        let err = network.invoke("acl", "acl", "addUser", &[pk.clone()]).unwrap_err();
        assert!(err.to_string().contains("already exists"));

        let payload = network.query("acl", "acl", "checkKeys", &[pk.clone()]).unwrap();
        let entry: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(
            entry["address"],
            Address::from_public_key(&kp.public_key()).to_string()
        );
        assert_eq!(entry["public_key"], pk);
        assert!(entry["registered_at"].is_string());
    }

    #[test]
    fn tx_ids_are_unique() {
        let network = Network::new();
        let now = Utc::now();
        let a = network.next_tx("fiat", "emit", now);
        let b = network.next_tx("fiat", "emit", now);
        assert_ne!(a.tx_id, b.tx_id);
        assert_eq!(a.tx_id.len(), 64);
    }

    #[test]
    fn query_rejects_invoke_methods_and_vice_versa() {
        let (network, _) = network();
        let err = network.query("fiat", "fiat", "emit", &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = network.invoke("fiat", "fiat", "metadata", &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = network.query("fiat", "cc", "metadata", &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn metadata_query() {
        let (network, _) = network();
        let payload = network.query("INDUSTRIAL", "industrial", "metadata", &[]).unwrap();
        let meta: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(meta["symbol"], "INDUSTRIAL");
        assert_eq!(meta["hash_algorithm"], "sha3-256");
        assert_eq!(meta["groups"], serde_json::json!(["202010", "202101"]));
    }

    #[test]
    fn unsigned_invoke_of_signed_method_is_auth_error() {
        let (network, issuer) = network();
        let to = Address::from_public_key(&issuer.public_key()).to_string();
        let err = network
            .invoke("fiat", "fiat", "emit", &[to, "1".into()])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
    }
}
