//! # Protocol Configuration & Constants
//!
//! Every magic number in the ledger lives here, together with the
//! per-channel configuration surface the chaincodes consume: nonce TTL,
//! swap expiry and the hash function used for swap hash locks.
//!
//! Configuration files are JSON. A network is a list of channels; each
//! channel runs exactly one token chaincode named after the channel.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::hash::HashAlgorithm;
use crate::identity::Address;
use crate::ledger::Amount;

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Semantic version of the ledger protocol.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Version tag mixed into every signing payload. Bump it whenever the
/// canonical envelope encoding changes so old signatures stop verifying.
pub const ENVELOPE_VERSION: u8 = 1;

/// Number of trailing arguments the signed envelope appends to the
/// business arguments: nonce, public key, signature.
pub const ENVELOPE_TRAILER_LEN: usize = 3;

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// Signature scheme for request envelopes.
pub const SIGNING_ALGORITHM: &str = "Ed25519";

/// Ed25519 secret key length in bytes.
pub const SIGNING_KEY_LENGTH: usize = 32;

/// Ed25519 public key length in bytes.
pub const VERIFYING_KEY_LENGTH: usize = 32;

/// Ed25519 signature length in bytes.
pub const SIGNATURE_LENGTH: usize = 64;

/// Output length of every supported hash function.
pub const HASH_OUTPUT_LENGTH: usize = 32;

// ---------------------------------------------------------------------------
// Chaincode Defaults
// ---------------------------------------------------------------------------

/// Default nonce TTL. Zero means strictly monotonic nonces.
pub const DEFAULT_NONCE_TTL: Duration = Duration::ZERO;

/// Default time a pending swap may wait for its preimage before it is
/// cancelled and refunded. Three hours.
pub const DEFAULT_SWAP_EXPIRY: Duration = Duration::from_secs(3 * 60 * 60);

/// Longest swap expiry a channel may configure. One year.
pub const MAX_SWAP_EXPIRY: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Default hash lock algorithm.
pub const DEFAULT_HASH_ALGORITHM: HashAlgorithm = HashAlgorithm::Sha3_256;

/// Separator between a token symbol and its group suffix
/// (`INDUSTRIAL_202010`).
pub const GROUP_SEPARATOR: char = '_';

/// Interval at which the node sweeps expired swaps.
pub const EXPIRY_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("duplicate channel name: {0}")]
    DuplicateChannel(String),

    #[error("channel {channel}: {reason}")]
    InvalidChannel { channel: String, reason: String },
}

// ---------------------------------------------------------------------------
// ChannelConfig
// ---------------------------------------------------------------------------

/// Configuration of one channel and the token chaincode it hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Channel name. Also the chaincode name. Normalized to lower case.
    pub name: String,

    /// Token symbol whose home is this channel (upper case).
    pub symbol: String,

    /// Address allowed to `emit` and `initialize`. Channels that only
    /// receive swapped value may leave it empty.
    #[serde(default)]
    pub issuer: Option<String>,

    /// Nonce tolerance window in milliseconds. Zero = strict monotonic.
    #[serde(default)]
    pub nonce_ttl_ms: u64,

    /// Swap expiry in seconds.
    #[serde(default = "default_swap_expiry_secs")]
    pub swap_expiry_secs: u64,

    /// Hash function for swap hash locks.
    #[serde(default = "default_hash_algorithm")]
    pub hash_algorithm: HashAlgorithm,

    /// Initial group supplies credited to the issuer by `initialize`,
    /// keyed by group suffix (`"202010" -> "100"`).
    #[serde(default)]
    pub groups: BTreeMap<String, String>,
}

fn default_swap_expiry_secs() -> u64 {
    DEFAULT_SWAP_EXPIRY.as_secs()
}

fn default_hash_algorithm() -> HashAlgorithm {
    DEFAULT_HASH_ALGORITHM
}

impl ChannelConfig {
    /// A channel with default TTL, expiry and hash algorithm.
    pub fn new(name: &str, symbol: &str) -> Self {
        Self {
            name: name.to_lowercase(),
            symbol: symbol.to_uppercase(),
            issuer: None,
            nonce_ttl_ms: DEFAULT_NONCE_TTL.as_millis() as u64,
            swap_expiry_secs: default_swap_expiry_secs(),
            hash_algorithm: DEFAULT_HASH_ALGORITHM,
            groups: BTreeMap::new(),
        }
    }

    /// Sets the issuer address.
    pub fn with_issuer(mut self, issuer: &Address) -> Self {
        self.issuer = Some(issuer.to_string());
        self
    }

    /// Sets the nonce TTL.
    pub fn with_nonce_ttl(mut self, ttl: Duration) -> Self {
        self.nonce_ttl_ms = ttl.as_millis() as u64;
        self
    }

    /// Sets the swap expiry.
    pub fn with_swap_expiry(mut self, expiry: Duration) -> Self {
        self.swap_expiry_secs = expiry.as_secs();
        self
    }

    /// Adds an initial group supply.
    pub fn with_group(mut self, suffix: &str, supply: u128) -> Self {
        self.groups.insert(suffix.to_string(), supply.to_string());
        self
    }

    pub fn nonce_ttl(&self) -> Duration {
        Duration::from_millis(self.nonce_ttl_ms)
    }

    pub fn swap_expiry(&self) -> Duration {
        Duration::from_secs(self.swap_expiry_secs)
    }

    /// Parsed issuer address, if one is configured.
    pub fn issuer_address(&self) -> Result<Option<Address>, ConfigError> {
        match self.issuer.as_deref() {
            None | Some("") => Ok(None),
            Some(raw) => raw
                .parse::<Address>()
                .map(Some)
                .map_err(|e| self.invalid(format!("bad issuer address: {e}"))),
        }
    }

    fn invalid(&self, reason: String) -> ConfigError {
        ConfigError::InvalidChannel {
            channel: self.name.clone(),
            reason,
        }
    }

    fn normalize(&mut self) {
        self.name = self.name.to_lowercase();
        self.symbol = self.symbol.to_uppercase();
    }

    /// Checks one channel. The channel must be the home of its symbol, so
    /// its name has to be the lower-cased symbol.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(self.invalid("empty channel name".into()));
        }
        if self.symbol.is_empty() || self.symbol.contains(GROUP_SEPARATOR) {
            return Err(self.invalid(format!("invalid symbol '{}'", self.symbol)));
        }
        if self.name != self.symbol.to_lowercase() {
            return Err(self.invalid(format!(
                "symbol '{}' does not belong to this channel",
                self.symbol
            )));
        }
        if self.swap_expiry_secs == 0 {
            return Err(self.invalid("swap expiry must be positive".into()));
        }
        if self.swap_expiry() > MAX_SWAP_EXPIRY {
            return Err(self.invalid(format!(
                "swap expiry {}s exceeds {}s",
                self.swap_expiry_secs,
                MAX_SWAP_EXPIRY.as_secs()
            )));
        }
        for (suffix, supply) in &self.groups {
            if suffix.is_empty() {
                return Err(self.invalid("empty group suffix".into()));
            }
            supply
                .parse::<Amount>()
                .map_err(|_| self.invalid(format!("group {suffix}: bad supply '{supply}'")))?;
        }
        self.issuer_address()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// NetworkConfig
// ---------------------------------------------------------------------------

/// The full set of channels a network hosts.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub channels: Vec<ChannelConfig>,
}

impl NetworkConfig {
    /// Parses and validates a JSON config document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let mut config: NetworkConfig = serde_json::from_str(json)?;
        for channel in &mut config.channels {
            channel.normalize();
        }
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Validates channel names are unique and every channel is well formed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for channel in &self.channels {
            if !seen.insert(channel.name.as_str()) {
                return Err(ConfigError::DuplicateChannel(channel.name.clone()));
            }
            channel.validate()?;
        }
        Ok(())
    }

    /// Looks up a channel by (case-insensitive) name.
    pub fn channel(&self, name: &str) -> Option<&ChannelConfig> {
        let name = name.to_lowercase();
        self.channels.iter().find(|c| c.name == name)
    }

    /// Devnet layout used when no config file is given: a strict-nonce
    /// `fiat` channel, a `cc` channel that receives swapped value, and an
    /// `industrial` channel with two vintage groups.
    pub fn devnet(issuer: &Address) -> Self {
        Self {
            channels: vec![
                ChannelConfig::new("fiat", "FIAT").with_issuer(issuer),
                ChannelConfig::new("cc", "CC").with_issuer(issuer),
                ChannelConfig::new("industrial", "INDUSTRIAL")
                    .with_issuer(issuer)
                    .with_group("202010", 100)
                    .with_group("202101", 100),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::Keypair;

    fn issuer() -> Address {
        Address::from_public_key(&Keypair::generate().public_key())
    }

    #[test]
    fn test_crypto_parameter_sizes() {
        assert_eq!(SIGNING_KEY_LENGTH, 32);
        assert_eq!(VERIFYING_KEY_LENGTH, 32);
        assert_eq!(SIGNATURE_LENGTH, 64);
        assert_eq!(HASH_OUTPUT_LENGTH, 32);
    }

    #[test]
    fn test_defaults_sanity() {
        assert_eq!(DEFAULT_NONCE_TTL, Duration::ZERO);
        assert!(DEFAULT_SWAP_EXPIRY > EXPIRY_SWEEP_INTERVAL);
        assert!(DEFAULT_SWAP_EXPIRY < MAX_SWAP_EXPIRY);
    }

    #[test]
    fn parse_minimal_channel_applies_defaults() {
        let config = NetworkConfig::from_json(r#"{"channels":[{"name":"FIAT","symbol":"fiat"}]}"#)
            .unwrap();
        let fiat = config.channel("fiat").unwrap();
        assert_eq!(fiat.name, "fiat");
        assert_eq!(fiat.symbol, "FIAT");
        assert_eq!(fiat.nonce_ttl(), Duration::ZERO);
        assert_eq!(fiat.swap_expiry(), DEFAULT_SWAP_EXPIRY);
        assert_eq!(fiat.hash_algorithm, HashAlgorithm::Sha3_256);
    }

    #[test]
    fn duplicate_channels_rejected() {
        let json = r#"{"channels":[{"name":"cc","symbol":"CC"},{"name":"CC","symbol":"CC"}]}"#;
        assert!(matches!(
            NetworkConfig::from_json(json),
            Err(ConfigError::DuplicateChannel(name)) if name == "cc"
        ));
    }

    #[test]
    fn symbol_with_separator_rejected() {
        let json = r#"{"channels":[{"name":"it","symbol":"IT_1"}]}"#;
        assert!(matches!(
            NetworkConfig::from_json(json),
            Err(ConfigError::InvalidChannel { .. })
        ));
    }

    #[test]
    fn symbol_must_name_the_channel() {
        let json = r#"{"channels":[{"name":"fiat","symbol":"USD"}]}"#;
        let err = NetworkConfig::from_json(json).unwrap_err();
        assert!(err.to_string().contains("does not belong"));
        assert!(ChannelConfig::new("fiat", "USD").validate().is_err());
        ChannelConfig::new("fiat", "fiat").validate().unwrap();
    }

    #[test]
    fn swap_expiry_is_bounded() {
        let huge = ChannelConfig::new("fiat", "FIAT")
            .with_swap_expiry(Duration::from_secs(10_000_000_000_000));
        assert!(matches!(
            huge.validate(),
            Err(ConfigError::InvalidChannel { .. })
        ));
        ChannelConfig::new("fiat", "FIAT")
            .with_swap_expiry(MAX_SWAP_EXPIRY)
            .validate()
            .unwrap();
    }

    #[test]
    fn group_supply_may_exceed_u128() {
        let json = r#"{"channels":[{"name":"it","symbol":"IT","groups":{"1":"340282366920938463463374607431768211456"}}]}"#;
        NetworkConfig::from_json(json).unwrap();
    }

    #[test]
    fn bad_group_supply_rejected() {
        let json = r#"{"channels":[{"name":"it","symbol":"IT","groups":{"202010":"lots"}}]}"#;
        assert!(NetworkConfig::from_json(json).is_err());
    }

    #[test]
    fn bad_issuer_rejected() {
        let json = r#"{"channels":[{"name":"fiat","symbol":"FIAT","issuer":"not-an-address"}]}"#;
        assert!(NetworkConfig::from_json(json).is_err());
    }

    #[test]
    fn devnet_is_valid_and_round_trips() {
        let config = NetworkConfig::devnet(&issuer());
        config.validate().unwrap();
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(NetworkConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("network.json");
        std::fs::write(
            &path,
            r#"{"channels":[{"name":"fiat","symbol":"FIAT","nonce_ttl_ms":500}]}"#,
        )
        .unwrap();
        let config = NetworkConfig::from_file(&path).unwrap();
        assert_eq!(
            config.channel("FIAT").unwrap().nonce_ttl(),
            Duration::from_millis(500)
        );
    }

    #[test]
    fn missing_file_reports_path() {
        let err = NetworkConfig::from_file("/definitely/not/here.json").unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.json"));
    }
}
