//! Shared helpers for the chaincode integration tests.

#![allow(dead_code)]

use std::time::Duration;

use chanswap_contracts::{ChaincodeError, InvokeResponse, Network};
use chanswap_protocol::auth::{Envelope, NonceSource};
use chanswap_protocol::config::{ChannelConfig, NetworkConfig};
use chanswap_protocol::crypto::Keypair;
use chanswap_protocol::identity::Address;
use chrono::{DateTime, Utc};

/// Swap preimage used throughout the tests.
pub const KEY: &str = "12345";

/// SHA3-256 of [`KEY`].
pub const KEY_HASH: &str = "7d4e3eec80026719639ed4dba68916eb94c7a49a053e05c8f9578fe4e5a3d7ea";

/// A registered signer with its own nonce counter.
pub struct Client {
    pub keypair: Keypair,
    pub address: Address,
    nonces: NonceSource,
}

impl Client {
    /// Generates a key and registers it through the `acl` channel.
    pub fn new(network: &Network) -> Self {
        let client = Self::from_keypair(Keypair::generate());
        client.register(network);
        client
    }

    pub fn from_keypair(keypair: Keypair) -> Self {
        Self {
            address: Address::from_public_key(&keypair.public_key()),
            keypair,
            nonces: NonceSource::new(),
        }
    }

    /// `acl/addUser`, tolerating a key that is already registered.
    pub fn register(&self, network: &Network) {
        let pk = self.keypair.public_key().to_base58();
        match network.invoke("acl", "acl", "addUser", &[pk]) {
            Ok(_) => {}
            Err(err) if err.to_string().contains("already exists") => {}
            Err(err) => panic!("addUser failed: {err}"),
        }
    }

    pub fn addr(&self) -> String {
        self.address.to_string()
    }

    /// Signed wire arguments with the next nonce.
    pub fn sign(&self, channel: &str, method: &str, args: &[&str]) -> Vec<String> {
        self.sign_with_nonce(channel, method, args, self.nonces.next())
    }

    pub fn sign_with_nonce(
        &self,
        channel: &str,
        method: &str,
        args: &[&str],
        nonce: u64,
    ) -> Vec<String> {
        Envelope::sign(
            &self.keypair,
            channel,
            channel,
            method,
            args.iter().map(|a| a.to_string()).collect(),
            nonce,
        )
        .to_wire()
    }

    pub fn invoke(
        &self,
        network: &Network,
        channel: &str,
        method: &str,
        args: &[&str],
    ) -> Result<InvokeResponse, ChaincodeError> {
        network.invoke(channel, channel, method, &self.sign(channel, method, args))
    }

    pub fn invoke_at(
        &self,
        network: &Network,
        now: DateTime<Utc>,
        channel: &str,
        method: &str,
        args: &[&str],
    ) -> Result<InvokeResponse, ChaincodeError> {
        network.invoke_at(now, channel, channel, method, &self.sign(channel, method, args))
    }
}

/// Unsigned invoke (`swapDone`, `multiSwapDone`).
pub fn invoke_unsigned(
    network: &Network,
    channel: &str,
    method: &str,
    args: &[&str],
) -> Result<InvokeResponse, ChaincodeError> {
    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    network.invoke(channel, channel, method, &args)
}

/// Query payload as a string.
pub fn query(network: &Network, channel: &str, method: &str, args: &[&str]) -> String {
    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    let payload = network
        .query(channel, channel, method, &args)
        .unwrap_or_else(|e| panic!("{channel}/{method} failed: {e}"));
    String::from_utf8(payload).unwrap()
}

pub fn balance(network: &Network, channel: &str, who: &Client) -> String {
    query(network, channel, "balanceOf", &[&who.addr()])
}

pub fn allowed(network: &Network, channel: &str, who: &Client, token: &str) -> String {
    query(network, channel, "allowedBalanceOf", &[&who.addr(), token])
}

/// `fiat`, `cc` and `industrial` channels issued by a fresh key. `fiat_ttl`
/// sets the nonce window of the `fiat` channel.
pub fn setup(fiat_ttl: Duration) -> (Network, Client) {
    let issuer = Client::from_keypair(Keypair::generate());
    let config = NetworkConfig {
        channels: vec![
            ChannelConfig::new("fiat", "FIAT")
                .with_issuer(&issuer.address)
                .with_nonce_ttl(fiat_ttl),
            ChannelConfig::new("cc", "CC").with_issuer(&issuer.address),
            ChannelConfig::new("industrial", "INDUSTRIAL")
                .with_issuer(&issuer.address)
                .with_group("202010", 100)
                .with_group("202101", 100),
        ],
    };
    let network = Network::from_config(&config).unwrap();
    issuer.register(&network);
    (network, issuer)
}

/// JSON body of an invoke response.
pub fn payload_json(resp: &InvokeResponse) -> serde_json::Value {
    serde_json::from_slice(&resp.payload).unwrap()
}
