// Copyright (c) 2026 Channel Swap Ledger Contributors. MIT License.
// See LICENSE for details.

//! # Channel Swap Ledger Node
//!
//! Entry point for the `chanswap` binary. Parses CLI arguments, initializes
//! logging and dispatches to a subcommand:
//!
//! - `keygen`: generate a signer key
//! - `sign`: produce the signed wire arguments for one call
//! - `scenario`: run a swap and back-swap in-process with the expiry sweeper
//! - `version`: print build version information

mod cli;
mod logging;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, ensure, Context, Result};
use chrono::Utc;
use clap::Parser;
use serde::Serialize;
use tokio::signal;

use chanswap_contracts::{HashLock, InvokeResponse, Network, SwapRecord, SwapStatus};
use chanswap_protocol::auth::{Envelope, NonceSource};
use chanswap_protocol::config::{NetworkConfig, EXPIRY_SWEEP_INTERVAL, PROTOCOL_VERSION, SIGNING_ALGORITHM};
use chanswap_protocol::crypto::Keypair;
use chanswap_protocol::identity::Address;

use cli::{ChanswapCli, Commands};
use logging::LogFormat;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ChanswapCli::parse();
    logging::init_logging(&cli.log_level, LogFormat::from_str_lossy(&cli.log_format))?;

    match cli.command {
        Commands::Keygen(args) => keygen(args),
        Commands::Sign(args) => sign(args),
        Commands::Scenario(args) => run_scenario(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Key material as printed by `keygen`.
#[derive(Debug, Serialize)]
struct KeyInfo {
    secret_hex: String,
    public_key: String,
    address: Address,
}

fn keygen(args: cli::KeygenArgs) -> Result<()> {
    let keypair = Keypair::generate();
    let public_key = keypair.public_key();
    let info = KeyInfo {
        secret_hex: keypair.secret_hex(),
        public_key: public_key.to_base58(),
        address: Address::from_public_key(&public_key),
    };
    tracing::info!(address = %info.address, "keypair generated");

    if args.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("secret     : {}", info.secret_hex);
        println!("public key : {}", info.public_key);
        println!("address    : {}", info.address);
    }
    Ok(())
}

fn sign(args: cli::SignArgs) -> Result<()> {
    let keypair = Keypair::from_hex(&args.secret).context("invalid secret key")?;
    let chaincode = args.chaincode.as_deref().unwrap_or(&args.channel);
    let nonce = args.nonce.unwrap_or_else(|| NonceSource::new().next());

    let envelope = Envelope::sign(
        &keypair,
        &args.channel,
        chaincode,
        &args.method,
        args.args.clone(),
        nonce,
    );
    tracing::debug!(
        channel = %args.channel,
        method = %args.method,
        nonce,
        signer = %envelope.signer(),
        "signed"
    );
    println!("{}", serde_json::to_string(&envelope.to_wire())?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Scenario
// ---------------------------------------------------------------------------

/// Summary printed by `scenario`.
#[derive(Debug, Serialize)]
struct ScenarioReport {
    user: Address,
    token: String,
    forward_tx: String,
    back_tx: String,
    allowed_after_forward: String,
    balance_after_back: String,
    total_supply: String,
}

/// One signer with its own nonce sequence.
struct Signer {
    keypair: Keypair,
    nonces: NonceSource,
}

impl Signer {
    fn new(keypair: Keypair) -> Self {
        Self {
            keypair,
            nonces: NonceSource::new(),
        }
    }

    fn address(&self) -> Address {
        Address::from_public_key(&self.keypair.public_key())
    }

    fn register(&self, network: &Network) -> Result<()> {
        let pk = self.keypair.public_key().to_base58();
        match network.invoke("acl", "acl", "addUser", &[pk]) {
            Ok(_) => Ok(()),
            Err(err) if err.to_string().contains("already exists") => Ok(()),
            Err(err) => Err(err).context("acl/addUser failed"),
        }
    }

    fn invoke(
        &self,
        network: &Network,
        channel: &str,
        method: &str,
        args: &[&str],
    ) -> Result<InvokeResponse> {
        let args = args.iter().map(|a| a.to_string()).collect();
        let wire = Envelope::sign(&self.keypair, channel, channel, method, args, self.nonces.next())
            .to_wire();
        network
            .invoke(channel, channel, method, &wire)
            .with_context(|| format!("{channel}/{method} failed"))
    }
}

fn query<T: serde::de::DeserializeOwned>(
    network: &Network,
    channel: &str,
    method: &str,
    args: &[&str],
) -> Result<T> {
    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    let payload = network
        .query(channel, channel, method, &args)
        .with_context(|| format!("{channel}/{method} query failed"))?;
    serde_json::from_slice(&payload).context("unexpected query payload")
}

fn reveal(network: &Network, channel: &str, tx_id: &str, key: &str) -> Result<()> {
    network
        .invoke(channel, channel, "swapDone", &[tx_id.to_string(), key.to_string()])
        .with_context(|| format!("{channel}/swapDone failed"))?;
    Ok(())
}

async fn run_scenario(args: cli::ScenarioArgs) -> Result<()> {
    let (config, issuer) = match &args.config {
        Some(path) => {
            let config = NetworkConfig::from_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?;
            let Some(secret) = args.issuer_secret.as_deref() else {
                bail!("--issuer-secret is required with --config");
            };
            (config, Keypair::from_hex(secret).context("invalid issuer secret")?)
        }
        None => {
            let issuer = Keypair::generate();
            let address = Address::from_public_key(&issuer.public_key());
            (NetworkConfig::devnet(&address), issuer)
        }
    };

    let network = Arc::new(Network::from_config(&config).context("invalid network config")?);
    tracing::info!(channels = ?network.channel_names(), "network built");

    let every = args
        .sweep_interval_ms
        .map(Duration::from_millis)
        .unwrap_or(EXPIRY_SWEEP_INTERVAL);
    let sweeper = tokio::spawn(sweep_loop(Arc::clone(&network), every));

    let report = swap_round_trip(&network, Signer::new(issuer), &args)?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if args.wait {
        tracing::info!("scenario complete, sweeper running until Ctrl+C");
        shutdown_signal().await;
    }
    sweeper.abort();
    Ok(())
}

fn swap_round_trip(
    network: &Network,
    issuer: Signer,
    args: &cli::ScenarioArgs,
) -> Result<ScenarioReport> {
    let source = network.channel(&args.source)?;
    let dest = network.channel(&args.dest)?;
    let token = source.symbol().to_string();
    let lock = |alg| HashLock::from_preimage(args.key.as_bytes(), alg).to_hex();
    let (forward_hash, back_hash) = (
        lock(source.config().hash_algorithm),
        lock(dest.config().hash_algorithm),
    );

    let user = Signer::new(Keypair::generate());
    issuer.register(network)?;
    user.register(network)?;
    let user_addr = user.address().to_string();

    issuer.invoke(network, source.name(), "emit", &[&user_addr, &args.amount])?;
    let supply_before = network.total_supply(&token);

    // Forward: source regular -> dest allowed.
    let forward = user.invoke(
        network,
        source.name(),
        "swapBegin",
        &[&token, dest.name(), &args.amount, &forward_hash],
    )?;
    let pending: SwapRecord = query(network, dest.name(), "swapGet", &[&forward.tx_id])?;
    ensure!(
        pending.header.status == SwapStatus::Pending,
        "mirrored swap is {}",
        pending.header.status
    );
    reveal(network, dest.name(), &forward.tx_id, &args.key)?;
    let allowed: String = query(network, dest.name(), "allowedBalanceOf", &[&user_addr, &token])?;
    tracing::info!(tx_id = %forward.tx_id, %allowed, "forward swap done");

    // Back: dest allowed -> source regular.
    let back = user.invoke(
        network,
        dest.name(),
        "swapBegin",
        &[&token, source.name(), &args.amount, &back_hash],
    )?;
    reveal(network, source.name(), &back.tx_id, &args.key)?;
    let balance: String = query(network, source.name(), "balanceOf", &[&user_addr])?;
    tracing::info!(tx_id = %back.tx_id, %balance, "back swap done");

    let supply_after = network.total_supply(&token);
    ensure!(
        supply_before == supply_after,
        "supply of {token} changed from {supply_before} to {supply_after}"
    );

    Ok(ScenarioReport {
        user: user.address(),
        token,
        forward_tx: forward.tx_id,
        back_tx: back.tx_id,
        allowed_after_forward: allowed,
        balance_after_back: balance,
        total_supply: supply_after.to_string(),
    })
}

/// Cancels expired swaps on every tick.
async fn sweep_loop(network: Arc<Network>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let report = network.expire_swaps(Utc::now());
        if report.cancelled() > 0 {
            tracing::info!(
                swaps = report.swaps,
                multiswaps = report.multiswaps,
                "expired swaps refunded"
            );
        }
    }
}

/// Prints version information to stdout.
fn print_version() {
    println!("chanswap  {}", env!("CARGO_PKG_VERSION"));
    println!("protocol  {}", PROTOCOL_VERSION);
    println!("signing   {}", SIGNING_ALGORITHM);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
