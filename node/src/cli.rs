//! # CLI Interface
//!
//! Defines the command-line argument structure for `chanswap` using `clap`
//! derive. Supports four subcommands: `keygen`, `sign`, `scenario` and
//! `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Channel swap ledger command-line node.
///
/// Generates keys, signs chaincode arguments for the nonce gate and runs the
/// fiat/cc swap scenario against an in-process network.
#[derive(Parser, Debug)]
#[command(
    name = "chanswap",
    about = "Channel swap ledger command-line node",
    version,
    propagate_version = true
)]
pub struct ChanswapCli {
    /// Default log filter when `RUST_LOG` is not set.
    #[arg(
        long,
        global = true,
        env = "CHANSWAP_LOG",
        default_value = "chanswap=info,chanswap_contracts=info,chanswap_protocol=warn"
    )]
    pub log_level: String,

    /// Log output format: `pretty` or `json`.
    #[arg(long, global = true, env = "CHANSWAP_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the `chanswap` binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate a keypair and print its secret, public key and address.
    Keygen(KeygenArgs),
    /// Sign a chaincode call and print the wire argument list as JSON.
    Sign(SignArgs),
    /// Run the fiat -> cc swap and back-swap against an in-process network.
    Scenario(ScenarioArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `keygen` subcommand.
#[derive(Parser, Debug)]
pub struct KeygenArgs {
    /// Print the key as a JSON object instead of plain lines.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `sign` subcommand.
#[derive(Parser, Debug)]
pub struct SignArgs {
    /// Hex-encoded Ed25519 secret key of the signer.
    ///
    /// **Never pass this flag on a shared machine**; prefer the environment
    /// variable.
    #[arg(long, env = "CHANSWAP_SECRET", hide_env_values = true)]
    pub secret: String,

    /// Channel the call is addressed to.
    #[arg(long)]
    pub channel: String,

    /// Chaincode name. Defaults to the channel name.
    #[arg(long)]
    pub chaincode: Option<String>,

    /// Method name, e.g. `swapBegin`.
    #[arg(long)]
    pub method: String,

    /// Explicit nonce. Defaults to the current time in milliseconds.
    #[arg(long)]
    pub nonce: Option<u64>,

    /// Business arguments, in order.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

/// Arguments for the `scenario` subcommand.
#[derive(Parser, Debug)]
pub struct ScenarioArgs {
    /// Path to the network configuration file (JSON).
    ///
    /// When omitted, a devnet with `fiat`, `cc` and `industrial` channels is
    /// built around a freshly generated issuer.
    #[arg(long, short = 'c', env = "CHANSWAP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Hex-encoded secret key of the configured issuer. Required with
    /// `--config`.
    #[arg(long, env = "CHANSWAP_ISSUER_SECRET", hide_env_values = true)]
    pub issuer_secret: Option<String>,

    /// Channel the token is swapped out of.
    #[arg(long, default_value = "fiat")]
    pub source: String,

    /// Channel the token is swapped into.
    #[arg(long, default_value = "cc")]
    pub dest: String,

    /// Amount to emit and swap.
    #[arg(long, default_value = "1")]
    pub amount: String,

    /// Swap preimage.
    #[arg(long, default_value = "12345")]
    pub key: String,

    /// Interval of the background expiry sweep, in milliseconds.
    #[arg(long, env = "CHANSWAP_SWEEP_INTERVAL_MS")]
    pub sweep_interval_ms: Option<u64>,

    /// Keep the network and its expiry sweeper running until Ctrl+C.
    #[arg(long)]
    pub wait: bool,
}
