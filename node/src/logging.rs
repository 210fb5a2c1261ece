//! Log setup for the `chanswap` binary.
//!
//! Every record goes to stderr. Stdout is reserved for the JSON documents
//! printed by `keygen`, `sign` and `scenario`, so a run can be piped into
//! `jq` while the ledger trace scrolls past on the terminal.

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Filter used when `--log-level` is left at its default and `RUST_LOG` is unset.
pub const DEFAULT_DIRECTIVES: &str = "info";

/// How trace records are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Coloured, one event per line, with the source location of each posting.
    Pretty,
    /// One JSON object per event. Swap and nonce fields stay machine readable.
    Json,
}

impl LogFormat {
    /// Maps the `--log-format` flag. Anything other than `json` falls back
    /// to [`LogFormat::Pretty`].
    pub fn from_str_lossy(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }

    fn layer<S>(self) -> Box<dyn Layer<S> + Send + Sync>
    where
        S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    {
        match self {
            LogFormat::Pretty => fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .boxed(),
            LogFormat::Json => fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(false)
                .boxed(),
        }
    }
}

/// Picks the directives the subscriber filters on.
///
/// `RUST_LOG` wins when present and parseable. Otherwise `fallback` is used,
/// and an empty fallback means [`DEFAULT_DIRECTIVES`].
fn directives(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let fallback = fallback.trim();
        EnvFilter::new(if fallback.is_empty() {
            DEFAULT_DIRECTIVES
        } else {
            fallback
        })
    })
}

/// Installs the process-wide subscriber for a `chanswap` run.
///
/// # Arguments
///
/// * `default_level` - Directives from `--log-level`, for example
///   `chanswap_contracts=debug,chanswap_protocol=info` to follow swap
///   legs without the per-balance noise.
/// * `format` - Rendering chosen with `--log-format`.
///
/// # Errors
///
/// Fails if a subscriber was already installed in this process.
pub fn init_logging(default_level: &str, format: LogFormat) -> Result<()> {
    tracing_subscriber::registry()
        .with(directives(default_level))
        .with(format.layer())
        .try_init()
        .context("tracing subscriber already installed")?;

    tracing::debug!(?format, "logging initialized");
    Ok(())
}
