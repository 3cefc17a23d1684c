// =============================================================================
// cli.rs — TWO FILES AND A COUPLE OF KNOBS
// =============================================================================

use std::path::PathBuf;

use clap::Parser;

/// Command-line interface.
///
/// Flags left unset fall back to the environment (see `config.rs`), then to
/// the built-in defaults.
#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "Find subdomains whose CNAME points at an abandoned hosting resource, and claim it"
)]
pub struct Cli {
    /// Newline-delimited list of domains to check, scanned in file order.
    #[arg(value_name = "DOMAINS_FILE")]
    pub domains: PathBuf,

    /// Provider fingerprint CSV: name, CNAME regex, error-page regex, http-only flag.
    #[arg(value_name = "FINGERPRINTS_FILE")]
    pub fingerprints: PathBuf,

    /// Domains probed at once. Results are still printed in input order.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(usize))]
    pub concurrency: Option<usize>,

    /// Per-domain deadline in seconds for resolve + probe.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

impl Cli {
    pub fn from_args() -> Self {
        Self::parse()
    }
}
