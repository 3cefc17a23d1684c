// ████████╗ █████╗ ██╗  ██╗███████╗ ██████╗ ██╗   ██╗███████╗██████╗
// ╚══██╔══╝██╔══██╗██║ ██╔╝██╔════╝██╔═══██╗██║   ██║██╔════╝██╔══██╗
//    ██║   ███████║█████╔╝ █████╗  ██║   ██║██║   ██║█████╗  ██████╔╝
//    ██║   ██╔══██║██╔═██╗ ██╔══╝  ██║   ██║╚██╗ ██╔╝██╔══╝  ██╔══██╗
//    ██║   ██║  ██║██║  ██╗███████╗╚██████╔╝ ╚████╔╝ ███████╗██║  ██║
//    ╚═╝   ╚═╝  ╚═╝╚═╝  ╚═╝╚══════╝ ╚═════╝   ╚═══╝  ╚══════╝╚═╝  ╚═╝
//
// E N G I N E
//
// Somebody deleted the GitHub Pages repo. Nobody deleted the DNS record.
// This finds those records and claims what they point at before someone
// with worse intentions does.
//
// stdout: one verdict line per domain (plus takeover progress).
// stderr: everything else.

mod cli;
mod config;
mod errors;
mod matcher;
mod metrics;
mod models;
mod probe;
mod registry;
mod resolver;
mod scanner;
mod takeover;

use std::io;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::Cli;
use crate::config::Config;
use crate::registry::ProviderRegistry;
use crate::scanner::Scanner;

fn print_banner() {
    let banner = r#"
    ╔══════════════════════════════════════════════════════════════╗
    ║            ⚡ DANGLING CNAME TAKEOVER ENGINE ⚡              ║
    ║                                                              ║
    ║   Resolve -> Fingerprint -> Probe -> Claim                   ║
    ║   Providers: whatever your fingerprint file says             ║
    ║   Claims:    GitHub Pages | Heroku                           ║
    ║                                                              ║
    ║   "Your DNS outlived your hosting. We noticed."              ║
    ╚══════════════════════════════════════════════════════════════╝
    "#;
    eprintln!("{}", banner);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .with_target(true)
        .init();

    let cli = Cli::from_args();
    print_banner();

    let mut config = Config::from_env();
    config.merge_with_cli(&cli);
    config.validate().context("invalid configuration")?;
    info!(
        concurrency = config.concurrency,
        deadline_secs = config.scan_deadline.as_secs(),
        github = config.github.is_some(),
        heroku = config.heroku.is_some(),
        "✅ Configuration loaded"
    );
    if config.github.is_none() && config.heroku.is_none() {
        warn!("No takeover credentials configured; vulnerable domains will be reported only");
    }

    let registry = ProviderRegistry::load(&cli.fingerprints).with_context(|| {
        format!(
            "could not load fingerprints from {}",
            cli.fingerprints.display()
        )
    })?;
    if registry.is_empty() {
        warn!("Fingerprint database has no usable rows; every domain will come back not found");
    }
    info!(providers = registry.len(), "✅ Fingerprint database ready");

    let domains = load_domains(&cli.domains)?;
    info!(domains = domains.len(), "✅ Domain list loaded");

    let scanner = Scanner::from_config(&config, Arc::new(registry))
        .context("could not initialise scanner")?;

    info!("🚀 Scanning...");
    let mut out = io::stdout();
    let snapshot = scanner.run(&domains, &mut out).await?;

    info!(
        metrics = %serde_json::to_string(&snapshot)?,
        "🏁 Scan complete"
    );
    Ok(())
}

/// Read the domains file. Order is kept, duplicates are kept, blank lines
/// are dropped.
fn load_domains(path: &Path) -> anyhow::Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("could not read domains from {}", path.display()))?;
    Ok(parse_domains(&raw))
}

fn parse_domains(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}
