// =============================================================================
// config.rs — KNOBS, DIALS, AND OTHER PEOPLE'S API KEYS
// =============================================================================
//
// Configuration comes from the process environment, optionally seeded from a
// `.env` file in the working directory. Command-line flags override a couple
// of the scan settings on top of that.
//
// Credentials live here and ONLY here. The takeover adapters receive them at
// construction time; nothing else in the engine reads the environment.
//
// Every variable has a TKO_ name. The GitHub/Heroku secrets also answer to the
// short lowercase names older .env files use (`token`, `herokuusername`,
// `herokuapikey`, `herokuappname`), because nobody enjoys rewriting .env files.
// =============================================================================

use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use tracing::warn;
use url::Url;

use crate::cli::Cli;
use crate::errors::{EngineError, Result};
use crate::probe::ProbeSettings;

pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
pub const DEFAULT_HEROKU_API_URL: &str = "https://api.heroku.com";

/// GitHub personal access token plus the API it is good for.
#[derive(Clone)]
pub struct GithubCredentials {
    pub token: String,
    pub api_url: String,
}

impl fmt::Debug for GithubCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GithubCredentials")
            .field("token", &"<redacted>")
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// Heroku account, API key, and the app that will adopt claimed domains.
#[derive(Clone)]
pub struct HerokuCredentials {
    pub username: String,
    pub api_key: String,
    pub app_name: String,
    pub api_url: String,
}

impl fmt::Debug for HerokuCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HerokuCredentials")
            .field("username", &self.username)
            .field("api_key", &"<redacted>")
            .field("app_name", &self.app_name)
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// Everything tunable, in one place.
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // SCAN
    // =========================================================================

    /// Deadline for resolve + match + probe on one domain. Default: 5 seconds.
    pub scan_deadline: Duration,

    /// Connect (TCP + TLS) and whole-request timeout for the probe. Default: 5 seconds.
    pub probe_timeout: Duration,

    /// Domains in flight at once. Default: 1, i.e. strictly one after another.
    /// Output order is the input order regardless.
    pub concurrency: usize,

    /// Send every DNS query to this server instead of the system resolver.
    pub nameserver: Option<SocketAddr>,

    pub user_agent: String,

    // =========================================================================
    // TAKEOVER COLLABORATORS
    // =========================================================================

    /// Timeout for each GitHub/Heroku API call. Default: 30 seconds.
    pub api_timeout: Duration,

    /// `None` when no token is configured; GitHub takeovers are then reported
    /// but not attempted.
    pub github: Option<GithubCredentials>,

    /// `None` unless username, API key, and app name are all configured.
    pub heroku: Option<HerokuCredentials>,
}

impl Config {
    /// Load `.env` if present (silently skipped otherwise), then read the
    /// process environment.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. `from_env` is this with
    /// `std::env::var`; tests use a map.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let secs = |key: &str, default: u64| -> Duration {
            Duration::from_secs(parse_or(&lookup, key, default))
        };

        let nameserver = first_of(&lookup, &["TKO_NAMESERVER"]).and_then(|raw| {
            match raw.parse::<SocketAddr>() {
                Ok(addr) => Some(addr),
                Err(e) => {
                    warn!(value = raw.as_str(), error = %e, "Ignoring TKO_NAMESERVER, expected ip:port");
                    None
                }
            }
        });

        let github = first_of(&lookup, &["TKO_GITHUB_TOKEN", "token"]).map(|token| {
            GithubCredentials {
                token,
                api_url: first_of(&lookup, &["TKO_GITHUB_API_URL"])
                    .unwrap_or_else(|| DEFAULT_GITHUB_API_URL.to_string()),
            }
        });

        let heroku = match (
            first_of(&lookup, &["TKO_HEROKU_USERNAME", "herokuusername"]),
            first_of(&lookup, &["TKO_HEROKU_API_KEY", "herokuapikey"]),
            first_of(&lookup, &["TKO_HEROKU_APP_NAME", "herokuappname"]),
        ) {
            (Some(username), Some(api_key), Some(app_name)) => Some(HerokuCredentials {
                username,
                api_key,
                app_name,
                api_url: first_of(&lookup, &["TKO_HEROKU_API_URL"])
                    .unwrap_or_else(|| DEFAULT_HEROKU_API_URL.to_string()),
            }),
            (None, None, None) => None,
            _ => {
                warn!("Heroku credentials are incomplete (need username, API key and app name); Heroku takeovers disabled");
                None
            }
        };

        Config {
            scan_deadline: secs("TKO_SCAN_DEADLINE_SECS", 5),
            probe_timeout: secs("TKO_PROBE_TIMEOUT_SECS", 5),
            concurrency: parse_or(&lookup, "TKO_CONCURRENCY", 1),
            nameserver,
            user_agent: first_of(&lookup, &["TKO_USER_AGENT"]).unwrap_or_else(|| {
                concat!("takeover_engine/", env!("CARGO_PKG_VERSION")).to_string()
            }),
            api_timeout: secs("TKO_API_TIMEOUT_SECS", 30),
            github,
            heroku,
        }
    }

    /// Command-line flags beat the environment.
    pub fn merge_with_cli(&mut self, cli: &Cli) {
        if let Some(concurrency) = cli.concurrency {
            self.concurrency = concurrency;
        }
        if let Some(timeout) = cli.timeout {
            self.scan_deadline = Duration::from_secs(timeout);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(EngineError::configuration("concurrency must be at least 1"));
        }
        if self.scan_deadline.is_zero() {
            return Err(EngineError::configuration("scan deadline must be greater than zero"));
        }
        if self.probe_timeout.is_zero() {
            return Err(EngineError::configuration("probe timeout must be greater than zero"));
        }
        if let Some(github) = &self.github {
            validate_api_url("TKO_GITHUB_API_URL", &github.api_url)?;
        }
        if let Some(heroku) = &self.heroku {
            validate_api_url("TKO_HEROKU_API_URL", &heroku.api_url)?;
        }
        Ok(())
    }

    pub fn probe_settings(&self) -> ProbeSettings {
        ProbeSettings {
            connect_timeout: self.probe_timeout,
            request_timeout: self.probe_timeout,
            user_agent: self.user_agent.clone(),
        }
    }
}

/// First non-empty value among `keys`, trimmed.
fn first_of<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    keys.iter()
        .filter_map(|key| lookup(key))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match first_of(lookup, &[key]) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(key = key, value = raw.as_str(), "Unparseable value, using default");
            default
        }),
        None => default,
    }
}

fn validate_api_url(key: &str, raw: &str) -> Result<()> {
    let url = Url::parse(raw)
        .map_err(|e| EngineError::configuration(format!("{} is not a valid URL ({}): {}", key, raw, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(EngineError::configuration(format!(
            "{} must be http or https, got {}",
            key, other
        ))),
    }
}
