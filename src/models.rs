// =============================================================================
// models.rs — THE NOUNS OF SUBDOMAIN TAKEOVER
// =============================================================================
//
// Three things matter in this business:
//
// 1. A provider fingerprint: "if your CNAME looks like THIS and the page says
//    THAT, the resource behind it is up for grabs."
// 2. The provider itself, because only some of them can be claimed by a robot.
// 3. The verdict for a domain, printed as exactly one line.
//
// Everything else is plumbing.
// =============================================================================

use std::fmt;

use regex::Regex;

/// One row of the fingerprint database, with both patterns already compiled.
///
/// Records are immutable once loaded. The registry keeps them in file order,
/// and that order decides ties: the first record that both matches the CNAME
/// and finds its error signature in the page wins.
#[derive(Debug, Clone)]
pub struct ProviderRecord {
    /// Provider identifier as written in the database ("github", "heroku", ...).
    pub name: String,

    /// Searched (not anchored) against the resolved CNAME.
    pub cname_pattern: Regex,

    /// Searched against the probe response body. A hit means the provider is
    /// serving its "nothing lives here" page for this domain.
    pub error_signature: Regex,

    /// Probe over plain HTTP instead of HTTPS.
    pub use_http: bool,
}

impl ProviderRecord {
    pub fn provider(&self) -> Provider {
        Provider::from_name(&self.name)
    }

    pub fn scheme(&self) -> &'static str {
        if self.use_http {
            "http"
        } else {
            "https"
        }
    }
}

/// The closed set of providers the engine knows how to claim.
///
/// Adding a provider means adding a variant here plus an adapter under
/// `takeover/`. Anything not listed is reported, never touched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Provider {
    /// GitHub Pages: claimed by creating a repo with a gh-pages branch.
    Github,
    /// Heroku: claimed by adding the domain to an app we control.
    Heroku,
    /// Known to the fingerprint database, unknown to the takeover code.
    Unsupported(String),
}

impl Provider {
    pub fn from_name(name: &str) -> Self {
        let name = name.trim();
        if name.eq_ignore_ascii_case("github") {
            Provider::Github
        } else if name.eq_ignore_ascii_case("heroku") {
            Provider::Heroku
        } else {
            Provider::Unsupported(name.to_string())
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Github => write!(f, "github"),
            Provider::Heroku => write!(f, "heroku"),
            Provider::Unsupported(name) => write!(f, "{}", name),
        }
    }
}

/// A URL reported back by a collaborator API, labelled with what it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedResource {
    pub label: String,
    /// "created" for things we made, "registered" for things we attached.
    pub verb: &'static str,
    pub url: String,
}

impl CreatedResource {
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            verb: "created",
            url: url.into(),
        }
    }

    pub fn registered(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            verb: "registered",
            url: url.into(),
        }
    }
}

impl fmt::Display for CreatedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} at {}", self.label, self.verb, self.url)
    }
}

/// The verdict for one domain. Created when the domain is done, printed,
/// and then forgotten. The `Display` impl IS the user-facing output line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// No provider both matched the CNAME and showed its error page.
    NotFound { domain: String },

    /// The detection pipeline blew through its deadline.
    TimedOut { domain: String },

    /// The CNAME matched a provider but the host would not talk to us.
    Unreachable { domain: String },

    /// The host answered but the body could not be read.
    ReadFailed { domain: String },

    /// A claim was attempted. `resources` lists what the collaborator
    /// reported creating; a rate-limited run may list fewer than expected.
    TakeoverAttempted {
        domain: String,
        provider: Provider,
        resources: Vec<CreatedResource>,
    },

    /// Vulnerable, but the engine has no adapter for this provider.
    Unsupported { domain: String, provider: String },

    /// Vulnerable and supported, but no credentials were configured.
    MissingCredentials { domain: String, provider: Provider },
}

impl ScanOutcome {
    pub fn domain(&self) -> &str {
        match self {
            ScanOutcome::NotFound { domain }
            | ScanOutcome::TimedOut { domain }
            | ScanOutcome::Unreachable { domain }
            | ScanOutcome::ReadFailed { domain }
            | ScanOutcome::TakeoverAttempted { domain, .. }
            | ScanOutcome::Unsupported { domain, .. }
            | ScanOutcome::MissingCredentials { domain, .. } => domain,
        }
    }

    /// Short machine-ish name, used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ScanOutcome::NotFound { .. } => "not_found",
            ScanOutcome::TimedOut { .. } => "timed_out",
            ScanOutcome::Unreachable { .. } => "unreachable",
            ScanOutcome::ReadFailed { .. } => "read_failed",
            ScanOutcome::TakeoverAttempted { .. } => "takeover_attempted",
            ScanOutcome::Unsupported { .. } => "unsupported",
            ScanOutcome::MissingCredentials { .. } => "missing_credentials",
        }
    }
}

impl fmt::Display for ScanOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanOutcome::NotFound { domain } => write!(
                f,
                "{} Not found as dangling for any of the common content hosting websites",
                domain
            ),
            ScanOutcome::TimedOut { .. } => write!(f, "timedout"),
            ScanOutcome::Unreachable { domain } => write!(f, "Can't reach the domain {}", domain),
            ScanOutcome::ReadFailed { domain } => {
                write!(f, "Trouble reading response from {}", domain)
            }
            ScanOutcome::TakeoverAttempted { domain, .. } => write!(
                f,
                "Please check {} after a few minutes to ensure that it has been taken over..",
                domain
            ),
            ScanOutcome::Unsupported { provider, .. } => write!(
                f,
                "This can potentially be taken over. Unfortunately, the tool does not support taking over {} websites at the moment.",
                provider
            ),
            ScanOutcome::MissingCredentials { domain, provider } => write!(
                f,
                "{} can potentially be taken over via {}, but no {} credentials are configured",
                domain, provider, provider
            ),
        }
    }
}
