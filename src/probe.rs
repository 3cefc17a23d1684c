// =============================================================================
// probe.rs — KNOCK KNOCK. WHO'S THERE? "NO SUCH APP."
// =============================================================================
//
// A CNAME pointing at github.io proves nothing on its own. Plenty of those
// are alive and well. What gives a dangling record away is the provider's
// own error page: "There isn't a GitHub Pages site here", "no-such-app.html",
// and friends. So we fetch the page and look for that signature.
//
// The client is built once and reused. Certificate checks are OFF: a
// half-deprovisioned service is exactly the kind of host that serves a stale
// or mismatched certificate, and we want its body, not its excuses.
// =============================================================================

use std::time::Duration;

use tracing::{debug, warn};

use crate::errors::{EngineError, Result};
use crate::models::ProviderRecord;

/// Knobs for the probe client.
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    /// TCP connect plus TLS handshake.
    pub connect_timeout: Duration,
    /// The whole request, body included.
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(5),
            user_agent: concat!("takeover_engine/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// What one probe concluded about one (domain, provider) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeVerdict {
    /// The provider's "nothing here" page came back. Claimable.
    Vulnerable,
    /// Something answered, and it was not the error page.
    NotVulnerable,
    /// Connection refused, DNS for the A record gone, TLS blew up, timeout...
    Unreachable,
    /// Headers arrived, the body did not.
    ReadFailed,
}

#[derive(Clone)]
pub struct Prober {
    client: reqwest::Client,
}

impl Prober {
    pub fn new(settings: &ProbeSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .danger_accept_invalid_certs(true)
            .no_proxy()
            .user_agent(settings.user_agent.as_str())
            .build()
            .map_err(|e| EngineError::http("build probe client", e))?;
        Ok(Self { client })
    }

    /// GET `<scheme>://<domain>` and search the body for the record's error
    /// signature. The status code is irrelevant; error pages are often 404s.
    pub async fn probe(&self, domain: &str, record: &ProviderRecord) -> ProbeVerdict {
        let url = format!("{}://{}", record.scheme(), domain);

        let response = match self.client.get(&url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                debug!(url = url.as_str(), error = %e, "Probe could not reach host");
                return ProbeVerdict::Unreachable;
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(url = url.as_str(), error = %e, "Probe failed to read response body");
                return ProbeVerdict::ReadFailed;
            }
        };

        let vulnerable = record.error_signature.is_match(&body);
        debug!(
            url = url.as_str(),
            provider = record.name.as_str(),
            status = status.as_u16(),
            body_len = body.len(),
            vulnerable = vulnerable,
            "Probe complete"
        );

        if vulnerable {
            ProbeVerdict::Vulnerable
        } else {
            ProbeVerdict::NotVulnerable
        }
    }
}
