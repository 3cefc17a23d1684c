// =============================================================================
// resolver.rs — WHERE DOES THIS SUBDOMAIN ACTUALLY POINT?
// =============================================================================
//
// Step one of every scan: ask DNS for the canonical name. We follow CNAME
// chains the way a system resolver would (blog.example.com -> example.github.io
// -> whatever GitHub uses this week) and hand back the last name in the chain.
//
// Errors are deliberately boring. NXDOMAIN, SERVFAIL, a timeout, or simply
// "this is an A record" all come back as `None`. Downstream, `None` means
// "no provider matches", which is the right answer for all of them.
// =============================================================================

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};
use trust_dns_resolver::config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts};
use trust_dns_resolver::proto::rr::{RData, RecordType};
use trust_dns_resolver::TokioAsyncResolver;

/// How many CNAME hops we chase before declaring the chain silly.
pub const MAX_CNAME_HOPS: usize = 8;

/// Anything that can turn a domain into its canonical name.
#[async_trait]
pub trait CnameResolver: Send + Sync {
    /// The final CNAME target, lowercased, without the trailing root dot.
    /// `None` when there is no CNAME or the lookup failed.
    async fn canonical_name(&self, domain: &str) -> Option<String>;
}

/// The real thing, backed by trust-dns.
pub struct DnsResolver {
    resolver: TokioAsyncResolver,
}

impl DnsResolver {
    /// Build a resolver. With a nameserver, every query goes to that single
    /// UDP server; without one we use the system configuration and fall back
    /// to trust-dns defaults if it cannot be read.
    pub fn new(nameserver: Option<SocketAddr>, timeout: Duration) -> Self {
        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;

        let resolver = match nameserver {
            Some(addr) => {
                let mut config = ResolverConfig::new();
                config.add_name_server(NameServerConfig {
                    socket_addr: addr,
                    protocol: Protocol::Udp,
                    tls_dns_name: None,
                    trust_negative_responses: false,
                    bind_addr: None,
                });
                debug!(nameserver = %addr, "Using explicit nameserver");
                TokioAsyncResolver::tokio(config, opts)
            }
            None => match trust_dns_resolver::system_conf::read_system_conf() {
                Ok((config, _)) => TokioAsyncResolver::tokio(config, opts),
                Err(e) => {
                    warn!(error = %e, "Could not read system resolver config, using defaults");
                    TokioAsyncResolver::tokio(ResolverConfig::default(), opts)
                }
            },
        };

        Self { resolver }
    }

    /// One CNAME query. Returns the last CNAME target in the answer, since a
    /// recursive server may already have expanded part of the chain for us.
    async fn lookup_once(&self, name: &str) -> Option<String> {
        match self.resolver.lookup(name, RecordType::CNAME).await {
            Ok(lookup) => lookup
                .iter()
                .filter_map(|rdata| match rdata {
                    RData::CNAME(target) => Some(normalize_name(&target.0.to_utf8())),
                    _ => None,
                })
                .last(),
            Err(e) => {
                debug!(name = name, error = %e, "CNAME lookup returned nothing");
                None
            }
        }
    }
}

#[async_trait]
impl CnameResolver for DnsResolver {
    async fn canonical_name(&self, domain: &str) -> Option<String> {
        let mut current = normalize_name(domain);
        let mut canonical = None;

        for _ in 0..MAX_CNAME_HOPS {
            match self.lookup_once(&current).await {
                Some(next) if next != current && !next.is_empty() => {
                    canonical = Some(next.clone());
                    current = next;
                }
                _ => break,
            }
        }

        debug!(
            domain = domain,
            cname = canonical.as_deref().unwrap_or("<none>"),
            "Resolved canonical name"
        );
        canonical
    }
}

/// Lowercase and drop the trailing root dot so patterns like `github\.io$` work.
pub fn normalize_name(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}
