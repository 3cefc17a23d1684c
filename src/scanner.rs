// =============================================================================
// scanner.rs — ONE DOMAIN IN, ONE LINE OUT
// =============================================================================
//
// The orchestrator. For every domain, in input order:
//
//   resolve CNAME -> candidate providers -> probe each -> verdict
//
// all of it inside a single deadline. Miss the deadline and the whole
// pipeline future is dropped on the floor, which closes its sockets and
// cancels its DNS query. The verdict is "timedout" and we move on.
//
// A confirmed vulnerability is handed to the takeover dispatcher AFTER the
// deadline has been met. A half-created GitHub repo is worse than none.
//
// With --concurrency N, up to N pipelines run at once, each in its own task,
// collected through an ordered buffered stream. Results still come out in
// input order and takeovers still run one at a time, so stdout reads exactly
// like a sequential run.
// =============================================================================

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{debug, error, info};

use crate::config::Config;
use crate::errors::{IoResultExt, Result};
use crate::matcher;
use crate::metrics::{MetricsSnapshot, ScanMetrics};
use crate::models::{Provider, ScanOutcome};
use crate::probe::{ProbeVerdict, Prober};
use crate::registry::ProviderRegistry;
use crate::resolver::{CnameResolver, DnsResolver};
use crate::takeover::Dispatcher;

/// What the detection pipeline concluded, before any takeover happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    Clean,
    Vulnerable(Provider),
    Unreachable,
    ReadFailed,
    TimedOut,
}

/// Resolve, match, and probe. Shared by every in-flight detection task.
struct Detector {
    registry: Arc<ProviderRegistry>,
    resolver: Arc<dyn CnameResolver>,
    prober: Prober,
    deadline: Duration,
}

impl Detector {
    async fn detect(&self, domain: &str) -> Detection {
        match tokio::time::timeout(self.deadline, self.pipeline(domain)).await {
            Ok(detection) => detection,
            Err(_) => {
                debug!(
                    domain = domain,
                    deadline_ms = self.deadline.as_millis() as u64,
                    "Detection deadline exceeded"
                );
                Detection::TimedOut
            }
        }
    }

    async fn pipeline(&self, domain: &str) -> Detection {
        let cname = self.resolver.canonical_name(domain).await;

        for record in matcher::candidates(cname.as_deref(), &self.registry) {
            debug!(
                domain = domain,
                cname = cname.as_deref().unwrap_or(""),
                provider = record.name.as_str(),
                "CNAME matches a known provider, probing"
            );
            match self.prober.probe(domain, record).await {
                ProbeVerdict::Vulnerable => {
                    info!(domain = domain, provider = record.name.as_str(), "Dangling CNAME confirmed");
                    return Detection::Vulnerable(record.provider());
                }
                ProbeVerdict::NotVulnerable => continue,
                ProbeVerdict::Unreachable => return Detection::Unreachable,
                ProbeVerdict::ReadFailed => return Detection::ReadFailed,
            }
        }

        Detection::Clean
    }
}

pub struct Scanner {
    registry: Arc<ProviderRegistry>,
    resolver: Arc<dyn CnameResolver>,
    prober: Prober,
    dispatcher: Dispatcher,
    deadline: Duration,
    concurrency: usize,
    metrics: ScanMetrics,
}

impl Scanner {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        resolver: Arc<dyn CnameResolver>,
        prober: Prober,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            registry,
            resolver,
            prober,
            dispatcher,
            deadline: Duration::from_secs(5),
            concurrency: 1,
            metrics: ScanMetrics::new(),
        }
    }

    /// Wire up the production collaborators from configuration.
    pub fn from_config(config: &Config, registry: Arc<ProviderRegistry>) -> Result<Self> {
        let resolver = Arc::new(DnsResolver::new(config.nameserver, config.scan_deadline));
        let prober = Prober::new(&config.probe_settings())?;
        let dispatcher = Dispatcher::from_config(config)?;

        Ok(Self::new(registry, resolver, prober, dispatcher)
            .with_deadline(config.scan_deadline)
            .with_concurrency(config.concurrency))
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    fn detector(&self) -> Arc<Detector> {
        Arc::new(Detector {
            registry: Arc::clone(&self.registry),
            resolver: Arc::clone(&self.resolver),
            prober: self.prober.clone(),
            deadline: self.deadline,
        })
    }

    /// Resolve, match, and probe one domain under the deadline.
    pub async fn detect(&self, domain: &str) -> Detection {
        self.detector().detect(domain).await
    }

    /// Scan every domain and write one result line per domain to `out`, in
    /// input order. Takeover progress lines precede their domain's result.
    ///
    /// Each detection runs in its own task, so its deadline keeps ticking
    /// against work that is actually progressing while this loop sits in a
    /// slow takeover.
    pub async fn run<W: Write>(&self, domains: &[String], out: &mut W) -> Result<MetricsSnapshot> {
        info!(
            domains = domains.len(),
            providers = self.registry.len(),
            concurrency = self.concurrency,
            deadline_secs = self.deadline.as_secs_f64(),
            "Scan starting"
        );

        let detector = self.detector();
        let mut detections = stream::iter(domains.iter())
            .map(|domain| {
                let detector = Arc::clone(&detector);
                let owned = domain.clone();
                let task = tokio::spawn(async move { detector.detect(&owned).await });
                async move {
                    let detection = match task.await {
                        Ok(detection) => detection,
                        Err(e) => {
                            error!(domain = domain.as_str(), error = %e, "Detection task failed");
                            Detection::TimedOut
                        }
                    };
                    (domain, detection)
                }
            })
            .buffered(self.concurrency);

        while let Some((domain, detection)) = detections.next().await {
            let outcome = match detection {
                Detection::Vulnerable(provider) => {
                    self.dispatcher.dispatch(domain, &provider, out).await?
                }
                Detection::Clean => ScanOutcome::NotFound { domain: domain.clone() },
                Detection::Unreachable => ScanOutcome::Unreachable { domain: domain.clone() },
                Detection::ReadFailed => ScanOutcome::ReadFailed { domain: domain.clone() },
                Detection::TimedOut => ScanOutcome::TimedOut { domain: domain.clone() },
            };

            writeln!(out, "{}", outcome).with_path("stdout", "write result")?;
            out.flush().with_path("stdout", "flush")?;
            debug!(domain = outcome.domain(), outcome = outcome.kind(), "Domain done");
            self.metrics.record(&outcome);
        }

        Ok(self.metrics.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::tests::truncated_body_server;
    use crate::probe::ProbeSettings;
    use crate::resolver::normalize_name;
    use crate::takeover::TakeoverAction;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use crate::resolver::tests::StaticResolver;
    use crate::takeover::tests::RecordingAction;
    use crate::models::CreatedResource;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FINGERPRINTS: &str = "\
github,github\\.io,There isn't a GitHub Pages site here,true
heroku,herokuapp\\.com,no-such-app,true
shopify,myshopify\\.com,\"Sorry, this shop is currently unavailable\",true
";

    fn registry(data: &str) -> Arc<ProviderRegistry> {
        Arc::new(ProviderRegistry::from_reader(data.as_bytes(), "inline").unwrap())
    }

    fn prober() -> Prober {
        Prober::new(&ProbeSettings::default()).unwrap()
    }

    fn host_of(server: &MockServer) -> String {
        server.uri().trim_start_matches("http://").to_string()
    }

    async fn server_saying(body: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string(body))
            .mount(&server)
            .await;
        server
    }

    async fn run_lines(scanner: &Scanner, domains: &[String]) -> (Vec<String>, MetricsSnapshot) {
        let mut out = Vec::new();
        let snapshot = scanner.run(domains, &mut out).await.unwrap();
        let lines = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(String::from)
            .collect();
        (lines, snapshot)
    }

    #[tokio::test]
    async fn test_unmatched_cname_is_not_found() {
        let resolver = StaticResolver::new(&[("www.example.com", "example.netlify.app")]);
        let scanner = Scanner::new(
            registry(FINGERPRINTS),
            Arc::new(resolver),
            prober(),
            Dispatcher::default(),
        );

        let (lines, _) = run_lines(&scanner, &["www.example.com".to_string()]).await;
        assert_eq!(
            lines,
            vec!["www.example.com Not found as dangling for any of the common content hosting websites"]
        );
    }

    #[tokio::test]
    async fn test_no_cname_is_not_found() {
        let scanner = Scanner::new(
            registry(FINGERPRINTS),
            Arc::new(StaticResolver::new(&[])),
            prober(),
            Dispatcher::default(),
        );
        assert_eq!(scanner.detect("apex.example.com").await, Detection::Clean);
    }

    #[tokio::test]
    async fn test_live_site_behind_matching_cname_is_not_found() {
        let server = server_saying("Welcome to my very much alive blog").await;
        let domain = host_of(&server);
        let resolver = StaticResolver::new(&[(domain.as_str(), "me.github.io")]);
        let scanner = Scanner::new(
            registry(FINGERPRINTS),
            Arc::new(resolver),
            prober(),
            Dispatcher::default(),
        );

        let (lines, snapshot) = run_lines(&scanner, &[domain.clone()]).await;
        assert_eq!(
            lines,
            vec![format!(
                "{} Not found as dangling for any of the common content hosting websites",
                domain
            )]
        );
        assert_eq!(snapshot.not_found, 1);
    }

    #[tokio::test]
    async fn test_github_scenario_dispatches_to_github_only() {
        let server = server_saying("<h1>404</h1><p>There isn't a GitHub Pages site here.</p>").await;
        let domain = host_of(&server);
        let resolver = StaticResolver::new(&[(domain.as_str(), "abandoned.github.io.")]);

        let github = RecordingAction {
            resources: vec![
                CreatedResource::new("Branch", "https://api.test/refs/heads/gh-pages"),
                CreatedResource::new("Index File", "https://api.test/contents/index.html"),
                CreatedResource::new("CNAME file", "https://api.test/contents/CNAME"),
            ],
            ..Default::default()
        };
        let heroku = RecordingAction::default();
        let dispatcher = Dispatcher::new(
            Some(Box::new(github.clone())),
            Some(Box::new(heroku.clone())),
        );
        let scanner = Scanner::new(registry(FINGERPRINTS), Arc::new(resolver), prober(), dispatcher);

        let (lines, snapshot) = run_lines(&scanner, &[domain.clone()]).await;
        assert_eq!(
            lines,
            vec![
                format!("Found: Misconfigured Github Page at {}", domain),
                "Trying to take over this domain now..Please wait for a few seconds".to_string(),
                "Branch created at https://api.test/refs/heads/gh-pages".to_string(),
                "Index File created at https://api.test/contents/index.html".to_string(),
                "CNAME file created at https://api.test/contents/CNAME".to_string(),
                format!(
                    "Please check {} after a few minutes to ensure that it has been taken over..",
                    domain
                ),
            ]
        );
        assert_eq!(*github.claimed.lock().unwrap(), vec![domain]);
        assert!(heroku.claimed.lock().unwrap().is_empty());
        assert_eq!(snapshot.takeovers_attempted, 1);
        assert_eq!(snapshot.resources_created, 3);
    }

    #[tokio::test]
    async fn test_unsupported_provider_line() {
        let server = server_saying("Sorry, this shop is currently unavailable.").await;
        let domain = host_of(&server);
        let resolver = StaticResolver::new(&[(domain.as_str(), "shops.myshopify.com")]);
        let scanner = Scanner::new(
            registry(FINGERPRINTS),
            Arc::new(resolver),
            prober(),
            Dispatcher::default(),
        );

        let (lines, _) = run_lines(&scanner, &[domain.clone()]).await;
        assert_eq!(
            lines,
            vec![
                format!("Found: Misconfigured shopify website at {}", domain),
                "This can potentially be taken over. Unfortunately, the tool does not support taking over shopify websites at the moment.".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_first_confirmed_record_wins() {
        let server = server_saying("There isn't a GitHub Pages site here. no-such-app").await;
        let domain = host_of(&server);
        // both rows match the CNAME and both signatures are in the body
        let data = "\
heroku,\\.io$,no-such-app,true
github,github\\.io,There isn't a GitHub Pages site here,true
";
        let resolver = StaticResolver::new(&[(domain.as_str(), "x.github.io")]);
        let scanner = Scanner::new(registry(data), Arc::new(resolver), prober(), Dispatcher::default());

        assert_eq!(
            scanner.detect(&domain).await,
            Detection::Vulnerable(Provider::Heroku)
        );
    }

    #[tokio::test]
    async fn test_unconfirmed_candidate_falls_through_to_next() {
        let server = server_saying("There isn't a GitHub Pages site here.").await;
        let domain = host_of(&server);
        let data = "\
heroku,\\.io$,no-such-app,true
github,github\\.io,There isn't a GitHub Pages site here,true
";
        let resolver = StaticResolver::new(&[(domain.as_str(), "x.github.io")]);
        let scanner = Scanner::new(registry(data), Arc::new(resolver), prober(), Dispatcher::default());

        assert_eq!(
            scanner.detect(&domain).await,
            Detection::Vulnerable(Provider::Github)
        );
    }

    #[tokio::test]
    async fn test_refused_connection_is_unreachable() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let domain = format!("127.0.0.1:{}", port);
        let resolver = StaticResolver::new(&[(domain.as_str(), "gone.github.io")]);
        let scanner = Scanner::new(
            registry(FINGERPRINTS),
            Arc::new(resolver),
            prober(),
            Dispatcher::default(),
        );

        let (lines, snapshot) = run_lines(&scanner, &[domain.clone()]).await;
        assert_eq!(lines, vec![format!("Can't reach the domain {}", domain)]);
        assert_eq!(snapshot.unreachable, 1);
    }

    #[tokio::test]
    async fn test_slow_host_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("There isn't a GitHub Pages site here.")
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;
        let domain = host_of(&server);
        let resolver = StaticResolver::new(&[(domain.as_str(), "slow.github.io")]);
        let github = RecordingAction::default();
        let scanner = Scanner::new(
            registry(FINGERPRINTS),
            Arc::new(resolver),
            prober(),
            Dispatcher::new(Some(Box::new(github.clone())), None),
        )
        .with_deadline(Duration::from_millis(300));

        let (lines, snapshot) = run_lines(&scanner, &[domain]).await;
        assert_eq!(lines, vec!["timedout"]);
        assert_eq!(snapshot.timed_out, 1);
        assert!(github.claimed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_output_order_matches_input_order_under_concurrency() {
        let slow = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("alive")
                    .set_delay(Duration::from_millis(400)),
            )
            .mount(&slow)
            .await;
        let fast = server_saying("alive too").await;

        let slow_domain = host_of(&slow);
        let fast_domain = host_of(&fast);
        let resolver = StaticResolver::new(&[
            (slow_domain.as_str(), "a.github.io"),
            (fast_domain.as_str(), "b.github.io"),
        ]);
        let scanner = Scanner::new(
            registry(FINGERPRINTS),
            Arc::new(resolver),
            prober(),
            Dispatcher::default(),
        )
        .with_concurrency(4);

        let domains = vec![
            slow_domain.clone(),
            fast_domain.clone(),
            "nothing.example.com".to_string(),
            slow_domain.clone(),
        ];
        let (lines, snapshot) = run_lines(&scanner, &domains).await;

        assert_eq!(lines.len(), domains.len());
        for (line, domain) in lines.iter().zip(&domains) {
            assert!(line.starts_with(domain.as_str()), "{} should start with {}", line, domain);
        }
        assert_eq!(snapshot.domains_scanned, 4);
    }

    #[tokio::test]
    async fn test_truncated_body_is_trouble_reading() {
        let domain = truncated_body_server().await;
        let resolver = StaticResolver::new(&[(domain.as_str(), "cut.github.io")]);
        let scanner = Scanner::new(
            registry(FINGERPRINTS),
            Arc::new(resolver),
            prober(),
            Dispatcher::default(),
        );

        let (lines, snapshot) = run_lines(&scanner, &[domain.clone()]).await;
        assert_eq!(lines, vec![format!("Trouble reading response from {}", domain)]);
        assert_eq!(snapshot.read_failed, 1);
    }

    /// Answers like `StaticResolver`, but takes its time for some domains.
    struct SlowResolver {
        answers: HashMap<String, (String, Duration)>,
    }

    #[async_trait]
    impl CnameResolver for SlowResolver {
        async fn canonical_name(&self, domain: &str) -> Option<String> {
            let (cname, delay) = self.answers.get(domain)?;
            tokio::time::sleep(*delay).await;
            Some(normalize_name(cname))
        }
    }

    /// A takeover that outlasts the detection deadline.
    struct SlowClaim {
        delay: Duration,
    }

    #[async_trait]
    impl TakeoverAction for SlowClaim {
        async fn claim(&self, _domain: &str) -> Vec<CreatedResource> {
            tokio::time::sleep(self.delay).await;
            Vec::new()
        }
    }

    #[tokio::test]
    async fn test_slow_takeover_does_not_time_out_queued_detections() {
        let first = server_saying("There isn't a GitHub Pages site here.").await;
        let second = server_saying("There isn't a GitHub Pages site here.").await;
        let first_domain = host_of(&first);
        let second_domain = host_of(&second);

        let resolver = SlowResolver {
            answers: HashMap::from([
                (first_domain.clone(), ("a.github.io".to_string(), Duration::ZERO)),
                (
                    second_domain.clone(),
                    ("b.github.io".to_string(), Duration::from_millis(300)),
                ),
            ]),
        };
        let dispatcher = Dispatcher::new(
            Some(Box::new(SlowClaim {
                delay: Duration::from_millis(1500),
            })),
            None,
        );
        let scanner = Scanner::new(registry(FINGERPRINTS), Arc::new(resolver), prober(), dispatcher)
            .with_deadline(Duration::from_millis(1000))
            .with_concurrency(2);

        let (lines, snapshot) = run_lines(&scanner, &[first_domain.clone(), second_domain.clone()]).await;

        assert_eq!(snapshot.timed_out, 0, "unexpected timeout in {:?}", lines);
        assert_eq!(snapshot.takeovers_attempted, 2);
        assert_eq!(
            lines.last().unwrap(),
            &format!(
                "Please check {} after a few minutes to ensure that it has been taken over..",
                second_domain
            )
        );
    }
}
