// =============================================================================
// takeover/heroku.rs — ADOPTING ORPHANED HEROKU HOSTNAMES
// =============================================================================
//
// Heroku routes by hostname. If a CNAME points at herokuapp.com and Heroku
// answers with its no-such-app page, no app has that hostname as a custom
// domain anymore. Adding it to one of ours is a single Platform API call:
//
//   POST /apps/{app}/domains   { "hostname": "<domain>" }
//
// Basic auth with the account email and API key.
// =============================================================================

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::TakeoverAction;
use crate::config::HerokuCredentials;
use crate::errors::{EngineError, Result};
use crate::models::CreatedResource;

#[derive(Debug, Serialize)]
struct CreateDomainRequest<'a> {
    hostname: &'a str,
}

#[derive(Debug, Deserialize)]
struct DomainResponse {
    id: String,
    #[serde(default)]
    cname: Option<String>,
}

pub struct HerokuTakeover {
    client: reqwest::Client,
    api_url: String,
    username: String,
    api_key: String,
    app_name: String,
}

impl HerokuTakeover {
    pub fn new(creds: &HerokuCredentials, timeout: Duration, user_agent: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.heroku+json; version=3"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| EngineError::http("build Heroku client", e))?;

        Ok(Self {
            client,
            api_url: creds.api_url.trim_end_matches('/').to_string(),
            username: creds.username.clone(),
            api_key: creds.api_key.clone(),
            app_name: creds.app_name.clone(),
        })
    }

    async fn register_domain(&self, domain: &str) -> Result<String> {
        let operation = "register custom domain";
        let app_url = format!(
            "{}/apps/{}",
            self.api_url,
            urlencoding::encode(&self.app_name)
        );

        let response = self
            .client
            .post(format!("{}/domains", app_url))
            .basic_auth(&self.username, Some(&self.api_key))
            .json(&CreateDomainRequest { hostname: domain })
            .send()
            .await
            .map_err(|e| EngineError::http(operation, e))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(EngineError::rate_limited(operation));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::api(operation, status.as_u16(), body));
        }

        let created: DomainResponse = response
            .json()
            .await
            .map_err(|e| EngineError::decode(operation, e.to_string()))?;
        debug!(
            domain = domain,
            app = self.app_name.as_str(),
            dns_target = created.cname.as_deref().unwrap_or("<none>"),
            "Heroku accepted the domain"
        );

        Ok(format!("{}/domains/{}", app_url, created.id))
    }
}

#[async_trait::async_trait]
impl TakeoverAction for HerokuTakeover {
    async fn claim(&self, domain: &str) -> Vec<CreatedResource> {
        match self.register_domain(domain).await {
            Ok(url) => vec![CreatedResource::registered("Domain", url)],
            Err(e) if e.is_rate_limit() => {
                warn!(domain = domain, "hit rate limit");
                Vec::new()
            }
            Err(e) => {
                warn!(
                    domain = domain,
                    app = self.app_name.as_str(),
                    error = %e,
                    "Heroku domain registration failed"
                );
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Provider, ScanOutcome};
    use crate::takeover::Dispatcher;
    use serde_json::json;
    use wiremock::matchers::{basic_auth, body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(server: &MockServer) -> HerokuTakeover {
        let creds = HerokuCredentials {
            username: "me@example.com".to_string(),
            api_key: "hk-secret".to_string(),
            app_name: "catcher".to_string(),
            api_url: server.uri(),
        };
        HerokuTakeover::new(&creds, Duration::from_secs(5), "takeover_engine/test").unwrap()
    }

    #[tokio::test]
    async fn test_registers_domain_on_configured_app() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/apps/catcher/domains"))
            .and(basic_auth("me@example.com", "hk-secret"))
            .and(header("accept", "application/vnd.heroku+json; version=3"))
            .and(body_json(json!({ "hostname": "app.example.com" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "01234567-89ab",
                "hostname": "app.example.com",
                "cname": "app.example.com.herokudns.com"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let created = adapter(&server).claim("app.example.com").await;
        assert_eq!(created.len(), 1);
        assert_eq!(
            created[0].to_string(),
            format!("Domain registered at {}/apps/catcher/domains/01234567-89ab", server.uri())
        );
    }

    #[tokio::test]
    async fn test_rejection_is_logged_not_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "id": "invalid_params",
                "message": "Domain already added to this app."
            })))
            .mount(&server)
            .await;

        assert!(adapter(&server).claim("app.example.com").await.is_empty());
    }

    #[tokio::test]
    async fn test_rate_limit_still_counts_as_attempted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/apps/catcher/domains"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "id": "rate_limit",
                "message": "Your account reached the API rate limit"
            })))
            .expect(2)
            .mount(&server)
            .await;

        let heroku = adapter(&server);
        assert!(heroku
            .register_domain("app.example.com")
            .await
            .unwrap_err()
            .is_rate_limit());

        let dispatcher = Dispatcher::new(None, Some(Box::new(heroku)));
        let mut out = Vec::new();
        let outcome = dispatcher
            .dispatch("app.example.com", &Provider::Heroku, &mut out)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ScanOutcome::TakeoverAttempted {
                domain: "app.example.com".to_string(),
                provider: Provider::Heroku,
                resources: Vec::new(),
            }
        );
    }
}
