use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::config::{ConfigError, GithubConfig};

const API_VERSION: &str = "2022-11-28";
const CLIENT_NAME: &str = concat!("checkin-relay/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum GithubError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid response: {0}")]
    Decode(String),
}

impl GithubError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, GithubError::Status { status: 404, .. })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowRun {
    pub id: u64,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub conclusion: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    pub name: String,
    #[serde(default)]
    pub conclusion: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunList {
    workflow_runs: Vec<WorkflowRun>,
}

#[derive(Debug, Deserialize)]
struct JobList {
    jobs: Vec<Job>,
}

#[derive(Debug, Deserialize)]
struct FileContent {
    content: String,
    #[serde(default)]
    encoding: Option<String>,
}

/// Client for the repository that hosts the check-in workflow.
#[derive(Debug, Clone)]
pub struct GithubClient {
    client: reqwest::Client,
    api_url: String,
    token: String,
    repository: String,
    workflow: Option<String>,
}

impl GithubClient {
    pub fn new(client: reqwest::Client, config: &GithubConfig) -> Result<Self, ConfigError> {
        let (token, repository) = config.credentials()?;
        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            repository: repository.to_string(),
            workflow: config
                .workflow
                .as_deref()
                .map(str::trim)
                .filter(|w| !w.is_empty())
                .map(str::to_string),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/repos/{}{}", self.api_url, self.repository, path);
        debug!("GitHub request: {} {}", method, url);
        self.client
            .request(method, url)
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .header(USER_AGENT, CLIENT_NAME)
    }

    async fn send(builder: RequestBuilder) -> Result<reqwest::Response, GithubError> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GithubError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, GithubError> {
        response
            .json()
            .await
            .map_err(|e| GithubError::Decode(e.to_string()))
    }

    /// Fire a `repository_dispatch` event. Only 200 and 204 count as accepted.
    pub async fn dispatch(&self, event_type: &str, payload: Value) -> Result<(), GithubError> {
        let response = self
            .request(Method::POST, "/dispatches")
            .json(&json!({
                "event_type": event_type,
                "client_payload": payload,
            }))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::OK || status == StatusCode::NO_CONTENT {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(GithubError::Status {
            status: status.as_u16(),
            body,
        })
    }

    /// Most recent runs first, optionally filtered by run status (`success`, ...).
    pub async fn list_runs(
        &self,
        limit: u8,
        status: Option<&str>,
    ) -> Result<Vec<WorkflowRun>, GithubError> {
        let path = match &self.workflow {
            Some(workflow) => format!("/actions/workflows/{}/runs", workflow),
            None => "/actions/runs".to_string(),
        };

        let mut query = vec![("per_page", limit.to_string())];
        if let Some(status) = status {
            query.push(("status", status.to_string()));
        }

        let response = Self::send(self.request(Method::GET, &path).query(&query)).await?;
        let runs: RunList = Self::decode(response).await?;
        Ok(runs.workflow_runs)
    }

    pub async fn list_jobs(&self, run_id: u64) -> Result<Vec<Job>, GithubError> {
        let path = format!("/actions/runs/{}/jobs", run_id);
        let response = Self::send(self.request(Method::GET, &path)).await?;
        let jobs: JobList = Self::decode(response).await?;
        Ok(jobs.jobs)
    }

    /// Fetch a JSON file from the repository through the contents API.
    pub async fn fetch_json_file<T: DeserializeOwned>(&self, path: &str) -> Result<T, GithubError> {
        let path = format!("/contents/{}", path.trim_start_matches('/'));
        let response = Self::send(self.request(Method::GET, &path)).await?;
        let file: FileContent = Self::decode(response).await?;

        if let Some(encoding) = file.encoding.as_deref() {
            if encoding != "base64" {
                return Err(GithubError::Decode(format!(
                    "unsupported content encoding '{}'",
                    encoding
                )));
            }
        }

        // The API wraps base64 content at 60 columns.
        let packed: String = file.content.split_whitespace().collect();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(packed)
            .map_err(|e| GithubError::Decode(format!("bad base64 content: {}", e)))?;

        serde_json::from_slice(&bytes)
            .map_err(|e| GithubError::Decode(format!("bad JSON in {}: {}", path, e)))
    }
}
