//! GitLab v4 REST API client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::auth::{CredentialStore, Service};
use crate::config::GitLabConfig;
use crate::error::{Error, Result};
use crate::models::{
    GitLabCommit, GitLabDeployment, GitLabDiff, GitLabMergeRequest, GitLabPipeline, GitLabProject,
};
use crate::util::retry::{retry_with_backoff, transient_status, RetryPolicy};

use super::SourceHostClient;

const SERVICE: &str = "gitlab";

#[derive(Debug)]
enum HttpError {
    Transport(reqwest::Error),
    Status(StatusCode, String),
    Auth(String),
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpError::Transport(err) => write!(f, "transport error: {err}"),
            HttpError::Status(code, body) => write!(f, "status {code}: {body}"),
            HttpError::Auth(msg) => write!(f, "authentication: {msg}"),
        }
    }
}

fn retryable(err: &HttpError) -> bool {
    match err {
        HttpError::Transport(_) => true,
        HttpError::Status(code, _) => transient_status(code.as_u16()),
        HttpError::Auth(_) => false,
    }
}

fn to_error(err: HttpError) -> Error {
    match err {
        HttpError::Transport(e) => Error::upstream(SERVICE, e),
        HttpError::Status(code, body) if code == StatusCode::NOT_FOUND => Error::NotFound(body),
        HttpError::Status(code, body)
            if code == StatusCode::UNAUTHORIZED || code == StatusCode::FORBIDDEN =>
        {
            Error::UpstreamAuth { service: SERVICE, message: body }
        }
        HttpError::Status(code, body) => Error::upstream(SERVICE, format!("status {code}: {body}")),
        HttpError::Auth(msg) => Error::UpstreamAuth { service: SERVICE, message: msg },
    }
}

/// Percent-encode a project identifier (`group/project` paths must be
/// encoded as a single path segment).
fn encode_project(project: &str) -> String {
    project.replace('/', "%2F")
}

fn encode_path(path: &str) -> String {
    path.replace('/', "%2F").replace('.', "%2E")
}

/// Client for the GitLab v4 API, authenticating with a private token.
/// Transient failures retry with exponential backoff.
pub struct GitLabClient {
    base_url: String,
    http: reqwest::Client,
    credentials: Arc<dyn CredentialStore>,
    retry: RetryPolicy,
}

impl GitLabClient {
    pub fn new(config: &GitLabConfig, credentials: Arc<dyn CredentialStore>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| Error::upstream(SERVICE, err))?;
        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            http,
            credentials,
            retry: RetryPolicy::default(),
        })
    }

    /// Probe `/api/v4/version`, used by the health endpoint.
    pub async fn check_connectivity(&self) -> Result<()> {
        #[derive(serde::Deserialize)]
        struct Version {
            #[serde(default)]
            _version: String,
        }
        let _: Version = self.get_json("version").await?;
        Ok(())
    }

    async fn attempt(&self, endpoint: &str) -> std::result::Result<reqwest::Response, HttpError> {
        let creds = self
            .credentials
            .get(Service::GitLab)
            .await
            .map_err(|err| HttpError::Auth(err.to_string()))?;
        if creds.token.is_empty() {
            return Err(HttpError::Auth("no valid GitLab credentials available".to_string()));
        }

        let url = format!("{}/api/v4/{}", self.base_url, endpoint);
        debug!(endpoint = %endpoint, "sending request to GitLab API");

        let response = self
            .http
            .get(&url)
            .header("PRIVATE-TOKEN", &creds.token)
            .send()
            .await
            .map_err(HttpError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HttpError::Status(status, body));
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        retry_with_backoff(self.retry, SERVICE, retryable, || async {
            let response = self.attempt(endpoint).await?;
            response.json::<T>().await.map_err(HttpError::Transport)
        })
        .await
        .map_err(to_error)
    }

    async fn get_text(&self, endpoint: &str) -> Result<String> {
        retry_with_backoff(self.retry, SERVICE, retryable, || async {
            let response = self.attempt(endpoint).await?;
            response.text().await.map_err(HttpError::Transport)
        })
        .await
        .map_err(to_error)
    }
}

#[async_trait]
impl SourceHostClient for GitLabClient {
    async fn get_project(&self, project: &str) -> Result<GitLabProject> {
        self.get_json(&format!("projects/{}", encode_project(project))).await
    }

    async fn get_project_by_path(&self, path: &str) -> Result<GitLabProject> {
        self.get_json(&format!("projects/{}", encode_project(path))).await
    }

    async fn get_commit(&self, project: &str, sha: &str) -> Result<GitLabCommit> {
        self.get_json(&format!("projects/{}/repository/commits/{sha}", encode_project(project)))
            .await
    }

    async fn get_commit_diff(&self, project: &str, sha: &str) -> Result<Vec<GitLabDiff>> {
        self.get_json(&format!(
            "projects/{}/repository/commits/{sha}/diff",
            encode_project(project)
        ))
        .await
    }

    async fn list_pipelines(&self, project: &str) -> Result<Vec<GitLabPipeline>> {
        self.get_json(&format!(
            "projects/{}/pipelines?order_by=id&sort=desc&per_page=20",
            encode_project(project)
        ))
        .await
    }

    async fn recent_deployments(
        &self,
        project: &str,
        environment: &str,
    ) -> Result<Vec<GitLabDeployment>> {
        self.get_json(&format!(
            "projects/{}/deployments?environment={environment}&order_by=created_at&sort=desc&per_page=10",
            encode_project(project)
        ))
        .await
    }

    async fn recent_commits(&self, project: &str, since: DateTime<Utc>) -> Result<Vec<GitLabCommit>> {
        let since = since.to_rfc3339_opts(SecondsFormat::Secs, true);
        self.get_json(&format!(
            "projects/{}/repository/commits?since={since}&per_page=20",
            encode_project(project)
        ))
        .await
    }

    async fn get_merge_request_changes(&self, project: &str, iid: u64) -> Result<GitLabMergeRequest> {
        self.get_json(&format!("projects/{}/merge_requests/{iid}/changes", encode_project(project)))
            .await
    }

    async fn get_merge_request_commits(&self, project: &str, iid: u64) -> Result<Vec<GitLabCommit>> {
        self.get_json(&format!("projects/{}/merge_requests/{iid}/commits", encode_project(project)))
            .await
    }

    async fn get_file_content(&self, project: &str, path: &str, reference: &str) -> Result<String> {
        let mut endpoint = format!(
            "projects/{}/repository/files/{}/raw",
            encode_project(project),
            encode_path(path)
        );
        if !reference.is_empty() {
            endpoint.push_str(&format!("?ref={reference}"));
        }
        self.get_text(&endpoint).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_paths_are_encoded_as_one_segment() {
        assert_eq!(encode_project("platform/web"), "platform%2Fweb");
        assert_eq!(encode_project("1234"), "1234");
    }

    #[test]
    fn file_paths_encode_slashes_and_dots() {
        assert_eq!(encode_path("charts/web/Chart.yaml"), "charts%2Fweb%2FChart%2Eyaml");
    }
}
