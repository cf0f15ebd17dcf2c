//! Argo CD REST API client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::auth::{CredentialStore, Service};
use crate::config::ArgoCdConfig;
use crate::error::{Error, Result};
use crate::models::{ArgoApplication, ArgoResourceTree, ArgoSyncHistoryEntry};
use crate::util::retry::{retry_with_backoff, transient_status, RetryPolicy};

use super::GitOpsClient;

const SERVICE: &str = "argocd";

/// Session tokens issued by `/api/v1/session` last 24 hours by default.
const SESSION_LIFETIME_HOURS: i64 = 24;

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
        HttpError::Status(code, body) if code == StatusCode::UNAUTHORIZED => {
            Error::UpstreamAuth { service: SERVICE, message: body }
        }
        HttpError::Status(code, body) => Error::upstream(SERVICE, format!("status {code}: {body}")),
        HttpError::Auth(msg) => Error::UpstreamAuth { service: SERVICE, message: msg },
    }
}

/// Client for the Argo CD REST API.
///
/// Authenticates with a bearer token from the credential store; on 401 it
/// creates a fresh session from username/password, stores the new token,
/// and retries the request once. Transient failures retry with backoff.
pub struct ArgoClient {
    base_url: String,
    http: reqwest::Client,
    credentials: Arc<dyn CredentialStore>,
    retry: RetryPolicy,
}

impl ArgoClient {
    pub fn new(config: &ArgoCdConfig, credentials: Arc<dyn CredentialStore>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .danger_accept_invalid_certs(config.insecure)
            .build()
            .map_err(|err| Error::upstream(SERVICE, err))?;
        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            http,
            credentials,
            retry: RetryPolicy::default(),
        })
    }

    /// Probe `/api/version`, used by the health endpoint.
    pub async fn check_connectivity(&self) -> Result<()> {
        #[derive(Deserialize)]
        struct Version {
            #[serde(default, rename = "Version")]
            _version: String,
        }
        let _: Version = self.get_json("/api/version").await?;
        Ok(())
    }

    async fn bearer_token(&self) -> std::result::Result<String, HttpError> {
        let creds = self
            .credentials
            .get(Service::ArgoCd)
            .await
            .map_err(|err| HttpError::Auth(err.to_string()))?;
        if !creds.token.is_empty() && !creds.is_expired() {
            return Ok(creds.token);
        }
        if !creds.username.is_empty() && !creds.password.is_empty() {
            return self.create_session(&creds.username, &creds.password).await;
        }
        Err(HttpError::Auth("no valid Argo CD credentials available".to_string()))
    }

    /// Create a session token from username/password and store it.
    async fn create_session(
        &self,
        username: &str,
        password: &str,
    ) -> std::result::Result<String, HttpError> {
        #[derive(Serialize)]
        struct SessionRequest<'a> {
            username: &'a str,
            password: &'a str,
        }
        #[derive(Deserialize)]
        struct SessionResponse {
            token: String,
        }

        let url = format!("{}/api/v1/session", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&SessionRequest { username, password })
            .send()
            .await
            .map_err(HttpError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HttpError::Auth(format!("session creation failed (status {status}): {body}")));
        }
        let session: SessionResponse =
            response.json().await.map_err(HttpError::Transport)?;

        let expiry = Utc::now() + chrono::Duration::hours(SESSION_LIFETIME_HOURS);
        if let Err(err) = self
            .credentials
            .update_token(Service::ArgoCd, session.token.clone(), Some(expiry))
            .await
        {
            warn!(error = %err, "failed to store refreshed Argo CD token");
        }
        Ok(session.token)
    }

    async fn attempt_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
    ) -> std::result::Result<T, HttpError> {
        let token = self.bearer_token().await?;
        let url = format!("{}{}", self.base_url, endpoint);
        debug!(endpoint = %endpoint, "sending request to Argo CD API");

        let response = self
            .http
            .get(&url)
            .bearer_auth(&token)
            .header("Cookie", format!("argocd.token={token}"))
            .send()
            .await
            .map_err(HttpError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HttpError::Status(status, body));
        }
        response.json().await.map_err(HttpError::Transport)
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let result = retry_with_backoff(self.retry, SERVICE, retryable, || {
            self.attempt_json::<T>(endpoint)
        })
        .await;

        match result {
            Err(HttpError::Status(code, _)) if code == StatusCode::UNAUTHORIZED => {
                debug!(endpoint = %endpoint, "received 401 from Argo CD, refreshing session");
                let creds = self
                    .credentials
                    .get(Service::ArgoCd)
                    .await
                    .map_err(|err| Error::UpstreamAuth { service: SERVICE, message: err.to_string() })?;
                if creds.username.is_empty() || creds.password.is_empty() {
                    return Err(Error::UpstreamAuth {
                        service: SERVICE,
                        message: "401 and no username/password to refresh session".to_string(),
                    });
                }
                self.create_session(&creds.username, &creds.password)
                    .await
                    .map_err(to_error)?;
                self.attempt_json(endpoint).await.map_err(to_error)
            }
            other => other.map_err(to_error),
        }
    }
}

#[async_trait]
impl GitOpsClient for ArgoClient {
    async fn list_applications(&self) -> Result<Vec<ArgoApplication>> {
        #[derive(Deserialize)]
        struct Applications {
            #[serde(default)]
            items: Vec<ArgoApplication>,
        }
        let result: Applications = self.get_json("/api/v1/applications").await?;
        debug!(count = result.items.len(), "listed Argo CD applications");
        Ok(result.items)
    }

    async fn get_application(&self, name: &str) -> Result<ArgoApplication> {
        self.get_json(&format!("/api/v1/applications/{name}")).await
    }

    async fn resource_tree(&self, name: &str) -> Result<ArgoResourceTree> {
        self.get_json(&format!("/api/v1/applications/{name}/resource-tree")).await
    }

    async fn applications_by_resource(
        &self,
        kind: &str,
        name: &str,
        namespace: &str,
    ) -> Result<Vec<ArgoApplication>> {
        #[derive(Deserialize)]
        struct AppRef {
            name: String,
        }

        // Native lookup first; the endpoint is not available on all
        // Argo CD versions.
        let endpoint = format!("/api/v1/applications/resource/{kind}/{namespace}/{name}");
        match self.get_json::<Vec<AppRef>>(&endpoint).await {
            Ok(refs) if !refs.is_empty() => {
                let mut apps = Vec::new();
                for app_ref in refs {
                    match self.get_application(&app_ref.name).await {
                        Ok(app) => apps.push(app),
                        Err(err) => {
                            warn!(application = %app_ref.name, error = %err, "failed to fetch application details")
                        }
                    }
                }
                return Ok(apps);
            }
            Ok(_) => debug!("resource lookup returned no applications, scanning trees"),
            Err(err) => {
                debug!(error = %err, "resource lookup unavailable, scanning trees")
            }
        }

        // Fallback: scan every application's resource tree for a match.
        let apps = self.list_applications().await?;
        let mut matching = Vec::new();
        for app in apps {
            let tree = match self.resource_tree(app.name()).await {
                Ok(tree) => tree,
                Err(err) => {
                    warn!(application = %app.name(), error = %err, "failed to get resource tree");
                    continue;
                }
            };
            if tree.contains(kind, name, namespace) {
                matching.push(app);
            }
        }
        debug!(kind = %kind, name = %name, count = matching.len(), "found applications by tree scan");
        Ok(matching)
    }

    async fn application_history(&self, name: &str) -> Result<Vec<ArgoSyncHistoryEntry>> {
        #[derive(Deserialize)]
        struct History {
            #[serde(default)]
            history: Vec<ArgoSyncHistoryEntry>,
        }
        let result: History = self.get_json(&format!("/api/v1/applications/{name}/history")).await?;
        Ok(result.history)
    }
}
