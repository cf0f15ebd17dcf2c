//! Credential management for upstream services.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::config::Config;
use crate::error::{Error, Result};

/// Services the engine holds credentials for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    Kubernetes,
    ArgoCd,
    GitLab,
    Claude,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Kubernetes => "kubernetes",
            Service::ArgoCd => "argocd",
            Service::GitLab => "gitlab",
            Service::Claude => "claude",
        }
    }
}

/// Authentication material for one service. Unused fields stay empty.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub token: String,
    pub api_key: String,
    pub username: String,
    pub password: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(at) => Utc::now() > at,
            None => false,
        }
    }
}

/// Capability for retrieving and refreshing credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, service: Service) -> Result<Credentials>;

    /// Store a refreshed session token, e.g. after an Argo CD 401.
    async fn update_token(&self, service: Service, token: String, expires_at: Option<DateTime<Utc>>) -> Result<()>;
}

/// Credential store seeded from configuration, with in-memory refresh.
pub struct StaticCredentialProvider {
    credentials: RwLock<HashMap<Service, Credentials>>,
}

impl StaticCredentialProvider {
    pub fn from_config(config: &Config) -> Self {
        let mut credentials = HashMap::new();
        credentials.insert(
            Service::ArgoCd,
            Credentials {
                token: config.argocd.auth_token.clone(),
                username: config.argocd.username.clone(),
                password: config.argocd.password.clone(),
                ..Default::default()
            },
        );
        credentials.insert(
            Service::GitLab,
            Credentials { token: config.gitlab.auth_token.clone(), ..Default::default() },
        );
        credentials.insert(
            Service::Claude,
            Credentials { api_key: config.claude.api_key.clone(), ..Default::default() },
        );
        credentials.insert(Service::Kubernetes, Credentials::default());
        Self { credentials: RwLock::new(credentials) }
    }

    /// Empty provider, useful in tests.
    pub fn empty() -> Self {
        Self { credentials: RwLock::new(HashMap::new()) }
    }

    pub async fn insert(&self, service: Service, creds: Credentials) {
        self.credentials.write().await.insert(service, creds);
    }
}

#[async_trait]
impl CredentialStore for StaticCredentialProvider {
    async fn get(&self, service: Service) -> Result<Credentials> {
        let credentials = self.credentials.read().await;
        credentials.get(&service).cloned().ok_or_else(|| Error::UpstreamAuth {
            service: service.as_str(),
            message: "no credentials configured".to_string(),
        })
    }

    async fn update_token(&self, service: Service, token: String, expires_at: Option<DateTime<Utc>>) -> Result<()> {
        let mut credentials = self.credentials.write().await;
        let entry = credentials.entry(service).or_default();
        entry.token = token;
        entry.expires_at = expires_at;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn missing_credentials_is_an_auth_error() {
        let provider = StaticCredentialProvider::empty();
        let err = provider.get(Service::GitLab).await.unwrap_err();
        assert_eq!(err.wire_code(), "upstream_auth");
    }

    #[tokio::test]
    async fn update_token_replaces_and_sets_expiry() {
        let provider = StaticCredentialProvider::empty();
        provider
            .insert(Service::ArgoCd, Credentials { username: "admin".into(), ..Default::default() })
            .await;

        let expiry = Utc::now() + Duration::hours(24);
        provider.update_token(Service::ArgoCd, "session-token".into(), Some(expiry)).await.unwrap();

        let creds = provider.get(Service::ArgoCd).await.unwrap();
        assert_eq!(creds.token, "session-token");
        assert_eq!(creds.username, "admin");
        assert!(!creds.is_expired());
    }

    #[test]
    fn expiry_check() {
        let expired = Credentials { expires_at: Some(Utc::now() - Duration::minutes(1)), ..Default::default() };
        assert!(expired.is_expired());
        let fresh = Credentials::default();
        assert!(!fresh.is_expired());
    }
}
