//! Server configuration: YAML file plus environment overrides.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub server: ServerConfig,
    pub kubernetes: KubernetesConfig,
    pub argocd: ArgoCdConfig,
    pub gitlab: GitLabConfig,
    pub claude: ClaudeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    /// Bind address, e.g. `0.0.0.0:8080`.
    pub address: String,
    /// API key required on every non-health route; empty disables auth.
    pub api_key: String,
    /// Hard bound on formatted context documents, in characters.
    pub max_context_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { address: "0.0.0.0:8080".to_string(), api_key: String::new(), max_context_size: 100_000 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KubernetesConfig {
    pub kubeconfig: String,
    pub in_cluster: bool,
    pub default_namespace: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArgoCdConfig {
    pub url: String,
    pub auth_token: String,
    pub username: String,
    pub password: String,
    /// Skip TLS verification for self-signed Argo CD endpoints.
    pub insecure: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GitLabConfig {
    pub url: String,
    pub auth_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClaudeConfig {
    pub api_key: String,
    pub base_url: String,
    pub model_id: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl Default for ClaudeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.anthropic.com".to_string(),
            model_id: String::new(),
            max_tokens: 4096,
            temperature: 0.3,
        }
    }
}

impl Config {
    /// Read configuration from a YAML file, then apply env overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())
            .map_err(|err| Error::Config(format!("reading {}: {err}", path.as_ref().display())))?;
        let mut config: Config = serde_yaml::from_str(&data)
            .map_err(|err| Error::Config(format!("parsing {}: {err}", path.as_ref().display())))?;
        config.apply_env();
        Ok(config)
    }

    /// Environment variables override file values when present.
    pub fn apply_env(&mut self) {
        override_from_env(&mut self.kubernetes.kubeconfig, "KUBECONFIG");
        override_from_env(&mut self.argocd.url, "ARGOCD_SERVER");
        override_from_env(&mut self.argocd.auth_token, "ARGOCD_AUTH_TOKEN");
        override_from_env(&mut self.argocd.username, "ARGOCD_USERNAME");
        override_from_env(&mut self.argocd.password, "ARGOCD_PASSWORD");
        override_from_env(&mut self.gitlab.url, "GITLAB_URL");
        override_from_env(&mut self.gitlab.auth_token, "GITLAB_AUTH_TOKEN");
        override_from_env(&mut self.claude.api_key, "CLAUDE_API_KEY");
        override_from_env(&mut self.claude.model_id, "CLAUDE_MODEL_ID");
        override_from_env(&mut self.server.api_key, "OPSLENS_API_KEY");
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.address.is_empty() {
            return Err(Error::Config("server address is required".into()));
        }
        if self.claude.api_key.is_empty() {
            return Err(Error::Config("Claude API key is required".into()));
        }
        if self.claude.model_id.is_empty() {
            return Err(Error::Config("Claude model ID is required".into()));
        }
        Ok(())
    }
}

fn override_from_env(target: &mut String, var: &str) {
    if let Ok(value) = env::var(var) {
        if !value.is_empty() {
            *target = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
server:
  address: "0.0.0.0:9000"
  apiKey: "secret"
argocd:
  url: "https://argocd.example.com"
  username: "admin"
  password: "hunter2"
gitlab:
  url: "https://gitlab.example.com"
  authToken: "glpat-abc"
claude:
  apiKey: "sk-ant-xyz"
  modelId: "claude-sonnet-4-20250514"
"#;

    #[test]
    fn parses_yaml_with_defaults() {
        let config: Config = serde_yaml::from_str(SAMPLE).unwrap();
        assert_eq!(config.server.address, "0.0.0.0:9000");
        assert_eq!(config.server.max_context_size, 100_000);
        assert_eq!(config.argocd.username, "admin");
        assert_eq!(config.claude.base_url, "https://api.anthropic.com");
        assert!((config.claude.temperature - 0.3).abs() < f64::EPSILON);
        config.validate().unwrap();
    }

    #[test]
    fn validation_requires_claude_settings() {
        let mut config: Config = serde_yaml::from_str(SAMPLE).unwrap();
        config.claude.api_key.clear();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Claude API key"));

        let mut config: Config = serde_yaml::from_str(SAMPLE).unwrap();
        config.claude.model_id.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_document_gets_full_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.server.address, "0.0.0.0:8080");
        assert!(config.validate().is_err());
    }
}
