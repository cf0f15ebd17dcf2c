//! Argo CD API model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An Argo CD application as returned by `/api/v1/applications`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArgoApplication {
    #[serde(default)]
    pub metadata: ArgoMetadata,
    #[serde(default)]
    pub spec: ArgoSpec,
    #[serde(default)]
    pub status: ArgoStatus,
}

impl ArgoApplication {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArgoMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArgoSpec {
    #[serde(default)]
    pub source: ArgoSource,
    #[serde(default)]
    pub destination: ArgoDestination,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArgoSource {
    #[serde(default, rename = "repoURL")]
    pub repo_url: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub target_revision: String,
    #[serde(default)]
    pub chart: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArgoDestination {
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub namespace: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArgoStatus {
    #[serde(default)]
    pub sync: ArgoSyncStatus,
    #[serde(default)]
    pub health: ArgoHealthStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArgoSyncStatus {
    /// `Synced`, `OutOfSync`, `Unknown`.
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub revision: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArgoHealthStatus {
    /// `Healthy`, `Progressing`, `Degraded`, `Missing`, `Unknown`.
    #[serde(default)]
    pub status: String,
}

/// One entry of an application's sync history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArgoSyncHistoryEntry {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub revision: String,
    #[serde(default)]
    pub deployed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: String,
}

/// One node of an application's resource tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArgoResourceNode {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
}

/// The set of cluster resources an application manages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArgoResourceTree {
    #[serde(default)]
    pub nodes: Vec<ArgoResourceNode>,
}

impl ArgoResourceTree {
    /// Whether the tree contains a resource, matching kind case-insensitively
    /// and the namespace only when one is given.
    pub fn contains(&self, kind: &str, name: &str, namespace: &str) -> bool {
        self.nodes.iter().any(|node| {
            node.kind.eq_ignore_ascii_case(kind)
                && node.name == name
                && (namespace.is_empty() || node.namespace == namespace)
        })
    }
}
