//! Cluster access: the `ClusterClient` capability, the kube-rs backed
//! implementation, kind resolution, and namespace topology mapping.

pub mod client;
pub mod resolver;
pub mod resource;
pub mod topology;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::K8sEvent;

pub use client::KubeClusterClient;
pub use resolver::{KindResolver, ResolvedKind};
pub use resource::{OwnerRef, RawResource};
pub use topology::TopologyMapper;

/// One API resource as reported by discovery.
#[derive(Debug, Clone)]
pub struct ApiResourceInfo {
    /// Plural resource name (`deployments`). Sub-resources contain `/`.
    pub name: String,
    /// Singular name when the server reports one; may be empty.
    pub singular_name: String,
    pub kind: String,
    pub verbs: Vec<String>,
    pub namespaced: bool,
}

impl ApiResourceInfo {
    pub fn listable(&self) -> bool {
        self.verbs.iter().any(|v| v == "list")
    }
}

/// One group/version with its resources, as reported by discovery.
#[derive(Debug, Clone)]
pub struct ApiGroupResources {
    /// `v1` or `group/version`.
    pub group_version: String,
    pub resources: Vec<ApiResourceInfo>,
}

/// Read-only access to a Kubernetes cluster.
///
/// `kind` arguments accept any case and singular or plural spellings;
/// implementations resolve them through discovery.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// The preferred-resource catalog for the cluster.
    async fn discover(&self) -> Result<Vec<ApiGroupResources>>;

    /// Fetch a single object. `namespace` is empty for cluster-scoped kinds.
    async fn get(&self, kind: &str, namespace: &str, name: &str) -> Result<RawResource>;

    /// List objects of a kind, optionally namespace-scoped.
    async fn list(&self, kind: &str, namespace: &str) -> Result<Vec<RawResource>>;

    /// Events for a resource (or a whole namespace when `kind` and `name`
    /// are empty), sorted most-recent-first.
    async fn events(&self, namespace: &str, kind: &str, name: &str) -> Result<Vec<K8sEvent>>;

    /// Names of all namespaces.
    async fn namespaces(&self) -> Result<Vec<String>>;
}
