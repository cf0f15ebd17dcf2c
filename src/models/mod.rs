//! Wire-level and join-record data model.

pub mod argocd;
pub mod context;
pub mod gitlab;
pub mod kubernetes;

pub use argocd::{ArgoApplication, ArgoResourceNode, ArgoResourceTree, ArgoSyncHistoryEntry};
pub use context::{
    HealthStatus, Issue, IssueCategory, IssueSource, IssueSeverity, NamespaceAnalysis,
    NamespaceTopology, Relationship, ResourceContext, TroubleshootReport,
};
pub use gitlab::{
    GitLabCommit, GitLabDeployment, GitLabDiff, GitLabMergeRequest, GitLabPipeline, GitLabProject,
};
pub use kubernetes::{EventObject, K8sEvent};
