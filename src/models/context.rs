//! The join records produced by correlation and consumed by the assembler.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use super::argocd::{ArgoApplication, ArgoSyncHistoryEntry};
use super::gitlab::{GitLabCommit, GitLabDeployment, GitLabPipeline, GitLabProject};
use super::kubernetes::K8sEvent;

/// Sync history and recent-commit lists are capped at this many entries,
/// newest first.
pub const HISTORY_CAP: usize = 5;

/// Cross-system context for one Kubernetes resource.
///
/// `kind`, `name` and `namespace` are always populated; everything else is
/// best-effort, with collection failures accumulated in `errors`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContext {
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    /// Derived per-kind metadata (replica counts, container summaries,
    /// namespace topology digests).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
    /// JSON-serialised raw object, bounded.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_data: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub argo_application: Option<ArgoApplication>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub argo_sync_status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub argo_health_status: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub argo_sync_history: Vec<ArgoSyncHistoryEntry>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gitlab_project: Option<GitLabProject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_pipeline: Option<GitLabPipeline>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_deployment: Option<GitLabDeployment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recent_commits: Vec<GitLabCommit>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<K8sEvent>,
    /// Entries of the form `Kind/Name` or `Namespace/Kind/Name`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_resources: Vec<String>,
    /// Non-fatal collection failures, surfaced so the analysis can caveat
    /// the data gaps.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    /// Classifier output; empty when classification found nothing.
    #[serde(default)]
    pub issues: Vec<Issue>,
}

impl ResourceContext {
    pub fn new(kind: impl Into<String>, name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self { kind: kind.into(), name: name.into(), namespace: namespace.into(), ..Default::default() }
    }
}

/// Render an enum through its serde name. Categories and severities share
/// their wire spelling with their display form.
macro_rules! fmt_via_serde_name {
    () => {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let name = serde_json::to_value(self).map_err(|_| fmt::Error)?;
            match name.as_str() {
                Some(s) => write!(f, "{s}"),
                None => Err(fmt::Error),
            }
        }
    };
}

/// Where an issue was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssueSource {
    Kubernetes,
    GitOps,
    SourceHost,
}

impl fmt::Display for IssueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueSource::Kubernetes => write!(f, "Kubernetes"),
            IssueSource::GitOps => write!(f, "GitOps"),
            IssueSource::SourceHost => write!(f, "SourceHost"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IssueSeverity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for IssueSeverity {
    fmt_via_serde_name!();
}

/// Closed category set used for recommendation lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssueCategory {
    ImagePullError,
    HealthCheckFailure,
    ResourceIssue,
    CrashLoopBackOff,
    SyncIssue,
    HealthIssue,
    SyncFailure,
    PipelineIssue,
    DeploymentIssue,
    PodNotRunning,
    PodNotReady,
    PodInitializing,
    InitializationIssue,
    ContainerReadinessIssue,
    VolumeIssue,
    SchedulingIssue,
    DeploymentNotAvailable,
    DeploymentNotReady,
    DeploymentNotProgressing,
    ContainerWaiting,
    ContainerTerminated,
    FrequentRestarts,
    UnknownIssue,
    OtherWarning,
}

impl fmt::Display for IssueCategory {
    fmt_via_serde_name!();
}

/// A discovered problem on a resource or its delivery pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub title: String,
    pub category: IssueCategory,
    pub severity: IssueSeverity,
    pub source: IssueSource,
    pub description: String,
}

/// Troubleshooting output: the context plus classified issues and the
/// deduplicated recommendation set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TroubleshootReport {
    pub resource_context: ResourceContext,
    pub issues: Vec<Issue>,
    pub recommendations: Vec<String>,
}

/// A typed edge between two resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub source_kind: String,
    pub source_name: String,
    pub source_namespace: String,
    pub target_kind: String,
    pub target_name: String,
    pub target_namespace: String,
    /// `owns`, `selects`, `mounts`, `configures`, `binds` or `routes`.
    pub relation_type: String,
}

impl Relationship {
    /// Full 7-tuple key used for deduplication.
    pub fn dedup_key(&self) -> String {
        format!(
            "{}/{}/{}/{}/{}/{}/{}",
            self.source_kind,
            self.source_name,
            self.source_namespace,
            self.target_kind,
            self.target_name,
            self.target_namespace,
            self.relation_type
        )
    }
}

/// Per-resource health classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Progressing,
    Unhealthy,
    Unknown,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Progressing => write!(f, "progressing"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
            HealthStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Snapshot of one namespace: what exists, how healthy it is, and how the
/// pieces connect.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NamespaceTopology {
    pub namespace: String,
    /// Kind → resource names, in upstream list order per kind.
    pub resources: BTreeMap<String, Vec<String>>,
    /// Kind → name → health status.
    pub health: BTreeMap<String, BTreeMap<String, HealthStatus>>,
    pub relationships: Vec<Relationship>,
}

impl NamespaceTopology {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), ..Default::default() }
    }
}

/// Structured result of a namespace-wide analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceAnalysis {
    pub namespace: String,
    pub resource_counts: BTreeMap<String, usize>,
    /// Kind → status → count.
    pub health_status: BTreeMap<String, BTreeMap<String, usize>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub analysis: String,
}
