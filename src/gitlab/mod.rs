//! Source-control host access: the `SourceHostClient` capability and the
//! GitLab v4 implementation.

pub mod client;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{
    GitLabCommit, GitLabDeployment, GitLabDiff, GitLabMergeRequest, GitLabPipeline, GitLabProject,
};

pub use client::GitLabClient;

/// Read-only access to the source-control host.
///
/// `project` accepts a numeric ID or a URL-encodable `namespace/project`
/// path.
#[async_trait]
pub trait SourceHostClient: Send + Sync {
    async fn get_project(&self, project: &str) -> Result<GitLabProject>;

    async fn get_project_by_path(&self, path: &str) -> Result<GitLabProject>;

    async fn get_commit(&self, project: &str, sha: &str) -> Result<GitLabCommit>;

    async fn get_commit_diff(&self, project: &str, sha: &str) -> Result<Vec<GitLabDiff>>;

    /// Pipelines, newest first.
    async fn list_pipelines(&self, project: &str) -> Result<Vec<GitLabPipeline>>;

    /// Deployments to one environment, newest first.
    async fn recent_deployments(&self, project: &str, environment: &str) -> Result<Vec<GitLabDeployment>>;

    /// Commits since a point in time.
    async fn recent_commits(&self, project: &str, since: DateTime<Utc>) -> Result<Vec<GitLabCommit>>;

    /// A merge request with its file changes populated.
    async fn get_merge_request_changes(&self, project: &str, iid: u64) -> Result<GitLabMergeRequest>;

    /// Commits of a merge request, newest first.
    async fn get_merge_request_commits(&self, project: &str, iid: u64) -> Result<Vec<GitLabCommit>>;

    /// Raw file content at a ref.
    async fn get_file_content(&self, project: &str, path: &str, reference: &str) -> Result<String>;
}
