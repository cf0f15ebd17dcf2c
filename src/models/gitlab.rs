//! GitLab API model types.
//!
//! Field names follow the GitLab v4 JSON shapes. Timestamps that GitLab
//! reports inconsistently (integer epoch, float epoch, or RFC 3339 string
//! depending on endpoint and version) are kept as raw JSON values and
//! interpreted at render time.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitLabProject {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub path_with_namespace: String,
    #[serde(default)]
    pub web_url: String,
    #[serde(default)]
    pub default_branch: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitLabPipeline {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub r#ref: String,
    #[serde(default)]
    pub sha: String,
    #[serde(default)]
    pub web_url: String,
    #[serde(default)]
    pub created_at: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitLabCommit {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub short_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub author_name: String,
    #[serde(default)]
    pub created_at: Value,
    #[serde(default)]
    pub web_url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitLabDiff {
    #[serde(default)]
    pub old_path: String,
    #[serde(default)]
    pub new_path: String,
    #[serde(default)]
    pub diff: String,
    #[serde(default)]
    pub new_file: bool,
    #[serde(default)]
    pub renamed_file: bool,
    #[serde(default)]
    pub deleted_file: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitLabEnvironment {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitLabDeployment {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub created_at: Value,
    #[serde(default)]
    pub environment: GitLabEnvironment,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitLabDiffRefs {
    #[serde(default)]
    pub base_sha: String,
    #[serde(default)]
    pub head_sha: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitLabMergeRequest {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub iid: u64,
    #[serde(default)]
    pub project_id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub source_branch: String,
    #[serde(default)]
    pub target_branch: String,
    #[serde(default)]
    pub web_url: String,
    #[serde(default)]
    pub changes: Vec<GitLabDiff>,
    #[serde(default)]
    pub diff_refs: GitLabDiffRefs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_created_at_accepts_all_shapes() {
        let int: GitLabPipeline =
            serde_json::from_str(r#"{"id":1,"status":"success","created_at":1735689600}"#).unwrap();
        assert!(int.created_at.is_i64());

        let float: GitLabPipeline =
            serde_json::from_str(r#"{"id":2,"status":"failed","created_at":1735689600.5}"#).unwrap();
        assert!(float.created_at.is_f64());

        let string: GitLabPipeline = serde_json::from_str(
            r#"{"id":3,"status":"running","created_at":"2025-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert!(string.created_at.is_string());
    }

    #[test]
    fn merge_request_changes_default_empty() {
        let mr: GitLabMergeRequest =
            serde_json::from_str(r#"{"iid":12,"title":"Bump chart"}"#).unwrap();
        assert_eq!(mr.iid, 12);
        assert!(mr.changes.is_empty());
    }
}
