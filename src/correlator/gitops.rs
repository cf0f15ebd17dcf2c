//! GitOps correlation.
//!
//! Joins a Kubernetes resource to the Argo CD application managing it and
//! the GitLab project, pipelines, deployments, and commits behind that
//! application. Every correlation step is best-effort: failures accumulate
//! in `ResourceContext.errors` so downstream analysis can see the gaps.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::argocd::GitOpsClient;
use crate::error::Result;
use crate::gitlab::SourceHostClient;
use crate::kube::{ClusterClient, RawResource};
use crate::models::context::HISTORY_CAP;
use crate::models::{ArgoApplication, GitLabDiff, ResourceContext};
use crate::util::truncate::truncate_content;

use super::helm::HelmCorrelator;

/// Bound on the raw-object JSON attached to a context.
const RESOURCE_DATA_LIMIT: usize = 20_000;

/// Recent-commit window used when tracing a resource.
const RECENT_COMMIT_WINDOW_HOURS: i64 = 24;

/// A source-control change under analysis.
#[derive(Debug, Clone)]
pub enum ChangeRef {
    Commit(String),
    MergeRequest(u64),
}

impl ChangeRef {
    /// The synthetic related-resource entry identifying this change.
    pub fn related_resource_entry(&self) -> String {
        match self {
            ChangeRef::Commit(sha) => format!("Commit/{sha}"),
            ChangeRef::MergeRequest(iid) => format!("MergeRequest/{iid}"),
        }
    }
}

/// Correlates cluster, GitOps, and source-host state.
pub struct GitOpsCorrelator {
    cluster: Arc<dyn ClusterClient>,
    gitops: Arc<dyn GitOpsClient>,
    source: Arc<dyn SourceHostClient>,
    helm: HelmCorrelator,
}

impl GitOpsCorrelator {
    pub fn new(
        cluster: Arc<dyn ClusterClient>,
        gitops: Arc<dyn GitOpsClient>,
        source: Arc<dyn SourceHostClient>,
    ) -> Self {
        let helm = HelmCorrelator::new(source.clone());
        Self { cluster, gitops, source, helm }
    }

    /// Build the cross-system context for one resource. Never fails; every
    /// unavailable input becomes an entry in the returned context's
    /// `errors`.
    pub async fn trace_resource(&self, kind: &str, namespace: &str, name: &str) -> ResourceContext {
        info!(kind = %kind, name = %name, namespace = %namespace, "tracing resource");
        let mut rc = ResourceContext::new(kind, name, namespace);
        let mut errors = Vec::new();

        match self.cluster.get(kind, namespace, name).await {
            Ok(resource) => {
                rc.api_version = resource.api_version().unwrap_or_default().to_string();
                rc.metadata = resource_metadata(&resource);
                match serde_json::to_string_pretty(resource.value()) {
                    Ok(raw) => rc.resource_data = truncate_content(&raw, RESOURCE_DATA_LIMIT),
                    Err(err) => errors.push(format!("Failed to serialize resource: {err}")),
                }

                match self.cluster.events(namespace, kind, name).await {
                    Ok(events) => rc.events = events,
                    Err(err) => {
                        let message = format!("Failed to get resource events: {err}");
                        warn!(kind = %kind, name = %name, error = %err, "event collection failed");
                        errors.push(message);
                    }
                }
            }
            Err(err) => {
                let message = format!("Failed to get Kubernetes resource: {err}");
                warn!(kind = %kind, name = %name, error = %err, "resource fetch failed");
                errors.push(message);
            }
        }

        match self.gitops.applications_by_resource(kind, name, namespace).await {
            // The first managing application wins.
            Ok(mut apps) if !apps.is_empty() => {
                let app = apps.remove(0);
                self.attach_gitops_context(&mut rc, app, &mut errors).await;
            }
            Ok(_) => debug!(kind = %kind, name = %name, "no managing application found"),
            Err(err) => {
                errors.push(format!("Failed to find GitOps applications: {err}"));
                warn!(kind = %kind, name = %name, error = %err, "application lookup failed");
            }
        }

        rc.errors = errors;
        info!(
            kind = %kind,
            name = %name,
            managed = rc.argo_application.is_some(),
            project = rc.gitlab_project.is_some(),
            errors = rc.errors.len(),
            "resource traced"
        );
        rc
    }

    /// Copy sync state from the managing application and follow its source
    /// URL into the source host.
    async fn attach_gitops_context(
        &self,
        rc: &mut ResourceContext,
        app: ArgoApplication,
        errors: &mut Vec<String>,
    ) {
        rc.argo_sync_status = app.status.sync.status.clone();
        rc.argo_health_status = app.status.health.status.clone();
        debug!(
            application = %app.name(),
            sync = %rc.argo_sync_status,
            health = %rc.argo_health_status,
            "found managing application"
        );

        match self.gitops.application_history(app.name()).await {
            Ok(mut history) => {
                history.sort_by(|a, b| b.id.cmp(&a.id));
                history.truncate(HISTORY_CAP);
                rc.argo_sync_history = history;
            }
            Err(err) => errors.push(format!("Failed to get application history: {err}")),
        }

        let repo_url = app.spec.source.repo_url.clone();
        let environment = extract_environment(&app);
        rc.argo_application = Some(app);

        if repo_url.is_empty() {
            return;
        }
        let project_path = extract_project_path(&repo_url);
        if project_path.is_empty() {
            return;
        }

        let project = match self.source.get_project_by_path(&project_path).await {
            Ok(project) => project,
            Err(err) => {
                errors.push(format!("Failed to get source project: {err}"));
                return;
            }
        };
        let project_id = project.id.to_string();
        rc.gitlab_project = Some(project);

        match self.source.list_pipelines(&project_id).await {
            Ok(pipelines) => rc.last_pipeline = pipelines.into_iter().next(),
            Err(err) => errors.push(format!("Failed to list pipelines: {err}")),
        }

        if !environment.is_empty() {
            match self.source.recent_deployments(&project_id, &environment).await {
                Ok(deployments) => rc.last_deployment = deployments.into_iter().next(),
                Err(err) => errors.push(format!("Failed to find deployments: {err}")),
            }
        }

        let since = Utc::now() - Duration::hours(RECENT_COMMIT_WINDOW_HOURS);
        match self.source.recent_commits(&project_id, since).await {
            Ok(mut commits) => {
                commits.truncate(HISTORY_CAP);
                rc.recent_commits = commits;
            }
            Err(err) => errors.push(format!("Failed to find recent commits: {err}")),
        }
    }

    /// Find the resources affected by a commit or merge request and trace
    /// each one.
    pub async fn change_impact(
        &self,
        project: &str,
        change: &ChangeRef,
    ) -> Result<Vec<ResourceContext>> {
        let (diffs, helm_identifiers) = match change {
            ChangeRef::Commit(sha) => {
                let commit = self.source.get_commit(project, sha).await?;
                info!(project = %project, sha = %sha, author = %commit.author_name, title = %commit.title, "analyzing commit");
                (self.source.get_commit_diff(project, sha).await?, Vec::new())
            }
            ChangeRef::MergeRequest(iid) => {
                let merge_request = self.source.get_merge_request_changes(project, *iid).await?;
                info!(project = %project, iid, title = %merge_request.title, "analyzing merge request");
                let diffs = merge_request.changes.clone();
                let identifiers = match self.helm.merge_request_changes(project, *iid).await {
                    Ok(identifiers) => identifiers,
                    Err(err) => {
                        warn!(project = %project, iid, error = %err, "Helm analysis failed");
                        Vec::new()
                    }
                };
                (diffs, identifiers)
            }
        };

        let apps = self.gitops.list_applications().await?;

        // Prefer the project's canonical path for source-URL matching.
        let project_path = match self.source.get_project(project).await {
            Ok(found) if !found.path_with_namespace.is_empty() => found.path_with_namespace,
            _ => project.to_string(),
        };

        let mut affected = Vec::new();
        for app in apps {
            if !is_app_sourced_from_project(&app, &project_path) {
                continue;
            }
            let mut is_affected = is_app_affected_by_diffs(&app, &diffs);
            if !is_affected && !helm_identifiers.is_empty() {
                is_affected = self.app_contains_any(&app, &helm_identifiers).await;
            }
            if is_affected {
                info!(application = %app.name(), "application affected by change");
                affected.push(app);
            }
        }

        let mut seen = HashSet::new();
        let mut result = Vec::new();
        for app in affected {
            let tree = match self.gitops.resource_tree(app.name()).await {
                Ok(tree) => tree,
                Err(err) => {
                    warn!(application = %app.name(), error = %err, "failed to get resource tree");
                    continue;
                }
            };
            for node in &tree.nodes {
                if node.kind.is_empty() || node.name.is_empty() {
                    continue;
                }
                let key = format!("{}/{}/{}", node.kind, node.name, node.namespace);
                if !seen.insert(key) {
                    continue;
                }
                let mut rc = self.trace_resource(&node.kind, &node.namespace, &node.name).await;
                rc.related_resources.insert(0, change.related_resource_entry());
                result.push(rc);
            }
        }

        info!(project = %project, resources = result.len(), "change impact analyzed");
        Ok(result)
    }

    /// Whether an application's resource tree contains any of the given
    /// `Kind/Name` or `Namespace/Kind/Name` identifiers.
    async fn app_contains_any(&self, app: &ArgoApplication, identifiers: &[String]) -> bool {
        let tree = match self.gitops.resource_tree(app.name()).await {
            Ok(tree) => tree,
            Err(_) => return false,
        };
        identifiers.iter().any(|identifier| {
            let parts: Vec<&str> = identifier.split('/').collect();
            match parts.as_slice() {
                [kind, name] => tree.contains(kind, name, ""),
                [namespace, kind, name] => tree.contains(kind, name, namespace),
                _ => false,
            }
        })
    }
}

/// Per-kind derived metadata attached to the context for the assembler.
pub fn resource_metadata(resource: &RawResource) -> BTreeMap<String, Value> {
    let mut metadata = BTreeMap::new();
    match resource.kind().unwrap_or_default() {
        "Pod" => {
            if let Some(phase) = resource.nested_str(&["status", "phase"]) {
                metadata.insert("phase".to_string(), json!(phase));
            }
            if let Some(containers) = resource.nested_slice(&["spec", "containers"]) {
                metadata.insert("containerCount".to_string(), json!(containers.len()));
            }
            if let Some(statuses) = resource.nested_slice(&["status", "containerStatuses"]) {
                let restarts: i64 = statuses
                    .iter()
                    .filter_map(|status| status.get("restartCount").and_then(Value::as_i64))
                    .sum();
                metadata.insert("totalRestarts".to_string(), json!(restarts));
            }
        }
        kind @ ("Deployment" | "StatefulSet" | "DaemonSet" | "ReplicaSet") => {
            if let Some(desired) = resource.nested_i64(&["spec", "replicas"]) {
                metadata.insert("desiredReplicas".to_string(), json!(desired));
            }
            for (field, key) in [
                ("availableReplicas", "availableReplicas"),
                ("readyReplicas", "readyReplicas"),
                ("updatedReplicas", "updatedReplicas"),
            ] {
                if let Some(count) = resource.nested_i64(&["status", field]) {
                    metadata.insert(key.to_string(), json!(count));
                }
            }
            if kind == "Deployment" {
                if let Some(strategy) = resource.nested_str(&["spec", "strategy", "type"]) {
                    metadata.insert("strategy".to_string(), json!(strategy));
                }
            }
            if let Some(containers) =
                resource.nested_slice(&["spec", "template", "spec", "containers"])
            {
                let summaries: Vec<Value> = containers
                    .iter()
                    .map(|container| {
                        json!({
                            "name": container.get("name").and_then(Value::as_str).unwrap_or_default(),
                            "image": container.get("image").and_then(Value::as_str).unwrap_or_default(),
                            "resources": container.get("resources").cloned().unwrap_or(json!({})),
                        })
                    })
                    .collect();
                metadata.insert("containers".to_string(), json!(summaries));
            }
        }
        "Service" => {
            if let Some(service_type) = resource.nested_str(&["spec", "type"]) {
                metadata.insert("type".to_string(), json!(service_type));
            }
            if let Some(ports) = resource.nested_slice(&["spec", "ports"]) {
                metadata.insert("portCount".to_string(), json!(ports.len()));
            }
        }
        "PersistentVolumeClaim" => {
            if let Some(storage) =
                resource.nested_str(&["spec", "resources", "requests", "storage"])
            {
                metadata.insert("requestedStorage".to_string(), json!(storage));
            }
            if let Some(phase) = resource.nested_str(&["status", "phase"]) {
                metadata.insert("phase".to_string(), json!(phase));
            }
        }
        _ => {}
    }
    metadata
}

/// Extract the `namespace/project` path from a repository URL. Accepts
/// `http(s)://host/ns/proj(.git)` and `git@host:ns/proj(.git)`; anything
/// else yields an empty string.
pub fn extract_project_path(repo_url: &str) -> String {
    if let Some(rest) = repo_url.strip_prefix("https://").or_else(|| repo_url.strip_prefix("http://")) {
        let mut parts: Vec<&str> = rest.split('/').collect();
        if parts.len() < 2 {
            return String::new();
        }
        // Drop the host, keep the path, strip a trailing `.git`.
        parts.remove(0);
        let path = parts.join("/");
        return path.strip_suffix(".git").unwrap_or(&path).to_string();
    }

    if repo_url.starts_with("git@") {
        let Some((_, path)) = repo_url.split_once(':') else {
            return String::new();
        };
        if path.contains(':') {
            return String::new();
        }
        return path.strip_suffix(".git").unwrap_or(path).to_string();
    }

    String::new()
}

/// Whether an application's source repository is the given project.
pub fn is_app_sourced_from_project(app: &ArgoApplication, project_path: &str) -> bool {
    let app_path = extract_project_path(&app.spec.source.repo_url);
    !app_path.is_empty() && app_path.eq_ignore_ascii_case(project_path)
}

/// Whether any changed file falls under the application's source path. An
/// empty source path matches every change.
pub fn is_app_affected_by_diffs(app: &ArgoApplication, diffs: &[GitLabDiff]) -> bool {
    let source_path = &app.spec.source.path;
    if source_path.is_empty() {
        return true;
    }
    diffs
        .iter()
        .any(|diff| diff.new_path.starts_with(source_path) || diff.old_path.starts_with(source_path))
}

/// Infer the deployment environment of an application: explicit labels
/// first, then well-known tokens in the destination namespace and source
/// path, finally the destination namespace itself.
pub fn extract_environment(app: &ArgoApplication) -> String {
    for label in ["environment", "env"] {
        if let Some(value) = app.metadata.labels.get(label) {
            return value.clone();
        }
    }

    let namespace = &app.spec.destination.namespace;
    for (token, environment) in [("prod", "production"), ("staging", "staging"), ("dev", "development")] {
        if namespace.contains(token) {
            return environment.to_string();
        }
    }

    let path = &app.spec.source.path;
    if !path.is_empty() {
        for (token, environment) in
            [("prod", "production"), ("staging", "staging"), ("dev", "development")]
        {
            if path.contains(token) {
                return environment.to_string();
            }
        }
    }

    namespace.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn app(repo_url: &str, path: &str) -> ArgoApplication {
        let mut app = ArgoApplication::default();
        app.metadata.name = "web".into();
        app.spec.source.repo_url = repo_url.into();
        app.spec.source.path = path.into();
        app
    }

    #[test]
    fn extracts_project_path_from_url_shapes() {
        assert_eq!(extract_project_path("https://gitlab.example.com/platform/web.git"), "platform/web");
        assert_eq!(extract_project_path("https://gitlab.example.com/platform/web"), "platform/web");
        assert_eq!(extract_project_path("http://gitlab.example.com/a/b/c.git"), "a/b/c");
        assert_eq!(extract_project_path("git@gitlab.example.com:platform/web.git"), "platform/web");
        assert_eq!(extract_project_path("git@gitlab.example.com:platform/web"), "platform/web");
        assert_eq!(extract_project_path("ssh://weird"), "");
        assert_eq!(extract_project_path(""), "");
        assert_eq!(extract_project_path("https://hostonly"), "");
    }

    #[test]
    fn source_project_match_is_case_insensitive() {
        let app = app("https://gitlab.example.com/Platform/Web.git", "");
        assert!(is_app_sourced_from_project(&app, "platform/web"));
        assert!(!is_app_sourced_from_project(&app, "platform/api"));
    }

    #[test]
    fn empty_source_path_matches_any_diff() {
        let app = app("https://gitlab.example.com/platform/web.git", "");
        assert!(is_app_affected_by_diffs(&app, &[]));

        let scoped = self::app("https://gitlab.example.com/platform/web.git", "apps/web");
        let hit = GitLabDiff { new_path: "apps/web/values.yaml".into(), ..Default::default() };
        let miss = GitLabDiff { new_path: "infra/README.md".into(), ..Default::default() };
        assert!(is_app_affected_by_diffs(&scoped, &[hit]));
        assert!(!is_app_affected_by_diffs(&scoped, &[miss]));
    }

    #[test]
    fn environment_resolution_order() {
        let mut labelled = app("", "");
        labelled.metadata.labels.insert("environment".into(), "canary".into());
        labelled.spec.destination.namespace = "prod-eu".into();
        assert_eq!(extract_environment(&labelled), "canary");

        let mut by_namespace = app("", "");
        by_namespace.spec.destination.namespace = "web-staging".into();
        assert_eq!(extract_environment(&by_namespace), "staging");

        let mut by_path = app("", "overlays/dev");
        by_path.spec.destination.namespace = "team-a".into();
        assert_eq!(extract_environment(&by_path), "development");

        let mut fallback = app("", "");
        fallback.spec.destination.namespace = "team-a".into();
        assert_eq!(extract_environment(&fallback), "team-a");
    }

    #[test]
    fn change_ref_related_entries() {
        assert_eq!(ChangeRef::Commit("abc123".into()).related_resource_entry(), "Commit/abc123");
        assert_eq!(ChangeRef::MergeRequest(7).related_resource_entry(), "MergeRequest/7");
    }

    #[test]
    fn deployment_metadata_includes_container_summaries() {
        let deployment = RawResource::new(json!({
            "kind": "Deployment",
            "spec": {
                "replicas": 3,
                "strategy": {"type": "RollingUpdate"},
                "template": {"spec": {"containers": [{
                    "name": "app",
                    "image": "registry.example.com/web:1.2",
                    "resources": {"requests": {"cpu": "100m"}}
                }]}}
            },
            "status": {"availableReplicas": 2, "readyReplicas": 2}
        }));
        let metadata = resource_metadata(&deployment);
        assert_eq!(metadata["desiredReplicas"], json!(3));
        assert_eq!(metadata["availableReplicas"], json!(2));
        assert_eq!(metadata["strategy"], json!("RollingUpdate"));
        assert_eq!(metadata["containers"][0]["image"], json!("registry.example.com/web:1.2"));
    }
}
