//! Failure-mode classification.
//!
//! Inspects a resource context (events, raw object, GitOps and source-host
//! links) and emits typed issues plus a deduplicated recommendation set.
//! Pure with respect to its inputs except for an optional PVC probe, which
//! fails softly into a `VolumeIssue`.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::kube::resource::{nested_bool_in, nested_i64_in, nested_str_in};
use crate::kube::topology::classify_health;
use crate::kube::{ClusterClient, RawResource};
use crate::models::{
    HealthStatus, Issue, IssueCategory, IssueSeverity, IssueSource, K8sEvent, ResourceContext,
};

/// Container restart count above which a `FrequentRestarts` issue is raised.
const RESTART_THRESHOLD: i64 = 3;

/// Classifies issues on a correlated resource context.
pub struct Troubleshooter {
    cluster: Arc<dyn ClusterClient>,
}

impl Troubleshooter {
    pub fn new(cluster: Arc<dyn ClusterClient>) -> Self {
        Self { cluster }
    }

    /// Produce the ordered issue list and recommendation set for a context.
    /// `raw` enables the pod- and deployment-specific checks.
    pub async fn classify(
        &self,
        rc: &ResourceContext,
        raw: Option<&RawResource>,
    ) -> (Vec<Issue>, Vec<String>) {
        let mut issues = event_issues(&rc.events);

        if let Some(resource) = raw {
            if rc.kind.eq_ignore_ascii_case("pod") {
                self.analyze_pod(resource, &mut issues).await;
            }
            if rc.kind.eq_ignore_ascii_case("deployment") {
                analyze_deployment(resource, &mut issues);
            }
        }

        analyze_gitops(rc, &mut issues);
        analyze_source_host(rc, &mut issues);

        if issues.is_empty() {
            if let Some(resource) = raw {
                if classify_health(resource) != HealthStatus::Healthy {
                    issues.push(Issue {
                        title: "Resource Not Healthy".to_string(),
                        category: IssueCategory::UnknownIssue,
                        severity: IssueSeverity::Warning,
                        source: IssueSource::Kubernetes,
                        description: format!(
                            "{} {}/{} is not in a healthy state",
                            rc.kind, rc.namespace, rc.name
                        ),
                    });
                }
            }
        }

        let recommendations = recommendations_for(&issues);
        info!(
            kind = %rc.kind,
            name = %rc.name,
            issues = issues.len(),
            recommendations = recommendations.len(),
            "classification complete"
        );
        (issues, recommendations)
    }

    /// Pod phase, conditions, container states, and PVC bindings.
    async fn analyze_pod(&self, pod: &RawResource, issues: &mut Vec<Issue>) {
        if let Some(phase) = pod.nested_str(&["status", "phase"]) {
            if phase != "Running" && phase != "Succeeded" {
                let mut issue = Issue {
                    title: "Pod Not Running".to_string(),
                    category: IssueCategory::PodNotRunning,
                    severity: IssueSeverity::Warning,
                    source: IssueSource::Kubernetes,
                    description: format!("Pod is in {phase} state"),
                };
                if phase == "Pending" {
                    issue.title = "Pod Pending".to_string();
                    issue.description =
                        "Pod is still in Pending state and hasn't started running".to_string();
                } else if phase == "Failed" {
                    issue.title = "Pod Failed".to_string();
                    issue.severity = IssueSeverity::Error;
                }
                issues.push(issue);
            }
        }

        if let Some(conditions) = pod.nested_slice(&["status", "conditions"]) {
            for condition in conditions {
                let cond_type = nested_str_in(condition, &["type"]).unwrap_or_default();
                let status = nested_str_in(condition, &["status"]).unwrap_or_default();
                if status == "True" {
                    continue;
                }
                let found = match cond_type {
                    "PodScheduled" => Some((
                        IssueCategory::SchedulingIssue,
                        "Pod Scheduling Issue",
                        "Pod cannot be scheduled onto a node",
                    )),
                    "Initialized" => Some((
                        IssueCategory::InitializationIssue,
                        "Pod Initialization Issue",
                        "Pod initialization containers have not completed successfully",
                    )),
                    "ContainersReady" => Some((
                        IssueCategory::ContainerReadinessIssue,
                        "Container Readiness Issue",
                        "One or more containers are not ready",
                    )),
                    "Ready" => Some((
                        IssueCategory::PodNotReady,
                        "Pod Not Ready",
                        "Pod is not ready to serve traffic",
                    )),
                    _ => None,
                };
                if let Some((category, title, description)) = found {
                    issues.push(Issue {
                        title: title.to_string(),
                        category,
                        severity: IssueSeverity::Warning,
                        source: IssueSource::Kubernetes,
                        description: description.to_string(),
                    });
                }
            }
        }

        if let Some(statuses) = pod.nested_slice(&["status", "containerStatuses"]) {
            analyze_container_statuses(statuses, false, issues);
        }
        if let Some(statuses) = pod.nested_slice(&["status", "initContainerStatuses"]) {
            analyze_container_statuses(statuses, true, issues);
        }

        self.analyze_pod_volumes(pod, issues).await;
    }

    /// Probe every PVC the pod mounts.
    async fn analyze_pod_volumes(&self, pod: &RawResource, issues: &mut Vec<Issue>) {
        let Some(volumes) = pod.nested_slice(&["spec", "volumes"]) else { return };
        let namespace = pod.namespace().unwrap_or_default();

        let claims: Vec<&str> = volumes
            .iter()
            .filter_map(|volume| nested_str_in(volume, &["persistentVolumeClaim", "claimName"]))
            .filter(|claim| !claim.is_empty())
            .collect();

        for claim in claims {
            match self.cluster.get("persistentvolumeclaim", namespace, claim).await {
                Ok(pvc) => {
                    let phase = pvc.nested_str(&["status", "phase"]).unwrap_or_default();
                    if phase != "Bound" {
                        issues.push(Issue {
                            title: "PVC Not Bound".to_string(),
                            category: IssueCategory::VolumeIssue,
                            severity: IssueSeverity::Warning,
                            source: IssueSource::Kubernetes,
                            description: format!(
                                "PersistentVolumeClaim {claim} is in {phase} state"
                            ),
                        });
                    }
                }
                Err(err) => {
                    debug!(claim = %claim, error = %err, "PVC probe failed");
                    issues.push(Issue {
                        title: "PVC Not Found".to_string(),
                        category: IssueCategory::VolumeIssue,
                        severity: IssueSeverity::Warning,
                        source: IssueSource::Kubernetes,
                        description: format!("PersistentVolumeClaim {claim} not found"),
                    });
                }
            }
        }
    }
}

/// Classify warning events by substring, with a fixed match precedence.
pub fn event_issues(events: &[K8sEvent]) -> Vec<Issue> {
    let mut issues = Vec::new();
    for event in events {
        if !event.is_warning() {
            continue;
        }
        let (category, title) = if event.reason.contains("Failed") && event.message.contains("ImagePull")
        {
            (IssueCategory::ImagePullError, "Image Pull Failure")
        } else if event.reason.contains("Unhealthy") {
            (IssueCategory::HealthCheckFailure, "Health Check Failure")
        } else if event.message.contains("memory") {
            (IssueCategory::ResourceIssue, "Memory Resource Issue")
        } else if event.message.contains("cpu") {
            (IssueCategory::ResourceIssue, "CPU Resource Issue")
        } else if event.reason.contains("BackOff") {
            (IssueCategory::CrashLoopBackOff, "Container Crash Loop")
        } else {
            (IssueCategory::OtherWarning, "Kubernetes Warning")
        };

        issues.push(Issue {
            title: title.to_string(),
            category,
            severity: IssueSeverity::Warning,
            source: IssueSource::Kubernetes,
            description: format!("{}: {}", event.reason, event.message),
        });
    }
    issues
}

/// Waiting/terminated states and restart counts for main or init containers.
fn analyze_container_statuses(statuses: &[Value], init: bool, issues: &mut Vec<Issue>) {
    let container_type = if init { "Init Container" } else { "Container" };

    for status in statuses {
        let name = nested_str_in(status, &["name"]).unwrap_or_default();
        let ready = nested_bool_in(status, &["ready"]).unwrap_or(false);
        let restart_count = nested_i64_in(status, &["restartCount"]).unwrap_or(0);

        if !ready {
            if let Some(waiting) = status.get("state").and_then(|s| s.get("waiting")) {
                let reason = nested_str_in(waiting, &["reason"]).unwrap_or_default();
                let message = nested_str_in(waiting, &["message"]).unwrap_or_default();

                let issue = match reason {
                    "CrashLoopBackOff" => Issue {
                        title: format!("{container_type} {name} CrashLoopBackOff"),
                        category: IssueCategory::CrashLoopBackOff,
                        severity: IssueSeverity::Error,
                        source: IssueSource::Kubernetes,
                        description: format!("{container_type} is waiting: {reason} - {message}"),
                    },
                    "ImagePullBackOff" | "ErrImagePull" => Issue {
                        title: format!("{container_type} {name} Image Pull Error"),
                        category: IssueCategory::ImagePullError,
                        severity: IssueSeverity::Warning,
                        source: IssueSource::Kubernetes,
                        description: format!("{container_type} is waiting: {reason} - {message}"),
                    },
                    "PodInitializing" | "ContainerCreating" => Issue {
                        title: format!("{container_type} Still Initializing"),
                        category: IssueCategory::PodInitializing,
                        severity: IssueSeverity::Warning,
                        source: IssueSource::Kubernetes,
                        description: format!("{container_type} is still being created or initialized"),
                    },
                    _ => Issue {
                        title: format!("{container_type} {name} Waiting"),
                        category: IssueCategory::ContainerWaiting,
                        severity: IssueSeverity::Warning,
                        source: IssueSource::Kubernetes,
                        description: format!("{container_type} is waiting: {reason} - {message}"),
                    },
                };
                issues.push(issue);
            }

            if let Some(terminated) = status.get("state").and_then(|s| s.get("terminated")) {
                let exit_code = nested_i64_in(terminated, &["exitCode"]).unwrap_or(0);
                if exit_code != 0 {
                    let reason = nested_str_in(terminated, &["reason"]).unwrap_or_default();
                    let message = nested_str_in(terminated, &["message"]).unwrap_or_default();
                    issues.push(Issue {
                        title: format!("{container_type} {name} Terminated"),
                        category: IssueCategory::ContainerTerminated,
                        severity: IssueSeverity::Error,
                        source: IssueSource::Kubernetes,
                        description: format!(
                            "{container_type} terminated with exit code {exit_code}: {reason} - {message}"
                        ),
                    });
                }
            }
        }

        if restart_count > RESTART_THRESHOLD {
            issues.push(Issue {
                title: format!("{container_type} {name} Frequent Restarts"),
                category: IssueCategory::FrequentRestarts,
                severity: IssueSeverity::Warning,
                source: IssueSource::Kubernetes,
                description: format!("{container_type} has restarted {restart_count} times"),
            });
        }
    }
}

/// Replica shortfalls and failing conditions on a deployment.
fn analyze_deployment(deployment: &RawResource, issues: &mut Vec<Issue>) {
    let desired = deployment.nested_i64(&["spec", "replicas"]).unwrap_or(1);
    let available = deployment.nested_i64(&["status", "availableReplicas"]).unwrap_or(0);
    let ready = deployment.nested_i64(&["status", "readyReplicas"]).unwrap_or(0);

    if available < desired {
        issues.push(Issue {
            title: "Deployment Not Fully Available".to_string(),
            category: IssueCategory::DeploymentNotAvailable,
            severity: IssueSeverity::Warning,
            source: IssueSource::Kubernetes,
            description: format!("Deployment has {available}/{desired} available replicas"),
        });
    }
    if ready < desired {
        issues.push(Issue {
            title: "Deployment Not Fully Ready".to_string(),
            category: IssueCategory::DeploymentNotReady,
            severity: IssueSeverity::Warning,
            source: IssueSource::Kubernetes,
            description: format!("Deployment has {ready}/{desired} ready replicas"),
        });
    }

    let Some(conditions) = deployment.nested_slice(&["status", "conditions"]) else { return };
    for condition in conditions {
        let cond_type = nested_str_in(condition, &["type"]).unwrap_or_default();
        let status = nested_str_in(condition, &["status"]).unwrap_or_default();
        if status == "True" {
            continue;
        }
        let reason = nested_str_in(condition, &["reason"]).unwrap_or_default();
        let message = nested_str_in(condition, &["message"]).unwrap_or_default();

        if cond_type == "Available" {
            issues.push(Issue {
                title: "Deployment Not Available".to_string(),
                category: IssueCategory::DeploymentNotAvailable,
                severity: IssueSeverity::Warning,
                source: IssueSource::Kubernetes,
                description: format!("Deployment availability issue: {reason} - {message}"),
            });
        }
        if cond_type == "Progressing" {
            issues.push(Issue {
                title: "Deployment Not Progressing".to_string(),
                category: IssueCategory::DeploymentNotProgressing,
                severity: IssueSeverity::Warning,
                source: IssueSource::Kubernetes,
                description: format!("Deployment progress issue: {reason} - {message}"),
            });
        }
    }
}

/// Sync and health state of the managing application.
fn analyze_gitops(rc: &ResourceContext, issues: &mut Vec<Issue>) {
    let Some(app) = &rc.argo_application else { return };

    if rc.argo_sync_status != "Synced" {
        issues.push(Issue {
            title: "Application Sync Issue".to_string(),
            category: IssueCategory::SyncIssue,
            severity: IssueSeverity::Warning,
            source: IssueSource::GitOps,
            description: format!(
                "Application {} is not synced (status: {})",
                app.name(),
                rc.argo_sync_status
            ),
        });
    }

    if rc.argo_health_status != "Healthy" {
        issues.push(Issue {
            title: "Application Health Issue".to_string(),
            category: IssueCategory::HealthIssue,
            severity: IssueSeverity::Warning,
            source: IssueSource::GitOps,
            description: format!(
                "Application {} is not healthy (status: {})",
                app.name(),
                rc.argo_health_status
            ),
        });
    }

    // Only the most recent failure is reported; history is newest-first.
    for entry in &rc.argo_sync_history {
        if entry.status == "Failed" {
            let deployed_at = entry
                .deployed_at
                .map(|at| at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
                .unwrap_or_else(|| "unknown time".to_string());
            issues.push(Issue {
                title: "Recent Sync Failure".to_string(),
                category: IssueCategory::SyncFailure,
                severity: IssueSeverity::Error,
                source: IssueSource::GitOps,
                description: format!(
                    "Sync at {deployed_at} failed with revision {}",
                    entry.revision
                ),
            });
            break;
        }
    }
}

/// Pipeline and deployment state of the backing source project.
fn analyze_source_host(rc: &ResourceContext, issues: &mut Vec<Issue>) {
    if rc.gitlab_project.is_none() {
        return;
    }

    if let Some(pipeline) = &rc.last_pipeline {
        if pipeline.status != "success" {
            let severity = if pipeline.status == "failed" {
                IssueSeverity::Error
            } else {
                IssueSeverity::Warning
            };
            issues.push(Issue {
                title: "Pipeline Issue".to_string(),
                category: IssueCategory::PipelineIssue,
                severity,
                source: IssueSource::SourceHost,
                description: format!("Pipeline #{} status: {}", pipeline.id, pipeline.status),
            });
        }
    }

    if let Some(deployment) = &rc.last_deployment {
        if deployment.status != "success" {
            let severity = if deployment.status == "failed" {
                IssueSeverity::Error
            } else {
                IssueSeverity::Warning
            };
            issues.push(Issue {
                title: "Deployment Issue".to_string(),
                category: IssueCategory::DeploymentIssue,
                severity,
                source: IssueSource::SourceHost,
                description: format!(
                    "Deployment to {} status: {}",
                    deployment.environment.name, deployment.status
                ),
            });
        }
    }
}

/// Recommendations for one category. Categories without a dedicated entry
/// get the generic log/event pair.
fn category_recommendations(category: IssueCategory) -> &'static [&'static str] {
    match category {
        IssueCategory::ImagePullError => &[
            "Check image name and credentials for accessing private registries.",
            "Verify that the image tag exists in the registry.",
        ],
        IssueCategory::HealthCheckFailure => &[
            "Review liveness and readiness probe configuration.",
            "Check application logs for errors during startup.",
        ],
        IssueCategory::ResourceIssue => &[
            "Review resource requests and limits in the deployment.",
            "Monitor resource usage to determine appropriate values.",
        ],
        IssueCategory::CrashLoopBackOff => &[
            "Check container logs for errors.",
            "Verify environment variables and configuration.",
        ],
        IssueCategory::SyncIssue | IssueCategory::SyncFailure => &[
            "Check the GitOps application manifest for errors.",
            "Verify that the target revision exists in the Git repository.",
        ],
        IssueCategory::PipelineIssue => &[
            "Review pipeline logs for errors.",
            "Check if the pipeline configuration is valid.",
        ],
        IssueCategory::DeploymentIssue => &[
            "Check deployment job logs for errors.",
            "Verify deployment environment configuration.",
        ],
        IssueCategory::PodNotRunning | IssueCategory::PodNotReady | IssueCategory::PodInitializing => &[
            "Check pod events for scheduling or initialization issues.",
            "Examine init container logs for errors.",
        ],
        IssueCategory::InitializationIssue => &[
            "Check init container logs for errors.",
            "Verify that volumes can be mounted properly.",
        ],
        IssueCategory::ContainerReadinessIssue => &[
            "Review readiness probe configuration.",
            "Check container logs for application startup issues.",
        ],
        IssueCategory::VolumeIssue => &[
            "Verify that PersistentVolumeClaims are bound.",
            "Check if storage classes are properly configured.",
            "Ensure sufficient storage space is available on the nodes.",
        ],
        IssueCategory::SchedulingIssue => &[
            "Check if nodes have sufficient resources for the pod.",
            "Verify that node selectors or taints are not preventing scheduling.",
        ],
        _ => &["Check pod logs for errors.", "Examine Kubernetes events for the resource."],
    }
}

/// Build the recommendation set: per-category entries deduplicated in
/// insertion order, or the generic set when there are no issues.
pub fn recommendations_for(issues: &[Issue]) -> Vec<String> {
    if issues.is_empty() {
        return vec![
            "Check pod logs for errors.".to_string(),
            "Examine Kubernetes events for the resource.".to_string(),
            "Verify network connectivity between components.".to_string(),
        ];
    }

    let mut seen = HashSet::new();
    let mut recommendations = Vec::new();
    for issue in issues {
        for recommendation in category_recommendations(issue.category) {
            if seen.insert(*recommendation) {
                recommendations.push((*recommendation).to_string());
            }
        }
    }
    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::kube::{ApiGroupResources, ClusterClient};
    use crate::models::{ArgoApplication, ArgoSyncHistoryEntry, EventObject, GitLabPipeline, GitLabProject};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use serde_json::json;

    struct NoCluster;

    #[async_trait]
    impl ClusterClient for NoCluster {
        async fn discover(&self) -> crate::error::Result<Vec<ApiGroupResources>> {
            Ok(Vec::new())
        }
        async fn get(&self, kind: &str, ns: &str, name: &str) -> crate::error::Result<RawResource> {
            Err(Error::NotFound(format!("{kind} {ns}/{name}")))
        }
        async fn list(&self, _: &str, _: &str) -> crate::error::Result<Vec<RawResource>> {
            Ok(Vec::new())
        }
        async fn events(&self, _: &str, _: &str, _: &str) -> crate::error::Result<Vec<K8sEvent>> {
            Ok(Vec::new())
        }
        async fn namespaces(&self) -> crate::error::Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    fn warning(reason: &str, message: &str) -> K8sEvent {
        K8sEvent {
            reason: reason.into(),
            message: message.into(),
            event_type: "Warning".into(),
            count: 1,
            first_time: None,
            last_time: None,
            object: EventObject::default(),
        }
    }

    fn troubleshooter() -> Troubleshooter {
        Troubleshooter::new(Arc::new(NoCluster))
    }

    #[test]
    fn event_scan_precedence() {
        let cases = [
            (warning("FailedPull", "rpc error: ImagePull failed"), IssueCategory::ImagePullError),
            (warning("Unhealthy", "liveness probe failed"), IssueCategory::HealthCheckFailure),
            (warning("Evicted", "node was low on memory"), IssueCategory::ResourceIssue),
            (warning("Evicted", "insufficient cpu"), IssueCategory::ResourceIssue),
            (warning("BackOff", "restarting failed container"), IssueCategory::CrashLoopBackOff),
            (warning("NodeNotReady", "node not ready"), IssueCategory::OtherWarning),
        ];
        for (event, expected) in cases {
            let issues = event_issues(&[event]);
            assert_eq!(issues.len(), 1);
            assert_eq!(issues[0].category, expected);
        }
    }

    #[test]
    fn normal_events_are_ignored() {
        let mut event = warning("Pulled", "image pulled");
        event.event_type = "Normal".into();
        assert!(event_issues(&[event]).is_empty());
    }

    #[tokio::test]
    async fn crashloop_pod_scenario() {
        let rc = ResourceContext {
            events: vec![warning("BackOff", "back-off restarting failed container")],
            ..ResourceContext::new("Pod", "web-1", "default")
        };
        let pod = RawResource::new(json!({
            "kind": "Pod",
            "metadata": {"name": "web-1", "namespace": "default"},
            "status": {
                "phase": "Running",
                "containerStatuses": [{
                    "name": "app",
                    "ready": false,
                    "restartCount": 2,
                    "state": {"waiting": {"reason": "CrashLoopBackOff", "message": "back-off"}}
                }]
            }
        }));

        let (issues, recommendations) = troubleshooter().classify(&rc, Some(&pod)).await;
        let crashloops: Vec<_> =
            issues.iter().filter(|i| i.category == IssueCategory::CrashLoopBackOff).collect();
        assert_eq!(crashloops.len(), 2);
        assert!(recommendations.iter().any(|r| r == "Check container logs for errors."));
    }

    #[tokio::test]
    async fn image_pull_scenario() {
        let rc = ResourceContext::new("Pod", "web-1", "default");
        let pod = RawResource::new(json!({
            "kind": "Pod",
            "metadata": {"name": "web-1", "namespace": "default"},
            "status": {
                "phase": "Pending",
                "containerStatuses": [{
                    "name": "app",
                    "ready": false,
                    "state": {"waiting": {"reason": "ErrImagePull", "message": "pull access denied"}}
                }]
            }
        }));

        let (issues, recommendations) = troubleshooter().classify(&rc, Some(&pod)).await;
        let pull = issues.iter().find(|i| i.category == IssueCategory::ImagePullError).unwrap();
        assert_eq!(pull.severity, IssueSeverity::Warning);
        assert!(recommendations
            .iter()
            .any(|r| r == "Check image name and credentials for accessing private registries."));
    }

    #[tokio::test]
    async fn underscaled_deployment_scenario() {
        let rc = ResourceContext::new("Deployment", "web", "default");
        let deployment = RawResource::new(json!({
            "kind": "Deployment",
            "metadata": {"name": "web", "namespace": "default"},
            "spec": {"replicas": 5},
            "status": {
                "availableReplicas": 3,
                "readyReplicas": 3,
                "conditions": [{
                    "type": "Available",
                    "status": "False",
                    "reason": "MinimumReplicasUnavailable",
                    "message": "Deployment does not have minimum availability."
                }]
            }
        }));

        let (issues, _) = troubleshooter().classify(&rc, Some(&deployment)).await;
        let unavailable: Vec<_> = issues
            .iter()
            .filter(|i| i.category == IssueCategory::DeploymentNotAvailable)
            .collect();
        assert_eq!(unavailable.len(), 2);
        assert_ne!(unavailable[0].description, unavailable[1].description);
        assert!(issues.iter().any(|i| i.category == IssueCategory::DeploymentNotReady));
    }

    #[tokio::test]
    async fn gitops_out_of_sync_scenario() {
        let mut app = ArgoApplication::default();
        app.metadata.name = "web".into();
        let rc = ResourceContext {
            argo_application: Some(app),
            argo_sync_status: "OutOfSync".into(),
            argo_health_status: "Healthy".into(),
            argo_sync_history: vec![ArgoSyncHistoryEntry {
                id: 9,
                revision: "abc".into(),
                deployed_at: Some(chrono::Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()),
                status: "Failed".into(),
            }],
            ..ResourceContext::new("Deployment", "web", "default")
        };

        let (issues, _) = troubleshooter().classify(&rc, None).await;
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].category, IssueCategory::SyncIssue);
        assert_eq!(issues[0].severity, IssueSeverity::Warning);
        assert_eq!(issues[1].category, IssueCategory::SyncFailure);
        assert_eq!(issues[1].severity, IssueSeverity::Error);
        assert!(issues[1].description.contains("abc"));
        assert!(issues[1].description.contains("2025-01-01T00:00:00Z"));
    }

    #[tokio::test]
    async fn no_gitops_issues_without_application() {
        let rc = ResourceContext {
            argo_sync_status: "OutOfSync".into(),
            ..ResourceContext::new("Pod", "web-1", "default")
        };
        let (issues, _) = troubleshooter().classify(&rc, None).await;
        assert!(issues.iter().all(|i| i.source != IssueSource::GitOps));
    }

    #[tokio::test]
    async fn failed_pipeline_is_an_error() {
        let rc = ResourceContext {
            gitlab_project: Some(GitLabProject::default()),
            last_pipeline: Some(GitLabPipeline {
                id: 42,
                status: "failed".into(),
                ..Default::default()
            }),
            ..ResourceContext::new("Deployment", "web", "default")
        };
        let (issues, _) = troubleshooter().classify(&rc, None).await;
        let pipeline = issues.iter().find(|i| i.category == IssueCategory::PipelineIssue).unwrap();
        assert_eq!(pipeline.severity, IssueSeverity::Error);
        assert!(pipeline.description.contains("#42"));
    }

    #[tokio::test]
    async fn healthy_resource_with_no_events_yields_generic_recommendations() {
        let rc = ResourceContext::new("Pod", "web-1", "default");
        let pod = RawResource::new(json!({
            "kind": "Pod",
            "metadata": {"name": "web-1", "namespace": "default"},
            "status": {"phase": "Running"}
        }));
        let (issues, recommendations) = troubleshooter().classify(&rc, Some(&pod)).await;
        assert!(issues.is_empty());
        assert_eq!(recommendations.len(), 3);
        assert!(recommendations.iter().any(|r| r.contains("network connectivity")));
    }

    #[tokio::test]
    async fn unhealthy_resource_without_specific_issues_is_flagged() {
        let rc = ResourceContext::new("Pod", "web-1", "default");
        let pod = RawResource::new(json!({
            "kind": "Pod",
            "metadata": {"name": "web-1", "namespace": "default"},
            "status": {"phase": "Unknown"}
        }));
        let (issues, _) = troubleshooter().classify(&rc, Some(&pod)).await;
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].category, IssueCategory::UnknownIssue);
    }

    #[tokio::test]
    async fn classification_is_deterministic() {
        let rc = ResourceContext {
            events: vec![
                warning("BackOff", "restarting"),
                warning("Unhealthy", "probe failed"),
            ],
            ..ResourceContext::new("Pod", "web-1", "default")
        };
        let ts = troubleshooter();
        let (first, _) = ts.classify(&rc, None).await;
        let (second, _) = ts.classify(&rc, None).await;
        let first_cats: Vec<_> = first.iter().map(|i| i.category).collect();
        let second_cats: Vec<_> = second.iter().map(|i| i.category).collect();
        assert_eq!(first_cats, second_cats);
    }

    #[test]
    fn frequent_restarts_threshold() {
        let mut issues = Vec::new();
        let statuses = vec![json!({"name": "app", "ready": true, "restartCount": 4})];
        analyze_container_statuses(&statuses, false, &mut issues);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].category, IssueCategory::FrequentRestarts);

        issues.clear();
        let statuses = vec![json!({"name": "app", "ready": true, "restartCount": 3})];
        analyze_container_statuses(&statuses, false, &mut issues);
        assert!(issues.is_empty());
    }

    #[test]
    fn init_containers_are_tagged() {
        let mut issues = Vec::new();
        let statuses = vec![json!({
            "name": "migrate",
            "ready": false,
            "state": {"terminated": {"exitCode": 1, "reason": "Error"}}
        })];
        analyze_container_statuses(&statuses, true, &mut issues);
        assert_eq!(issues[0].title, "Init Container migrate Terminated");
        assert_eq!(issues[0].severity, IssueSeverity::Error);
    }
}
