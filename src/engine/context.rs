//! Context assembly.
//!
//! Formats resource contexts into a single bounded text document with a
//! fixed section order, so the same inputs always produce the same
//! document. Oversized output is reduced with head/tail truncation.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::Value;
use tracing::debug;

use crate::models::ResourceContext;
use crate::util::truncate::truncate_smart;

/// Default bound on a formatted context document, in characters.
pub const DEFAULT_MAX_CONTEXT_SIZE: usize = 100_000;

/// Per-kind cap on names listed under `## Related Resources`.
const RELATED_RESOURCES_PER_KIND: usize = 10;

/// Cap on example names listed per kind in namespace sections.
const NAMESPACE_EXAMPLE_NAMES: usize = 5;

/// Formats [`ResourceContext`] records for the completion provider.
pub struct ContextAssembler {
    max_context_size: usize,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self { max_context_size: DEFAULT_MAX_CONTEXT_SIZE }
    }
}

impl ContextAssembler {
    pub fn new(max_context_size: usize) -> Self {
        let max_context_size =
            if max_context_size == 0 { DEFAULT_MAX_CONTEXT_SIZE } else { max_context_size };
        Self { max_context_size }
    }

    /// Render one resource context. The output never exceeds the
    /// configured bound.
    pub fn format(&self, rc: &ResourceContext) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "# Kubernetes Resource: {}/{}", rc.kind, rc.name);
        if !rc.namespace.is_empty() {
            let _ = writeln!(out, "Namespace: {}", rc.namespace);
        }
        let _ = writeln!(out, "API Version: {}\n", rc.api_version);

        if !rc.resource_data.is_empty() {
            let _ = writeln!(out, "## Resource Details\n```json\n{}\n```\n", rc.resource_data);
        }

        if rc.kind.eq_ignore_ascii_case("deployment") {
            write_deployment_section(&mut out, rc);
        }
        if rc.kind.eq_ignore_ascii_case("namespace") {
            write_namespace_sections(&mut out, rc);
        }

        write_gitops_section(&mut out, rc);
        write_source_project_section(&mut out, rc);

        if !rc.events.is_empty() {
            out.push_str("## Recent Kubernetes Events\n");
            for (index, event) in rc.events.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "{}. [{}] {}: {}",
                    index + 1,
                    event.event_type,
                    event.reason,
                    event.message
                );
            }
            out.push('\n');
        }

        write_related_resources(&mut out, rc);

        if !rc.errors.is_empty() {
            out.push_str("## Errors in Data Collection\n");
            for error in &rc.errors {
                let _ = writeln!(out, "- {error}");
            }
            out.push('\n');
        }

        if out.len() > self.max_context_size {
            debug!(
                original = out.len(),
                limit = self.max_context_size,
                "context exceeds bound, truncating"
            );
            out = truncate_smart(&out, self.max_context_size);
        }
        out
    }

    /// Render multiple contexts into one document with per-resource
    /// markers.
    pub fn combine(&self, contexts: &[ResourceContext]) -> String {
        let mut out = format!("# Kubernetes GitOps Context ({} resources)\n\n", contexts.len());
        for (index, rc) in contexts.iter().enumerate() {
            let _ = writeln!(out, "--- RESOURCE {}/{} ---", index + 1, contexts.len());
            out.push_str(&self.format(rc));
            out.push_str("------------------------\n\n");
        }
        if out.len() > self.max_context_size {
            out = truncate_smart(&out, self.max_context_size);
        }
        out
    }
}

fn write_deployment_section(out: &mut String, rc: &ResourceContext) {
    let replicas: Vec<(&str, Option<&Value>)> = vec![
        ("Desired Replicas", rc.metadata.get("desiredReplicas")),
        ("Updated Replicas", rc.metadata.get("updatedReplicas")),
        ("Ready Replicas", rc.metadata.get("readyReplicas")),
        ("Available Replicas", rc.metadata.get("availableReplicas")),
        ("Strategy", rc.metadata.get("strategy")),
    ];
    if replicas.iter().all(|(_, value)| value.is_none()) && !rc.metadata.contains_key("containers") {
        return;
    }

    out.push_str("## Deployment Status\n");
    for (label, value) in replicas {
        if let Some(value) = value {
            let _ = writeln!(out, "{label}: {}", render_scalar(value));
        }
    }
    out.push('\n');

    if let Some(containers) = rc.metadata.get("containers").and_then(Value::as_array) {
        out.push_str("### Containers\n");
        for container in containers {
            let name = container.get("name").and_then(Value::as_str).unwrap_or_default();
            let image = container.get("image").and_then(Value::as_str).unwrap_or_default();
            let _ = writeln!(out, "- {name} ({image})");
            for section in ["requests", "limits"] {
                if let Some(map) = container
                    .get("resources")
                    .and_then(|r| r.get(section))
                    .and_then(Value::as_object)
                {
                    let rendered: Vec<String> = map
                        .iter()
                        .collect::<BTreeMap<_, _>>()
                        .into_iter()
                        .map(|(key, value)| format!("{key}={}", render_scalar(value)))
                        .collect();
                    if !rendered.is_empty() {
                        let _ = writeln!(out, "  {section}: {}", rendered.join(", "));
                    }
                }
            }
        }
        out.push('\n');
    }
}

fn write_namespace_sections(out: &mut String, rc: &ResourceContext) {
    if let Some(resources) = rc.metadata.get("resources").and_then(Value::as_object) {
        out.push_str("## Resources in Namespace\n");
        for (kind, names) in resources.iter().collect::<BTreeMap<_, _>>() {
            let names: Vec<&str> = names
                .as_array()
                .map(|list| list.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            let examples: Vec<&str> = names.iter().take(NAMESPACE_EXAMPLE_NAMES).copied().collect();
            let suffix = if examples.is_empty() {
                String::new()
            } else if names.len() > examples.len() {
                format!(" ({}, ...)", examples.join(", "))
            } else {
                format!(" ({})", examples.join(", "))
            };
            let _ = writeln!(out, "- {kind}: {}{}", names.len(), suffix);
        }
        out.push('\n');
    }

    if let Some(health) = rc.metadata.get("health").and_then(Value::as_object) {
        out.push_str("## Health Status\n");
        for (kind, statuses) in health.iter().collect::<BTreeMap<_, _>>() {
            let Some(statuses) = statuses.as_object() else { continue };
            let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
            let mut unhealthy = Vec::new();
            for (name, status) in statuses {
                let status = status.as_str().unwrap_or("unknown");
                *counts.entry(status).or_default() += 1;
                if status == "unhealthy" {
                    unhealthy.push(name.as_str());
                }
            }
            let summary: Vec<String> = ["healthy", "unhealthy", "progressing", "unknown"]
                .iter()
                .map(|status| format!("{} {status}", counts.get(*status).copied().unwrap_or(0)))
                .collect();
            let _ = writeln!(out, "- {kind}: {}", summary.join(", "));
            if !unhealthy.is_empty() {
                let listed: Vec<&str> =
                    unhealthy.iter().take(NAMESPACE_EXAMPLE_NAMES).copied().collect();
                let _ = writeln!(out, "  unhealthy: {}", listed.join(", "));
            }
        }
        out.push('\n');
    }
}

fn write_gitops_section(out: &mut String, rc: &ResourceContext) {
    let Some(app) = &rc.argo_application else { return };

    out.push_str("## GitOps Application\n");
    let _ = writeln!(out, "Name: {}", app.name());
    let _ = writeln!(out, "Sync Status: {}", rc.argo_sync_status);
    let _ = writeln!(out, "Health Status: {}", rc.argo_health_status);
    if !app.spec.source.repo_url.is_empty() {
        let _ = writeln!(out, "Source: {}", app.spec.source.repo_url);
        let _ = writeln!(out, "Path: {}", app.spec.source.path);
        let _ = writeln!(out, "Target Revision: {}", app.spec.source.target_revision);
    }
    out.push('\n');

    if !rc.argo_sync_history.is_empty() {
        out.push_str("### Recent Sync History\n");
        for (index, entry) in rc.argo_sync_history.iter().enumerate() {
            let deployed_at = entry
                .deployed_at
                .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_else(|| "unknown time".to_string());
            let _ = writeln!(
                out,
                "{}. [{}] Revision: {}, Status: {}",
                index + 1,
                deployed_at,
                entry.revision,
                entry.status
            );
        }
        out.push('\n');
    }
}

fn write_source_project_section(out: &mut String, rc: &ResourceContext) {
    let Some(project) = &rc.gitlab_project else { return };

    out.push_str("## Source Project\n");
    let _ = writeln!(out, "Name: {}", project.path_with_namespace);
    let _ = writeln!(out, "URL: {}\n", project.web_url);

    if let Some(pipeline) = &rc.last_pipeline {
        out.push_str("### Last Pipeline\n");
        let _ = writeln!(out, "Status: {}", pipeline.status);
        let _ = writeln!(out, "Ref: {}", pipeline.r#ref);
        let _ = writeln!(out, "SHA: {}", pipeline.sha);
        let _ = writeln!(out, "Created At: {}\n", render_timestamp(&pipeline.created_at));
    }

    if let Some(deployment) = &rc.last_deployment {
        out.push_str("### Last Deployment\n");
        let _ = writeln!(out, "Status: {}", deployment.status);
        let _ = writeln!(out, "Environment: {}", deployment.environment.name);
        let _ = writeln!(out, "Created At: {}\n", render_timestamp(&deployment.created_at));
    }

    if !rc.recent_commits.is_empty() {
        out.push_str("### Recent Commits\n");
        for (index, commit) in rc.recent_commits.iter().enumerate() {
            let _ = writeln!(
                out,
                "{}. [{}] {} by {}: {}",
                index + 1,
                render_timestamp(&commit.created_at),
                commit.short_id,
                commit.author_name,
                commit.title
            );
        }
        out.push('\n');
    }
}

fn write_related_resources(out: &mut String, rc: &ResourceContext) {
    if rc.related_resources.is_empty() {
        return;
    }

    // Group entries by their kind component: `Kind/Name` or
    // `Namespace/Kind/Name`.
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for entry in &rc.related_resources {
        let parts: Vec<&str> = entry.split('/').collect();
        let (kind, display) = match parts.as_slice() {
            [kind, name] => ((*kind).to_string(), (*name).to_string()),
            [namespace, kind, name] => ((*kind).to_string(), format!("{namespace}/{name}")),
            _ => ("Other".to_string(), entry.clone()),
        };
        grouped.entry(kind).or_default().push(display);
    }

    out.push_str("## Related Resources\n");
    for (kind, names) in grouped {
        let _ = writeln!(out, "### {kind}");
        for name in names.iter().take(RELATED_RESOURCES_PER_KIND) {
            let _ = writeln!(out, "- {name}");
        }
        if names.len() > RELATED_RESOURCES_PER_KIND {
            let _ = writeln!(out, "... and {} more", names.len() - RELATED_RESOURCES_PER_KIND);
        }
    }
    out.push('\n');
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Render a timestamp that may be an integer epoch, a float epoch, or a
/// string. Unparseable strings pass through verbatim.
pub fn render_timestamp(value: &Value) -> String {
    match value {
        Value::Number(number) => {
            let epoch = number
                .as_i64()
                .or_else(|| number.as_f64().map(|f| f as i64));
            match epoch.and_then(|secs| Utc.timestamp_opt(secs, 0).single()) {
                Some(at) => at.to_rfc3339_opts(SecondsFormat::Secs, true),
                None => "unknown timestamp".to_string(),
            }
        }
        Value::String(text) => {
            if let Ok(at) = DateTime::parse_from_rfc3339(text) {
                return at.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Secs, true);
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.3fZ") {
                return Utc
                    .from_utc_datetime(&naive)
                    .to_rfc3339_opts(SecondsFormat::Secs, true);
            }
            text.clone()
        }
        _ => "unknown timestamp".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ArgoApplication, ArgoSyncHistoryEntry, EventObject, GitLabCommit, GitLabPipeline,
        GitLabProject, K8sEvent,
    };
    use serde_json::json;

    fn sample_rc() -> ResourceContext {
        let mut app = ArgoApplication::default();
        app.metadata.name = "web".into();
        app.spec.source.repo_url = "https://gitlab.example.com/platform/web.git".into();
        app.spec.source.path = "apps/web".into();
        app.spec.source.target_revision = "main".into();

        ResourceContext {
            api_version: "apps/v1".into(),
            argo_application: Some(app),
            argo_sync_status: "Synced".into(),
            argo_health_status: "Healthy".into(),
            argo_sync_history: vec![ArgoSyncHistoryEntry {
                id: 3,
                revision: "abc123".into(),
                deployed_at: Some(Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()),
                status: "Succeeded".into(),
            }],
            gitlab_project: Some(GitLabProject {
                path_with_namespace: "platform/web".into(),
                web_url: "https://gitlab.example.com/platform/web".into(),
                ..Default::default()
            }),
            last_pipeline: Some(GitLabPipeline {
                id: 7,
                status: "success".into(),
                r#ref: "main".into(),
                sha: "abc123".into(),
                created_at: json!(1_740_000_000),
                ..Default::default()
            }),
            recent_commits: vec![GitLabCommit {
                short_id: "abc123".into(),
                author_name: "dev".into(),
                title: "Bump image".into(),
                created_at: json!("2025-03-01T10:00:00Z"),
                ..Default::default()
            }],
            events: vec![K8sEvent {
                reason: "Scheduled".into(),
                message: "assigned to node-1".into(),
                event_type: "Normal".into(),
                count: 1,
                first_time: None,
                last_time: None,
                object: EventObject::default(),
            }],
            related_resources: vec!["ReplicaSet/web-6c54f".into()],
            errors: vec!["Failed to list pipelines: timeout".into()],
            ..ResourceContext::new("Deployment", "web", "default")
        }
    }

    #[test]
    fn sections_appear_in_fixed_order() {
        let out = ContextAssembler::default().format(&sample_rc());
        let order = [
            "# Kubernetes Resource: Deployment/web",
            "## GitOps Application",
            "### Recent Sync History",
            "## Source Project",
            "### Last Pipeline",
            "### Recent Commits",
            "## Recent Kubernetes Events",
            "## Related Resources",
            "## Errors in Data Collection",
        ];
        let mut last = 0;
        for marker in order {
            let position = out.find(marker).unwrap_or_else(|| panic!("missing {marker}"));
            assert!(position >= last, "{marker} out of order");
            last = position;
        }
    }

    #[test]
    fn formatting_is_deterministic() {
        let assembler = ContextAssembler::default();
        let rc = sample_rc();
        assert_eq!(assembler.format(&rc), assembler.format(&rc));
    }

    #[test]
    fn combine_of_one_wraps_format() {
        let assembler = ContextAssembler::default();
        let rc = sample_rc();
        let single = assembler.format(&rc);
        let combined = assembler.combine(std::slice::from_ref(&rc));
        assert!(combined.starts_with("# Kubernetes GitOps Context (1 resources)"));
        assert!(combined.contains("--- RESOURCE 1/1 ---"));
        assert!(combined.contains(&single));
    }

    #[test]
    fn output_respects_bound() {
        let assembler = ContextAssembler::new(2000);
        let mut rc = sample_rc();
        rc.resource_data = "x. ".repeat(5000);
        let out = assembler.format(&rc);
        assert!(out.len() <= 2000);
        assert!(out.contains("[...Content truncated...]"));
    }

    #[test]
    fn deployment_section_renders_metadata() {
        let mut rc = sample_rc();
        rc.metadata.insert("desiredReplicas".into(), json!(5));
        rc.metadata.insert("availableReplicas".into(), json!(3));
        rc.metadata.insert(
            "containers".into(),
            json!([{
                "name": "app",
                "image": "registry.example.com/web:1.2",
                "resources": {"requests": {"cpu": "100m", "memory": "128Mi"}, "limits": {"cpu": "200m"}}
            }]),
        );
        let out = ContextAssembler::default().format(&rc);
        assert!(out.contains("## Deployment Status"));
        assert!(out.contains("Desired Replicas: 5"));
        assert!(out.contains("### Containers"));
        assert!(out.contains("- app (registry.example.com/web:1.2)"));
        assert!(out.contains("requests: cpu=100m, memory=128Mi"));
        assert!(out.contains("limits: cpu=200m"));
    }

    #[test]
    fn namespace_sections_render_counts_and_unhealthy() {
        let mut rc = ResourceContext::new("Namespace", "prod", "");
        rc.metadata.insert(
            "resources".into(),
            json!({"Pod": ["a", "b", "c", "d", "e", "f"], "Service": ["web"]}),
        );
        rc.metadata.insert(
            "health".into(),
            json!({"Pod": {"a": "healthy", "b": "unhealthy", "c": "unhealthy"}}),
        );
        let out = ContextAssembler::default().format(&rc);
        assert!(out.contains("## Resources in Namespace"));
        assert!(out.contains("- Pod: 6 (a, b, c, d, e, ...)"));
        assert!(out.contains("- Service: 1 (web)"));
        assert!(out.contains("## Health Status"));
        assert!(out.contains("- Pod: 1 healthy, 2 unhealthy, 0 progressing, 0 unknown"));
        assert!(out.contains("  unhealthy: b, c"));
    }

    #[test]
    fn related_resources_grouped_and_capped() {
        let mut rc = ResourceContext::new("Pod", "web-1", "default");
        rc.related_resources.push("Commit/abc123".into());
        for index in 0..12 {
            rc.related_resources.push(format!("ConfigMap/cfg-{index}"));
        }
        rc.related_resources.push("prod/Secret/token".into());
        let out = ContextAssembler::default().format(&rc);
        assert!(out.contains("### Commit\n- abc123"));
        assert!(out.contains("### ConfigMap"));
        assert!(out.contains("... and 2 more"));
        assert!(out.contains("### Secret\n- prod/token"));
    }

    #[test]
    fn timestamps_render_in_all_shapes() {
        assert_eq!(render_timestamp(&json!(1735689600)), "2025-01-01T00:00:00Z");
        assert_eq!(render_timestamp(&json!(1735689600.7)), "2025-01-01T00:00:00Z");
        assert_eq!(render_timestamp(&json!("2025-01-01T00:00:00Z")), "2025-01-01T00:00:00Z");
        assert_eq!(
            render_timestamp(&json!("2025-01-01T00:00:00.000Z")),
            "2025-01-01T00:00:00Z"
        );
        assert_eq!(render_timestamp(&json!("not a time")), "not a time");
        assert_eq!(render_timestamp(&Value::Null), "unknown timestamp");
    }
}
