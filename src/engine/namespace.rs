//! Namespace-wide analysis support.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde_json::json;

use crate::models::{K8sEvent, NamespaceAnalysis, NamespaceTopology, ResourceContext};

/// Cap on warning events quoted in the namespace prompt.
const PROMPT_WARNING_EVENTS: usize = 10;

/// Cap on normal events quoted in the namespace prompt.
const PROMPT_NORMAL_EVENTS: usize = 5;

/// Cap on recommendations lifted from the analysis text.
const MAX_EXTRACTED_RECOMMENDATIONS: usize = 10;

/// Build a `Namespace`-kind context whose metadata carries the topology
/// digests the assembler knows how to render.
pub fn namespace_resource_context(
    topology: &NamespaceTopology,
    events: Vec<K8sEvent>,
) -> ResourceContext {
    let mut rc = ResourceContext::new("Namespace", topology.namespace.clone(), "");
    rc.api_version = "v1".to_string();

    let resources: BTreeMap<&String, &Vec<String>> = topology.resources.iter().collect();
    rc.metadata.insert("resources".to_string(), json!(resources));

    let health: BTreeMap<&String, BTreeMap<&String, String>> = topology
        .health
        .iter()
        .map(|(kind, statuses)| {
            (kind, statuses.iter().map(|(name, status)| (name, status.to_string())).collect())
        })
        .collect();
    rc.metadata.insert("health".to_string(), json!(health));

    rc.events = events;
    rc
}

/// Extend the formatted namespace document with relationship and event
/// summaries plus the analysis request.
pub fn namespace_prompt(
    assembled: &str,
    topology: &NamespaceTopology,
    events: &[K8sEvent],
) -> String {
    let mut prompt = String::with_capacity(assembled.len() + 2048);
    prompt.push_str(assembled);

    if !topology.relationships.is_empty() {
        prompt.push_str("## Resource Relationships\n");
        let mut by_type: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for relationship in &topology.relationships {
            by_type.entry(relationship.relation_type.as_str()).or_default().push(format!(
                "{}/{} -> {}/{}",
                relationship.source_kind,
                relationship.source_name,
                relationship.target_kind,
                relationship.target_name
            ));
        }
        for (relation_type, entries) in by_type {
            let _ = writeln!(prompt, "### {} Relationships", capitalize(relation_type));
            for entry in entries {
                let _ = writeln!(prompt, "- {entry}");
            }
            prompt.push('\n');
        }
    }

    let warnings: Vec<&K8sEvent> = events.iter().filter(|e| e.is_warning()).collect();
    let normals: Vec<&K8sEvent> = events.iter().filter(|e| !e.is_warning()).collect();
    if !warnings.is_empty() {
        prompt.push_str("### Warning Events\n");
        for event in warnings.iter().take(PROMPT_WARNING_EVENTS) {
            let _ = writeln!(
                prompt,
                "- {}: {} ({}/{})",
                event.reason, event.message, event.object.kind, event.object.name
            );
        }
        prompt.push('\n');
    }
    if !normals.is_empty() {
        prompt.push_str("### Normal Events\n");
        for event in normals.iter().take(PROMPT_NORMAL_EVENTS) {
            let _ = writeln!(
                prompt,
                "- {}: {} ({}/{})",
                event.reason, event.message, event.object.kind, event.object.name
            );
        }
        prompt.push('\n');
    }

    prompt.push_str(
        "## Analysis Request\n\n\
         Based on the information above, provide a comprehensive analysis of this namespace:\n\n\
         1. Overall health assessment\n\
         2. Identification of any issues or problems\n\
         3. Analysis of resource relationships and dependencies\n\
         4. Potential bottlenecks or misconfigurations\n\
         5. Security concerns, if any can be identified\n\
         6. Specific recommendations for improvement\n\n\
         Structure the analysis with clear sections and make the recommendations specific and actionable.",
    );
    prompt
}

/// Populate the structured counts of a [`NamespaceAnalysis`] from a
/// topology.
pub fn analysis_from_topology(topology: &NamespaceTopology) -> NamespaceAnalysis {
    let mut analysis = NamespaceAnalysis { namespace: topology.namespace.clone(), ..Default::default() };
    for (kind, names) in &topology.resources {
        analysis.resource_counts.insert(kind.clone(), names.len());
    }
    for (kind, statuses) in &topology.health {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for status in statuses.values() {
            *counts.entry(status.to_string()).or_default() += 1;
        }
        analysis.health_status.insert(kind.clone(), counts);
    }
    analysis.relationships = topology.relationships.clone();
    analysis
}

/// Lift recommendation bullet lines out of the analysis text: lines after
/// a heading mentioning recommendations or suggestions, stripped of list
/// markers, capped at ten.
pub fn extract_recommendations(analysis: &str) -> Vec<String> {
    let mut recommendations = Vec::new();
    let mut in_recommendations = false;

    for line in analysis.lines() {
        let lowered = line.to_ascii_lowercase();
        if lowered.contains("recommendation") || lowered.contains("suggest") {
            in_recommendations = true;
            continue;
        }
        if !in_recommendations {
            continue;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let cleaned = strip_list_marker(trimmed);
        if !cleaned.is_empty() && recommendations.len() < MAX_EXTRACTED_RECOMMENDATIONS {
            recommendations.push(cleaned.to_string());
        }
    }
    recommendations
}

fn strip_list_marker(line: &str) -> &str {
    if let Some(rest) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
        return rest.trim();
    }
    let bytes = line.as_bytes();
    if bytes.len() > 3
        && bytes[0].is_ascii_digit()
        && (bytes[1] == b'.' || bytes[1] == b')')
        && bytes[2] == b' '
    {
        return line[3..].trim();
    }
    line
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HealthStatus, Relationship};

    fn topology() -> NamespaceTopology {
        let mut topology = NamespaceTopology::new("prod");
        topology.resources.insert("Pod".into(), vec!["web-1".into(), "web-2".into()]);
        topology
            .health
            .entry("Pod".into())
            .or_default()
            .extend([("web-1".to_string(), HealthStatus::Healthy), ("web-2".to_string(), HealthStatus::Unhealthy)]);
        topology.relationships.push(Relationship {
            source_kind: "Service".into(),
            source_name: "web".into(),
            source_namespace: "prod".into(),
            target_kind: "Pod".into(),
            target_name: "web-1".into(),
            target_namespace: "prod".into(),
            relation_type: "selects".into(),
        });
        topology
    }

    #[test]
    fn namespace_context_carries_topology_digests() {
        let rc = namespace_resource_context(&topology(), Vec::new());
        assert_eq!(rc.kind, "Namespace");
        assert_eq!(rc.name, "prod");
        assert_eq!(rc.metadata["resources"]["Pod"][0], "web-1");
        assert_eq!(rc.metadata["health"]["Pod"]["web-2"], "unhealthy");
    }

    #[test]
    fn prompt_groups_relationships_by_type() {
        let prompt = namespace_prompt("BASE\n", &topology(), &[]);
        assert!(prompt.starts_with("BASE\n"));
        assert!(prompt.contains("### Selects Relationships"));
        assert!(prompt.contains("- Service/web -> Pod/web-1"));
        assert!(prompt.contains("## Analysis Request"));
    }

    #[test]
    fn structured_analysis_counts() {
        let analysis = analysis_from_topology(&topology());
        assert_eq!(analysis.resource_counts["Pod"], 2);
        assert_eq!(analysis.health_status["Pod"]["healthy"], 1);
        assert_eq!(analysis.health_status["Pod"]["unhealthy"], 1);
        assert_eq!(analysis.relationships.len(), 1);
    }

    #[test]
    fn recommendation_extraction_strips_markers() {
        let text = "\
## Findings
Things are broken.

## Recommendations
- Scale up the deployment
* Fix the probe
1. Rotate the credentials
2) Check quota
Plain closing line
";
        let recommendations = extract_recommendations(text);
        assert_eq!(
            recommendations,
            vec![
                "Scale up the deployment",
                "Fix the probe",
                "Rotate the credentials",
                "Check quota",
                "Plain closing line",
            ]
        );
    }

    #[test]
    fn extraction_is_capped() {
        let mut text = String::from("Recommendations:\n");
        for index in 0..20 {
            text.push_str(&format!("- item {index}\n"));
        }
        assert_eq!(extract_recommendations(&text).len(), 10);
    }
}
