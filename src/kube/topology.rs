//! Namespace topology mapping.
//!
//! Lists every listable namespaced resource type concurrently, classifies
//! per-resource health, and infers typed relationships between resources.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::{HealthStatus, NamespaceTopology, Relationship};

use super::resource::{nested_str_in, RawResource};
use super::ClusterClient;

/// Upper bound on concurrent list calls; discovery catalogs can be large.
pub const MAX_LIST_WORKERS: usize = 16;

/// Maps a namespace into a [`NamespaceTopology`].
pub struct TopologyMapper {
    cluster: Arc<dyn ClusterClient>,
}

impl TopologyMapper {
    pub fn new(cluster: Arc<dyn ClusterClient>) -> Self {
        Self { cluster }
    }

    /// Snapshot the namespace. Fails only if discovery fails; individual
    /// kinds that cannot be listed are logged and omitted.
    pub async fn namespace_topology(&self, namespace: &str) -> Result<NamespaceTopology> {
        let catalog = self.cluster.discover().await?;

        let collected: Mutex<BTreeMap<String, Vec<RawResource>>> = Mutex::new(BTreeMap::new());
        futures::stream::iter(catalog)
            .for_each_concurrent(MAX_LIST_WORKERS, |group| {
                let collected = &collected;
                async move {
                    for resource in &group.resources {
                        if resource.name.contains('/') || !resource.namespaced || !resource.listable() {
                            continue;
                        }
                        match self.cluster.list(&resource.name, namespace).await {
                            Ok(items) if !items.is_empty() => {
                                let mut map = collected.lock().unwrap_or_else(|e| e.into_inner());
                                map.entry(resource.kind.clone()).or_insert(items);
                            }
                            Ok(_) => {}
                            Err(err) => {
                                warn!(
                                    namespace = %namespace,
                                    resource = %resource.name,
                                    error = %err,
                                    "failed to list resources, omitting kind"
                                );
                            }
                        }
                    }
                }
            })
            .await;

        let collected = collected.into_inner().unwrap_or_else(|e| e.into_inner());
        let mut topology = NamespaceTopology::new(namespace);

        for (kind, items) in &collected {
            let names: Vec<String> =
                items.iter().filter_map(|r| r.name().map(str::to_string)).collect();
            let health: BTreeMap<String, HealthStatus> = items
                .iter()
                .filter_map(|r| r.name().map(|n| (n.to_string(), classify_health(r))))
                .collect();
            topology.resources.insert(kind.clone(), names);
            topology.health.insert(kind.clone(), health);
        }

        topology.relationships = infer_relationships(&collected, namespace);

        debug!(
            namespace = %namespace,
            resource_types = topology.resources.len(),
            relationships = topology.relationships.len(),
            "namespace topology mapped"
        );
        Ok(topology)
    }
}

/// Per-kind health classification.
pub fn classify_health(resource: &RawResource) -> HealthStatus {
    match resource.kind().unwrap_or_default() {
        "Pod" => match resource.nested_str(&["status", "phase"]) {
            Some("Running") | Some("Succeeded") => HealthStatus::Healthy,
            Some("Pending") => HealthStatus::Progressing,
            Some("Failed") => HealthStatus::Unhealthy,
            _ => HealthStatus::Unknown,
        },
        "Deployment" | "StatefulSet" | "DaemonSet" | "ReplicaSet" => {
            let desired = resource.nested_i64(&["spec", "replicas"]).unwrap_or(1);
            match resource.nested_i64(&["status", "availableReplicas"]) {
                Some(available) if available == desired => HealthStatus::Healthy,
                Some(available) if available > 0 => HealthStatus::Progressing,
                _ => HealthStatus::Unhealthy,
            }
        }
        // Endpoint probing is out of scope.
        "Service" => HealthStatus::Healthy,
        "Ingress" => match resource.nested_slice(&["status", "loadBalancer", "ingress"]) {
            Some(entries) if !entries.is_empty() => HealthStatus::Healthy,
            _ => HealthStatus::Progressing,
        },
        "PersistentVolumeClaim" => match resource.nested_str(&["status", "phase"]) {
            Some("Bound") => HealthStatus::Healthy,
            Some("Pending") => HealthStatus::Progressing,
            _ => HealthStatus::Unhealthy,
        },
        "Job" => {
            let conditions = resource.nested_slice(&["status", "conditions"]);
            let Some(conditions) = conditions else {
                return HealthStatus::Progressing;
            };
            for condition in conditions {
                let cond_type = nested_str_in(condition, &["type"]).unwrap_or_default();
                let status = nested_str_in(condition, &["status"]).unwrap_or_default();
                if cond_type == "Complete" && status == "True" {
                    return HealthStatus::Healthy;
                }
                if cond_type == "Failed" && status == "True" {
                    return HealthStatus::Unhealthy;
                }
            }
            HealthStatus::Progressing
        }
        _ => fallback_condition_health(resource),
    }
}

/// Generic conditions scan for kinds without a dedicated rule.
fn fallback_condition_health(resource: &RawResource) -> HealthStatus {
    let Some(conditions) = resource.nested_slice(&["status", "conditions"]) else {
        return HealthStatus::Unknown;
    };
    for condition in conditions {
        let cond_type = nested_str_in(condition, &["type"]).unwrap_or_default();
        let status = nested_str_in(condition, &["status"]).unwrap_or_default();
        if status != "True" {
            continue;
        }
        match cond_type {
            "Ready" | "Available" => return HealthStatus::Healthy,
            "Progressing" => return HealthStatus::Progressing,
            "Failed" | "Error" => return HealthStatus::Unhealthy,
            _ => {}
        }
    }
    HealthStatus::Unknown
}

/// Infer typed edges from the collected objects, deduplicated by the full
/// 7-tuple.
fn infer_relationships(
    collected: &BTreeMap<String, Vec<RawResource>>,
    namespace: &str,
) -> Vec<Relationship> {
    let mut edges = Vec::new();
    let empty = Vec::new();
    let pods = collected.get("Pod").unwrap_or(&empty);

    for items in collected.values() {
        for resource in items {
            let Some(name) = resource.name() else { continue };
            let kind = resource.kind().unwrap_or_default();

            for owner in resource.owner_refs() {
                edges.push(edge(&owner.kind, &owner.name, namespace, kind, name, namespace, "owns"));
            }

            match kind {
                "Service" => {
                    let selector = resource
                        .nested_map(&["spec", "selector"])
                        .map(|m| {
                            m.iter()
                                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                                .collect::<BTreeMap<_, _>>()
                        })
                        .unwrap_or_default();
                    if selector.is_empty() {
                        continue;
                    }
                    for pod in pods {
                        let labels = pod.labels();
                        let matches = selector.iter().all(|(k, v)| labels.get(k) == Some(v));
                        if matches {
                            if let Some(pod_name) = pod.name() {
                                edges.push(edge(
                                    "Service", name, namespace, "Pod", pod_name, namespace,
                                    "selects",
                                ));
                            }
                        }
                    }
                }
                "Pod" => pod_edges(resource, name, namespace, &mut edges),
                "PersistentVolumeClaim" => {
                    if let Some(volume) = resource.nested_str(&["spec", "volumeName"]) {
                        if !volume.is_empty() {
                            edges.push(edge(
                                "PersistentVolumeClaim",
                                name,
                                namespace,
                                "PersistentVolume",
                                volume,
                                "",
                                "binds",
                            ));
                        }
                    }
                }
                "Ingress" => ingress_edges(resource, name, namespace, &mut edges),
                _ => {}
            }
        }
    }

    dedup_relationships(edges)
}

/// ConfigMap/Secret edges from a pod's volumes and container env wiring.
fn pod_edges(pod: &RawResource, name: &str, namespace: &str, edges: &mut Vec<Relationship>) {
    if let Some(volumes) = pod.nested_slice(&["spec", "volumes"]) {
        for volume in volumes {
            if let Some(cm) = nested_str_in(volume, &["configMap", "name"]) {
                edges.push(edge("Pod", name, namespace, "ConfigMap", cm, namespace, "mounts"));
            }
            if let Some(secret) = nested_str_in(volume, &["secret", "secretName"]) {
                edges.push(edge("Pod", name, namespace, "Secret", secret, namespace, "mounts"));
            }
        }
    }

    let Some(containers) = pod.nested_slice(&["spec", "containers"]) else { return };
    for container in containers {
        if let Some(env_from) = container.get("envFrom").and_then(Value::as_array) {
            for source in env_from {
                if let Some(cm) = nested_str_in(source, &["configMapRef", "name"]) {
                    edges.push(edge("Pod", name, namespace, "ConfigMap", cm, namespace, "configures"));
                }
                if let Some(secret) = nested_str_in(source, &["secretRef", "name"]) {
                    edges.push(edge("Pod", name, namespace, "Secret", secret, namespace, "configures"));
                }
            }
        }
        if let Some(env) = container.get("env").and_then(Value::as_array) {
            for var in env {
                if let Some(cm) = nested_str_in(var, &["valueFrom", "configMapKeyRef", "name"]) {
                    edges.push(edge("Pod", name, namespace, "ConfigMap", cm, namespace, "configures"));
                }
                if let Some(secret) = nested_str_in(var, &["valueFrom", "secretKeyRef", "name"]) {
                    edges.push(edge("Pod", name, namespace, "Secret", secret, namespace, "configures"));
                }
            }
        }
    }
}

/// Service edges from ingress rules, accepting both networking/v1 and the
/// legacy backend shape.
fn ingress_edges(ingress: &RawResource, name: &str, namespace: &str, edges: &mut Vec<Relationship>) {
    let Some(rules) = ingress.nested_slice(&["spec", "rules"]) else { return };
    for rule in rules {
        let Some(paths) = nested_in_slice(rule, &["http", "paths"]) else { continue };
        for path in paths {
            let service = nested_str_in(path, &["backend", "service", "name"])
                .or_else(|| nested_str_in(path, &["backend", "serviceName"]));
            if let Some(service) = service {
                edges.push(edge("Ingress", name, namespace, "Service", service, namespace, "routes"));
            }
        }
    }
}

fn nested_in_slice<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Vec<Value>> {
    super::resource::nested_in(value, path).and_then(Value::as_array)
}

fn edge(
    source_kind: &str,
    source_name: &str,
    source_namespace: &str,
    target_kind: &str,
    target_name: &str,
    target_namespace: &str,
    relation_type: &str,
) -> Relationship {
    Relationship {
        source_kind: source_kind.to_string(),
        source_name: source_name.to_string(),
        source_namespace: source_namespace.to_string(),
        target_kind: target_kind.to_string(),
        target_name: target_name.to_string(),
        target_namespace: target_namespace.to_string(),
        relation_type: relation_type.to_string(),
    }
}

/// Drop duplicate edges, preserving first-seen order.
pub fn dedup_relationships(edges: Vec<Relationship>) -> Vec<Relationship> {
    let mut seen = HashSet::new();
    edges.into_iter().filter(|rel| seen.insert(rel.dedup_key())).collect()
}
