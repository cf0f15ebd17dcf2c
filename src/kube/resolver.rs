//! Resource kind resolution.
//!
//! Maps a user-supplied kind (any case, singular or plural) to the API
//! group/version/plural the dynamic client needs, plus its scope. Holds a
//! built-in table for the well-known kinds and falls back to the discovery
//! catalog, which is cached with a TTL.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

use super::{ApiGroupResources, ApiResourceInfo};

/// Default lifetime of a cached discovery catalog.
pub const DISCOVERY_CACHE_TTL: Duration = Duration::from_secs(600);

/// A resolved resource kind, ready for the dynamic API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedKind {
    pub group: String,
    pub version: String,
    /// Plural resource name, e.g. `deployments`.
    pub plural: String,
    /// Canonical kind, e.g. `Deployment`.
    pub kind: String,
    pub namespaced: bool,
}

impl ResolvedKind {
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

struct CacheState {
    entries: HashMap<String, ResolvedKind>,
    refreshed_at: Option<Instant>,
}

/// Kind resolver with a built-in table and a TTL-bounded discovery cache.
pub struct KindResolver {
    cache: RwLock<CacheState>,
    ttl: Duration,
}

impl Default for KindResolver {
    fn default() -> Self {
        Self::new(DISCOVERY_CACHE_TTL)
    }
}

impl KindResolver {
    pub fn new(ttl: Duration) -> Self {
        Self { cache: RwLock::new(CacheState { entries: HashMap::new(), refreshed_at: None }), ttl }
    }

    /// Look up a kind in the built-in table or the cached catalog.
    /// Returns `None` when a discovery refresh is needed.
    pub fn resolve_cached(&self, kind: &str) -> Option<ResolvedKind> {
        let key = kind.to_ascii_lowercase();
        if let Some(found) = builtin(&key) {
            return Some(found);
        }
        let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
        cache.entries.get(&key).cloned()
    }

    /// Whether the discovery cache is absent or older than the TTL.
    pub fn needs_refresh(&self) -> bool {
        let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
        match cache.refreshed_at {
            Some(at) => at.elapsed() > self.ttl,
            None => true,
        }
    }

    /// Replace the cached catalog with a fresh discovery snapshot. Each
    /// resource is indexed under its plural name, singular name, and kind.
    pub fn update(&self, catalog: &[ApiGroupResources]) {
        let mut entries = HashMap::new();
        for group in catalog {
            let (api_group, version) = split_group_version(&group.group_version);
            for resource in &group.resources {
                // Sub-resources like `pods/log` are never directly addressable.
                if resource.name.contains('/') {
                    continue;
                }
                let resolved = ResolvedKind {
                    group: api_group.to_string(),
                    version: version.to_string(),
                    plural: resource.name.clone(),
                    kind: resource.kind.clone(),
                    namespaced: resource.namespaced,
                };
                for key in resolution_keys(resource) {
                    entries.entry(key).or_insert_with(|| resolved.clone());
                }
            }
        }
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        cache.entries = entries;
        cache.refreshed_at = Some(Instant::now());
    }

    /// Final lookup after a refresh; misses become `Error::UnknownKind`.
    pub fn resolve_or_unknown(&self, kind: &str) -> Result<ResolvedKind> {
        self.resolve_cached(kind).ok_or_else(|| Error::UnknownKind(kind.to_string()))
    }
}

fn resolution_keys(resource: &ApiResourceInfo) -> Vec<String> {
    let mut keys = vec![resource.name.to_ascii_lowercase()];
    if !resource.singular_name.is_empty() {
        keys.push(resource.singular_name.to_ascii_lowercase());
    }
    keys.push(resource.kind.to_ascii_lowercase());
    keys.dedup();
    keys
}

fn split_group_version(group_version: &str) -> (&str, &str) {
    match group_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", group_version),
    }
}

/// Well-known kinds, resolvable without a cluster round-trip.
fn builtin(key: &str) -> Option<ResolvedKind> {
    let (group, version, plural, kind, namespaced) = match key {
        "pod" | "pods" => ("", "v1", "pods", "Pod", true),
        "deployment" | "deployments" => ("apps", "v1", "deployments", "Deployment", true),
        "service" | "services" => ("", "v1", "services", "Service", true),
        "configmap" | "configmaps" => ("", "v1", "configmaps", "ConfigMap", true),
        "secret" | "secrets" => ("", "v1", "secrets", "Secret", true),
        "statefulset" | "statefulsets" => ("apps", "v1", "statefulsets", "StatefulSet", true),
        "daemonset" | "daemonsets" => ("apps", "v1", "daemonsets", "DaemonSet", true),
        "job" | "jobs" => ("batch", "v1", "jobs", "Job", true),
        "cronjob" | "cronjobs" => ("batch", "v1", "cronjobs", "CronJob", true),
        "ingress" | "ingresses" => ("networking.k8s.io", "v1", "ingresses", "Ingress", true),
        "namespace" | "namespaces" => ("", "v1", "namespaces", "Namespace", false),
        "node" | "nodes" => ("", "v1", "nodes", "Node", false),
        "pv" | "persistentvolume" | "persistentvolumes" => {
            ("", "v1", "persistentvolumes", "PersistentVolume", false)
        }
        "pvc" | "persistentvolumeclaim" | "persistentvolumeclaims" => {
            ("", "v1", "persistentvolumeclaims", "PersistentVolumeClaim", true)
        }
        "event" | "events" => ("", "v1", "events", "Event", true),
        _ => return None,
    };
    Some(ResolvedKind {
        group: group.to_string(),
        version: version.to_string(),
        plural: plural.to_string(),
        kind: kind.to_string(),
        namespaced,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<ApiGroupResources> {
        vec![ApiGroupResources {
            group_version: "example.io/v1alpha1".into(),
            resources: vec![
                ApiResourceInfo {
                    name: "widgets".into(),
                    singular_name: "widget".into(),
                    kind: "Widget".into(),
                    verbs: vec!["get".into(), "list".into()],
                    namespaced: true,
                },
                ApiResourceInfo {
                    name: "widgets/status".into(),
                    singular_name: String::new(),
                    kind: "Widget".into(),
                    verbs: vec!["get".into()],
                    namespaced: true,
                },
            ],
        }]
    }

    #[test]
    fn builtin_kinds_resolve_without_discovery() {
        let resolver = KindResolver::default();
        let resolved = resolver.resolve_cached("Deployment").unwrap();
        assert_eq!(resolved.group, "apps");
        assert_eq!(resolved.plural, "deployments");
        assert!(resolved.namespaced);
        assert!(!resolver.resolve_cached("node").unwrap().namespaced);
    }

    #[test]
    fn singular_plural_and_case_are_equivalent() {
        let resolver = KindResolver::default();
        let a = resolver.resolve_cached("pod").unwrap();
        let b = resolver.resolve_cached("Pod").unwrap();
        let c = resolver.resolve_cached("pods").unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn discovery_catalog_resolves_custom_kinds() {
        let resolver = KindResolver::default();
        assert!(resolver.resolve_cached("widget").is_none());
        resolver.update(&catalog());
        for key in ["widget", "widgets", "Widget", "WIDGET"] {
            let resolved = resolver.resolve_cached(key).expect(key);
            assert_eq!(resolved.group, "example.io");
            assert_eq!(resolved.version, "v1alpha1");
            assert_eq!(resolved.plural, "widgets");
        }
    }

    #[test]
    fn subresources_are_skipped() {
        let resolver = KindResolver::default();
        resolver.update(&catalog());
        assert_eq!(resolver.resolve_cached("widgets").unwrap().plural, "widgets");
        assert!(resolver.resolve_cached("widgets/status").is_none());
    }

    #[test]
    fn unknown_kind_error_after_refresh() {
        let resolver = KindResolver::default();
        resolver.update(&catalog());
        let err = resolver.resolve_or_unknown("gadget").unwrap_err();
        assert!(matches!(err, Error::UnknownKind(k) if k == "gadget"));
    }

    #[test]
    fn ttl_forces_refresh() {
        let resolver = KindResolver::new(Duration::ZERO);
        assert!(resolver.needs_refresh());
        resolver.update(&catalog());
        // Zero TTL: immediately stale again.
        assert!(resolver.needs_refresh());

        let fresh = KindResolver::default();
        fresh.update(&catalog());
        assert!(!fresh.needs_refresh());
    }

    #[test]
    fn api_version_rendering() {
        let resolver = KindResolver::default();
        assert_eq!(resolver.resolve_cached("pod").unwrap().api_version(), "v1");
        assert_eq!(resolver.resolve_cached("deployment").unwrap().api_version(), "apps/v1");
    }
}
