//! Opaque resource representation.
//!
//! CRDs make any static model incomplete, so the engine reads cluster
//! objects only through this minimal accessor surface over the raw JSON.
//! Missing paths are never errors; every accessor returns an `Option`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// An owner reference, reduced to what relationship inference needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerRef {
    pub kind: String,
    pub name: String,
}

/// A cluster object as an opaque nested map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawResource(Value);

impl RawResource {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    pub fn kind(&self) -> Option<&str> {
        self.0.get("kind").and_then(Value::as_str)
    }

    pub fn api_version(&self) -> Option<&str> {
        self.0.get("apiVersion").and_then(Value::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.nested_str(&["metadata", "name"])
    }

    pub fn namespace(&self) -> Option<&str> {
        self.nested_str(&["metadata", "namespace"])
    }

    pub fn labels(&self) -> BTreeMap<String, String> {
        string_map(self.nested(&["metadata", "labels"]))
    }

    pub fn annotations(&self) -> BTreeMap<String, String> {
        string_map(self.nested(&["metadata", "annotations"]))
    }

    pub fn owner_refs(&self) -> Vec<OwnerRef> {
        let Some(refs) = self.nested_slice(&["metadata", "ownerReferences"]) else {
            return Vec::new();
        };
        refs.iter()
            .filter_map(|entry| {
                let kind = entry.get("kind")?.as_str()?;
                let name = entry.get("name")?.as_str()?;
                Some(OwnerRef { kind: kind.to_string(), name: name.to_string() })
            })
            .collect()
    }

    pub fn nested(&self, path: &[&str]) -> Option<&Value> {
        nested_in(&self.0, path)
    }

    pub fn nested_str(&self, path: &[&str]) -> Option<&str> {
        self.nested(path).and_then(Value::as_str)
    }

    pub fn nested_i64(&self, path: &[&str]) -> Option<i64> {
        self.nested(path).and_then(Value::as_i64)
    }

    pub fn nested_bool(&self, path: &[&str]) -> Option<bool> {
        self.nested(path).and_then(Value::as_bool)
    }

    pub fn nested_slice(&self, path: &[&str]) -> Option<&Vec<Value>> {
        self.nested(path).and_then(Value::as_array)
    }

    pub fn nested_map(&self, path: &[&str]) -> Option<&Map<String, Value>> {
        self.nested(path).and_then(Value::as_object)
    }
}

/// Walk `path` through an arbitrary JSON value. Used both by `RawResource`
/// and when descending into slice elements (container statuses, volumes).
pub fn nested_in<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for segment in path {
        current = current.get(segment)?;
    }
    Some(current)
}

pub fn nested_str_in<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    nested_in(value, path).and_then(Value::as_str)
}

pub fn nested_i64_in(value: &Value, path: &[&str]) -> Option<i64> {
    nested_in(value, path).and_then(Value::as_i64)
}

pub fn nested_bool_in(value: &Value, path: &[&str]) -> Option<bool> {
    nested_in(value, path).and_then(Value::as_bool)
}

fn string_map(value: Option<&Value>) -> BTreeMap<String, String> {
    let Some(Value::Object(map)) = value else {
        return BTreeMap::new();
    };
    map.iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pod() -> RawResource {
        RawResource::new(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": "web-1",
                "namespace": "default",
                "labels": {"app": "web"},
                "ownerReferences": [{"kind": "ReplicaSet", "name": "web-6c54f"}]
            },
            "spec": {"containers": [{"name": "app", "image": "registry.example.com/web:1.2"}]},
            "status": {"phase": "Running", "containerStatuses": [{"restartCount": 2, "ready": true}]}
        }))
    }

    #[test]
    fn identity_accessors() {
        let pod = pod();
        assert_eq!(pod.kind(), Some("Pod"));
        assert_eq!(pod.api_version(), Some("v1"));
        assert_eq!(pod.name(), Some("web-1"));
        assert_eq!(pod.namespace(), Some("default"));
    }

    #[test]
    fn missing_paths_are_none_not_errors() {
        let pod = pod();
        assert_eq!(pod.nested_str(&["status", "missing", "deep"]), None);
        assert_eq!(pod.nested_i64(&["spec", "replicas"]), None);
        assert_eq!(pod.nested_bool(&["status", "ready"]), None);
        assert!(pod.nested_slice(&["spec", "volumes"]).is_none());
    }

    #[test]
    fn typed_accessors() {
        let pod = pod();
        assert_eq!(pod.nested_str(&["status", "phase"]), Some("Running"));
        let statuses = pod.nested_slice(&["status", "containerStatuses"]).unwrap();
        assert_eq!(nested_i64_in(&statuses[0], &["restartCount"]), Some(2));
        assert_eq!(nested_bool_in(&statuses[0], &["ready"]), Some(true));
    }

    #[test]
    fn owner_refs_and_labels() {
        let pod = pod();
        assert_eq!(
            pod.owner_refs(),
            vec![OwnerRef { kind: "ReplicaSet".into(), name: "web-6c54f".into() }]
        );
        assert_eq!(pod.labels().get("app").map(String::as_str), Some("web"));
        assert!(pod.annotations().is_empty());
    }
}
