//! External Helm chart rendering.
//!
//! Charts are materialised into a scratch directory and rendered with the
//! `helm template` subprocess; its stdout is the only trusted output. The
//! scratch directory is released when the render completes.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use serde_yaml::Value;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};

/// Subprocess budget; renders that run longer are killed.
pub const RENDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Identity extracted from one rendered manifest document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRef {
    pub kind: String,
    pub name: String,
    pub namespace: String,
}

impl ManifestRef {
    /// `Kind/Name`, or `Namespace/Kind/Name` when a namespace is set.
    pub fn identifier(&self) -> String {
        if self.namespace.is_empty() {
            format!("{}/{}", self.kind, self.name)
        } else {
            format!("{}/{}/{}", self.namespace, self.kind, self.name)
        }
    }
}

/// Renders Helm charts through the external `helm` binary.
pub struct HelmRenderer {
    timeout: Duration,
}

impl Default for HelmRenderer {
    fn default() -> Self {
        Self { timeout: RENDER_TIMEOUT }
    }
}

impl HelmRenderer {
    /// Write `files` (paths relative to the chart root) into a scratch
    /// directory, render the chart, and return the individual manifest
    /// documents.
    pub async fn render(&self, files: &BTreeMap<String, String>) -> Result<Vec<String>> {
        let scratch = tempfile::tempdir()
            .map_err(|err| Error::Internal(format!("creating chart scratch directory: {err}")))?;
        let chart_dir = scratch.path().join("chart");

        for (rel_path, content) in files {
            let full = chart_dir.join(rel_path);
            if let Some(parent) = full.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|err| Error::Internal(format!("creating {}: {err}", parent.display())))?;
            }
            tokio::fs::write(&full, content)
                .await
                .map_err(|err| Error::Internal(format!("writing {}: {err}", full.display())))?;
        }

        let output = self.run_template(&chart_dir).await?;
        Ok(split_yaml_documents(&output))
    }

    async fn run_template(&self, chart_dir: &Path) -> Result<String> {
        let mut command = Command::new("helm");
        command
            .arg("template")
            .arg("release")
            .arg(chart_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(chart_dir = %chart_dir.display(), "rendering chart with helm template");

        let result = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| Error::Internal("helm template timed out".to_string()))?
            .map_err(|err| Error::Internal(format!("spawning helm: {err}")))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(Error::Internal(format!("helm template failed: {}", stderr.trim())));
        }
        Ok(String::from_utf8_lossy(&result.stdout).into_owned())
    }
}

/// Split multi-document YAML on `---` boundaries, dropping empty documents.
pub fn split_yaml_documents(output: &str) -> Vec<String> {
    output
        .split("\n---")
        .flat_map(|chunk| chunk.split("---\n"))
        .map(str::trim)
        .filter(|doc| !doc.is_empty() && *doc != "---")
        .map(str::to_string)
        .collect()
}

/// Extract `kind`, `metadata.name` (or a top-level `name`), and the
/// namespace from one rendered document. Documents that do not look like a
/// resource yield `None`.
pub fn extract_manifest_ref(document: &str) -> Option<ManifestRef> {
    let value: Value = serde_yaml::from_str(document).ok()?;
    let mapping = value.as_mapping()?;

    let kind = mapping.get("kind")?.as_str()?.to_string();
    let metadata = mapping.get("metadata").and_then(Value::as_mapping);
    let name = metadata
        .and_then(|m| m.get("name"))
        .or_else(|| mapping.get("name"))
        .and_then(Value::as_str)?
        .to_string();
    let namespace = metadata
        .and_then(|m| m.get("namespace"))
        .or_else(|| mapping.get("namespace"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    if kind.is_empty() || name.is_empty() {
        return None;
    }
    Some(ManifestRef { kind, name, namespace })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_documents_and_skips_blanks() {
        let output = "\nkind: Service\n---\nkind: Deployment\n---\n\n---\nkind: ConfigMap\n";
        let docs = split_yaml_documents(output);
        assert_eq!(docs.len(), 3);
        assert!(docs[0].contains("Service"));
        assert!(docs[2].contains("ConfigMap"));
    }

    #[test]
    fn extracts_identity_from_manifest() {
        let doc = "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\n  namespace: prod\n";
        let parsed = extract_manifest_ref(doc).unwrap();
        assert_eq!(parsed.kind, "Deployment");
        assert_eq!(parsed.name, "web");
        assert_eq!(parsed.namespace, "prod");
        assert_eq!(parsed.identifier(), "prod/Deployment/web");
    }

    #[test]
    fn namespace_is_optional() {
        let doc = "kind: ClusterRole\nmetadata:\n  name: reader\n";
        let parsed = extract_manifest_ref(doc).unwrap();
        assert_eq!(parsed.identifier(), "ClusterRole/reader");
    }

    #[test]
    fn non_resources_yield_none() {
        assert!(extract_manifest_ref("just: values\n").is_none());
        assert!(extract_manifest_ref("# comment only\n").is_none());
        assert!(extract_manifest_ref("kind: Service\n").is_none());
    }
}
