//! Helm change correlation.
//!
//! Identifies charts touched by a diff, re-renders them at the change's
//! head commit, and reports the identities of the manifests they produce.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::error::Result;
use crate::gitlab::SourceHostClient;
use crate::helm::{extract_manifest_ref, HelmRenderer};
use crate::models::GitLabDiff;

/// Rendered-manifest cache bound; entries are keyed by commit + chart path.
const RENDER_CACHE_CAPACITY: usize = 64;

/// Small insertion-tracking LRU for rendered chart output. Process-local
/// and discardable.
struct RenderCache {
    entries: HashMap<String, Vec<String>>,
    order: VecDeque<String>,
    capacity: usize,
}

impl RenderCache {
    fn new(capacity: usize) -> Self {
        Self { entries: HashMap::new(), order: VecDeque::new(), capacity }
    }

    fn get(&mut self, key: &str) -> Option<Vec<String>> {
        let found = self.entries.get(key).cloned();
        if found.is_some() {
            self.order.retain(|k| k != key);
            self.order.push_back(key.to_string());
        }
        found
    }

    fn put(&mut self, key: String, value: Vec<String>) {
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            if let Some(evicted) = self.order.pop_front() {
                self.entries.remove(&evicted);
            }
        }
        self.order.retain(|k| k != &key);
        self.order.push_back(key.clone());
        self.entries.insert(key, value);
    }
}

/// Correlates Helm chart changes with the Kubernetes resources they render.
pub struct HelmCorrelator {
    source: Arc<dyn SourceHostClient>,
    renderer: HelmRenderer,
    cache: Mutex<RenderCache>,
}

impl HelmCorrelator {
    pub fn new(source: Arc<dyn SourceHostClient>) -> Self {
        Self {
            source,
            renderer: HelmRenderer::default(),
            cache: Mutex::new(RenderCache::new(RENDER_CACHE_CAPACITY)),
        }
    }

    /// Resource identifiers produced by charts a commit touches.
    pub async fn commit_changes(&self, project: &str, sha: &str) -> Result<Vec<String>> {
        let diffs = self.source.get_commit_diff(project, sha).await?;
        let charts = identify_helm_charts(&diffs);
        if charts.is_empty() {
            debug!(project = %project, sha = %sha, "no Helm chart changes in commit");
            return Ok(Vec::new());
        }
        self.analyze_charts(project, sha, charts).await
    }

    /// Resource identifiers produced by charts a merge request touches,
    /// rendered at the merge request's head commit.
    pub async fn merge_request_changes(&self, project: &str, iid: u64) -> Result<Vec<String>> {
        let merge_request = self.source.get_merge_request_changes(project, iid).await?;
        let charts = identify_helm_charts(&merge_request.changes);
        if charts.is_empty() {
            debug!(project = %project, iid, "no Helm chart changes in merge request");
            return Ok(Vec::new());
        }

        let head = match self.source.get_merge_request_commits(project, iid).await {
            Ok(commits) if !commits.is_empty() => commits[0].id.clone(),
            _ => merge_request.diff_refs.head_sha.clone(),
        };
        self.analyze_charts(project, &head, charts).await
    }

    async fn analyze_charts(
        &self,
        project: &str,
        reference: &str,
        charts: BTreeMap<String, Vec<String>>,
    ) -> Result<Vec<String>> {
        let mut identifiers = Vec::new();
        for (chart_path, changed_files) in charts {
            match self.analyze_chart(project, reference, &chart_path, &changed_files).await {
                Ok(found) => identifiers.extend(found),
                Err(err) => {
                    warn!(chart = %chart_path, error = %err, "failed to analyze Helm chart, skipping");
                }
            }
        }
        Ok(identifiers)
    }

    async fn analyze_chart(
        &self,
        project: &str,
        reference: &str,
        chart_path: &str,
        changed_files: &[String],
    ) -> Result<Vec<String>> {
        let cache_key = format!("{reference}:{chart_path}");
        if let Some(cached) = self.cache.lock().unwrap_or_else(|e| e.into_inner()).get(&cache_key) {
            debug!(chart = %chart_path, reference = %reference, "using cached chart render");
            return Ok(cached);
        }

        let mut files = BTreeMap::new();
        for base in ["Chart.yaml", "values.yaml"] {
            let path = format!("{chart_path}/{base}");
            match self.source.get_file_content(project, &path, reference).await {
                Ok(content) => {
                    files.insert(base.to_string(), content);
                }
                Err(err) => warn!(file = %path, error = %err, "failed to fetch chart file"),
            }
        }
        for file in changed_files {
            if !file.contains("templates/") {
                continue;
            }
            match self.source.get_file_content(project, file, reference).await {
                Ok(content) => {
                    let relative =
                        file.strip_prefix(&format!("{chart_path}/")).unwrap_or(file).to_string();
                    files.insert(relative, content);
                }
                Err(err) => warn!(file = %file, error = %err, "failed to fetch template file"),
            }
        }

        let documents = self.renderer.render(&files).await?;
        let identifiers: Vec<String> = documents
            .iter()
            .filter_map(|doc| extract_manifest_ref(doc))
            .map(|reference| reference.identifier())
            .collect();

        debug!(chart = %chart_path, count = identifiers.len(), "analyzed Helm chart");
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .put(cache_key, identifiers.clone());
        Ok(identifiers)
    }
}

/// Group changed Helm files by their chart root. The root is the parent of
/// `Chart.yaml`/`values.yaml`, or the grandparent of a `templates/` file.
pub fn identify_helm_charts(diffs: &[GitLabDiff]) -> BTreeMap<String, Vec<String>> {
    let mut charts: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for diff in diffs {
        if diff.deleted_file {
            continue;
        }
        let path = &diff.new_path;
        let is_chart_file = path.ends_with("Chart.yaml")
            || path.ends_with("values.yaml")
            || (path.contains("templates/") && path.ends_with(".yaml"));
        if !is_chart_file {
            continue;
        }

        let parent = parent_dir(path);
        let chart_root =
            if path.contains("templates/") { parent_dir(&parent) } else { parent };
        charts.entry(chart_root).or_default().push(path.clone());
    }
    charts
}

fn parent_dir(path: &str) -> String {
    Path::new(path).parent().map(|p| p.to_string_lossy().into_owned()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diff(path: &str) -> GitLabDiff {
        GitLabDiff { new_path: path.to_string(), old_path: path.to_string(), ..Default::default() }
    }

    #[test]
    fn groups_files_by_chart_root() {
        let diffs = vec![
            diff("charts/web/Chart.yaml"),
            diff("charts/web/values.yaml"),
            diff("charts/web/templates/deployment.yaml"),
            diff("charts/api/templates/service.yaml"),
            diff("docs/README.md"),
        ];
        let charts = identify_helm_charts(&diffs);
        assert_eq!(charts.len(), 2);
        assert_eq!(charts["charts/web"].len(), 3);
        assert_eq!(charts["charts/api"], vec!["charts/api/templates/service.yaml"]);
    }

    #[test]
    fn deleted_files_are_ignored() {
        let mut removed = diff("charts/web/values.yaml");
        removed.deleted_file = true;
        assert!(identify_helm_charts(&[removed]).is_empty());
    }

    #[test]
    fn non_yaml_template_files_are_ignored() {
        let diffs = vec![diff("charts/web/templates/NOTES.txt")];
        assert!(identify_helm_charts(&diffs).is_empty());
    }

    #[test]
    fn render_cache_evicts_oldest() {
        let mut cache = RenderCache::new(2);
        cache.put("a".into(), vec!["1".into()]);
        cache.put("b".into(), vec!["2".into()]);
        // Touch `a` so `b` becomes the eviction candidate.
        assert!(cache.get("a").is_some());
        cache.put("c".into(), vec!["3".into()]);
        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
    }
}
