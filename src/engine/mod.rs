//! The engine façade: request dispatch over resolution, correlation,
//! classification, and assembly.

pub mod context;
pub mod namespace;
pub mod prompt;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::argocd::GitOpsClient;
use crate::claude::{CompletionProtocol, CompletionProvider};
use crate::correlator::{ChangeRef, GitOpsCorrelator, Troubleshooter};
use crate::correlator::troubleshoot::event_issues;
use crate::error::{Error, Result};
use crate::gitlab::SourceHostClient;
use crate::kube::{ClusterClient, TopologyMapper};
use crate::models::{Issue, NamespaceAnalysis, ResourceContext, TroubleshootReport};

pub use context::ContextAssembler;
pub use prompt::PromptGenerator;

/// A request to the engine. The action tag selects the analysis flow.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum EngineRequest {
    #[serde(rename_all = "camelCase")]
    AnalyzeResource {
        kind: String,
        name: String,
        #[serde(default)]
        namespace: String,
        #[serde(default)]
        query: String,
    },
    #[serde(rename_all = "camelCase")]
    AnalyzeNamespace { namespace: String },
    #[serde(rename_all = "camelCase")]
    AnalyzeChange {
        project_id: String,
        #[serde(default)]
        commit_sha: Option<String>,
        #[serde(default)]
        merge_request_iid: Option<u64>,
        #[serde(default)]
        query: String,
    },
    #[serde(rename_all = "camelCase")]
    TroubleshootResource {
        kind: String,
        name: String,
        #[serde(default)]
        namespace: String,
        #[serde(default)]
        query: Option<String>,
    },
}

impl EngineRequest {
    pub fn action(&self) -> &'static str {
        match self {
            EngineRequest::AnalyzeResource { .. } => "analyzeResource",
            EngineRequest::AnalyzeNamespace { .. } => "analyzeNamespace",
            EngineRequest::AnalyzeChange { .. } => "analyzeChange",
            EngineRequest::TroubleshootResource { .. } => "troubleshootResource",
        }
    }
}

/// Engine output. `context` carries the exact text the completion provider
/// was shown; `errors` inside it record partial upstream failures.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<Issue>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recommendations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace_analysis: Option<NamespaceAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
}

impl EngineResponse {
    /// Wire form of a failed request.
    pub fn failure(err: &Error) -> Self {
        Self {
            success: false,
            message: format!("Request failed ({})", err.wire_code()),
            error_details: Some(err.to_string()),
            ..Default::default()
        }
    }
}

/// Orchestrates the analysis components over the upstream capabilities.
pub struct Engine {
    cluster: Arc<dyn ClusterClient>,
    correlator: GitOpsCorrelator,
    troubleshooter: Troubleshooter,
    topology: TopologyMapper,
    assembler: ContextAssembler,
    prompts: PromptGenerator,
    completion: CompletionProtocol,
}

impl Engine {
    pub fn new(
        cluster: Arc<dyn ClusterClient>,
        gitops: Arc<dyn GitOpsClient>,
        source: Arc<dyn SourceHostClient>,
        provider: Arc<dyn CompletionProvider>,
        max_context_size: usize,
    ) -> Self {
        Self {
            correlator: GitOpsCorrelator::new(cluster.clone(), gitops, source),
            troubleshooter: Troubleshooter::new(cluster.clone()),
            topology: TopologyMapper::new(cluster.clone()),
            assembler: ContextAssembler::new(max_context_size),
            prompts: PromptGenerator::default(),
            completion: CompletionProtocol::new(provider),
            cluster,
        }
    }

    /// Dispatch one request.
    pub async fn handle(&self, request: EngineRequest) -> Result<EngineResponse> {
        info!(action = request.action(), "processing engine request");
        match request {
            EngineRequest::AnalyzeResource { kind, name, namespace, query } => {
                self.analyze_resource(&kind, &name, &namespace, &query).await
            }
            EngineRequest::AnalyzeNamespace { namespace } => self.analyze_namespace(&namespace).await,
            EngineRequest::AnalyzeChange { project_id, commit_sha, merge_request_iid, query } => {
                let change = change_ref(commit_sha, merge_request_iid)?;
                self.analyze_change(&project_id, &change, &query).await
            }
            EngineRequest::TroubleshootResource { kind, name, namespace, query } => {
                self.troubleshoot(&kind, &name, &namespace, query.as_deref()).await
            }
        }
    }

    /// Trace a resource, classify it, format the context, and ask the
    /// model for an analysis.
    async fn analyze_resource(
        &self,
        kind: &str,
        name: &str,
        namespace: &str,
        query: &str,
    ) -> Result<EngineResponse> {
        if kind.is_empty() || name.is_empty() {
            return Err(Error::InvalidInput("kind and name are required".into()));
        }

        let mut rc = self.correlator.trace_resource(kind, namespace, name).await;
        let raw = self.cluster.get(kind, namespace, name).await.ok();
        let (issues, _) = self.troubleshooter.classify(&rc, raw.as_ref()).await;
        rc.issues = issues;

        let formatted = self.assembler.format(&rc);
        let user_prompt = self.prompts.user_prompt(&formatted, query);
        let analysis =
            self.completion.get_completion(self.prompts.system_prompt(), &user_prompt).await?;

        Ok(EngineResponse {
            success: true,
            message: format!("Analyzed {kind}/{name}"),
            analysis: Some(analysis),
            context: Some(formatted),
            issues: rc.issues,
            ..Default::default()
        })
    }

    /// Map the namespace, classify its warning events, and ask the model
    /// for a namespace-wide assessment.
    async fn analyze_namespace(&self, namespace: &str) -> Result<EngineResponse> {
        if namespace.is_empty() {
            return Err(Error::InvalidInput("namespace is required".into()));
        }

        let topology = self.topology.namespace_topology(namespace).await?;
        let events = match self.cluster.events(namespace, "", "").await {
            Ok(events) => events,
            Err(err) => {
                tracing::warn!(namespace = %namespace, error = %err, "failed to get namespace events");
                Vec::new()
            }
        };

        let mut analysis = namespace::analysis_from_topology(&topology);
        analysis.issues = event_issues(&events);

        let rc = namespace::namespace_resource_context(&topology, events.clone());
        let assembled = self.assembler.format(&rc);
        let user_prompt = namespace::namespace_prompt(&assembled, &topology, &events);

        let text =
            self.completion.get_completion(self.prompts.system_prompt(), &user_prompt).await?;
        analysis.recommendations = namespace::extract_recommendations(&text);
        analysis.analysis = text.clone();

        Ok(EngineResponse {
            success: true,
            message: format!("Analyzed namespace {namespace}"),
            analysis: Some(text),
            context: Some(user_prompt),
            issues: analysis.issues.clone(),
            recommendations: analysis.recommendations.clone(),
            namespace_analysis: Some(analysis),
            ..Default::default()
        })
    }

    /// Find the resources affected by a change, trace and classify each,
    /// and analyse the combined context.
    async fn analyze_change(
        &self,
        project: &str,
        change: &ChangeRef,
        query: &str,
    ) -> Result<EngineResponse> {
        if project.is_empty() {
            return Err(Error::InvalidInput("projectId is required".into()));
        }

        let mut contexts = self.correlator.change_impact(project, change).await?;
        for rc in &mut contexts {
            let (issues, _) = self.troubleshooter.classify(rc, None).await;
            rc.issues = issues;
        }

        let combined = self.assembler.combine(&contexts);
        let user_prompt = self.prompts.user_prompt(&combined, query);
        let analysis =
            self.completion.get_completion(self.prompts.system_prompt(), &user_prompt).await?;

        Ok(EngineResponse {
            success: true,
            message: format!(
                "Analyzed {} affected resource(s) for {}",
                contexts.len(),
                change.related_resource_entry()
            ),
            analysis: Some(analysis),
            context: Some(combined),
            ..Default::default()
        })
    }

    /// Full troubleshooting pass. The model is consulted only when the
    /// caller supplied a query.
    async fn troubleshoot(
        &self,
        kind: &str,
        name: &str,
        namespace: &str,
        query: Option<&str>,
    ) -> Result<EngineResponse> {
        if kind.is_empty() || name.is_empty() {
            return Err(Error::InvalidInput("kind and name are required".into()));
        }

        let report = self.troubleshoot_report(kind, name, namespace).await;
        let formatted = self.assembler.format(&report.resource_context);

        let mut analysis = None;
        let mut context = formatted;
        if let Some(query) = query.filter(|q| !q.trim().is_empty()) {
            let user_prompt =
                self.prompts.troubleshoot_prompt(kind, name, namespace, &report, query);
            analysis = Some(
                self.completion.get_completion(self.prompts.system_prompt(), &user_prompt).await?,
            );
            context = user_prompt;
        }

        Ok(EngineResponse {
            success: true,
            message: format!(
                "Troubleshot {kind}/{name}: {} issue(s) found",
                report.issues.len()
            ),
            analysis,
            context: Some(context),
            issues: report.issues,
            recommendations: report.recommendations,
            ..Default::default()
        })
    }

    /// Trace + classify without involving the completion provider.
    pub async fn troubleshoot_report(
        &self,
        kind: &str,
        name: &str,
        namespace: &str,
    ) -> TroubleshootReport {
        let mut rc = self.correlator.trace_resource(kind, namespace, name).await;
        let raw = self.cluster.get(kind, namespace, name).await.ok();
        let (issues, recommendations) = self.troubleshooter.classify(&rc, raw.as_ref()).await;
        rc.issues = issues.clone();
        TroubleshootReport { resource_context: rc, issues, recommendations }
    }

    /// Trace one resource; exposed for callers that want the raw join
    /// record rather than an analysis.
    pub async fn trace(&self, kind: &str, name: &str, namespace: &str) -> ResourceContext {
        self.correlator.trace_resource(kind, namespace, name).await
    }
}

fn change_ref(commit_sha: Option<String>, merge_request_iid: Option<u64>) -> Result<ChangeRef> {
    match (commit_sha, merge_request_iid) {
        (Some(sha), None) if !sha.is_empty() => Ok(ChangeRef::Commit(sha)),
        (None, Some(iid)) => Ok(ChangeRef::MergeRequest(iid)),
        (None, None) => {
            Err(Error::InvalidInput("either commitSha or mergeRequestIid is required".into()))
        }
        _ => Err(Error::InvalidInput("commitSha and mergeRequestIid are mutually exclusive".into())),
    }
}
