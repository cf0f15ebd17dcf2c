//! Prompt generation for the completion provider.

use std::fmt::Write as _;

use crate::models::{Issue, TroubleshootReport};

const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a Kubernetes GitOps assistant that helps users troubleshoot and understand their clusters.
You are given correlated context from the Kubernetes API, the GitOps controller, and the source-control host.
When answering:
1. Only reference resources and information that appear in the provided context.
2. If asked about something not present in the context, say that the information is unavailable.
3. Be precise about Kubernetes configuration and GitOps workflow details.
4. Look for causal connections across systems, such as a failed pipeline leading to a stale or broken deployment.
5. Suggest concrete fixes and the kubectl, argocd, or GitLab commands to apply them, correctly formatted.
6. Format YAML and JSON cleanly when quoting configuration.
7. If the context lists errors in data collection, state which inputs were unavailable and qualify your conclusions accordingly.";

/// Builds the system and user prompts sent to the completion provider.
pub struct PromptGenerator {
    base_prompt: String,
}

impl Default for PromptGenerator {
    fn default() -> Self {
        Self { base_prompt: DEFAULT_SYSTEM_PROMPT.to_string() }
    }
}

impl PromptGenerator {
    pub fn with_base_prompt(mut self, template: impl Into<String>) -> Self {
        self.base_prompt = template.into();
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.base_prompt
    }

    /// Wrap a formatted context document and the user's query.
    pub fn user_prompt(&self, context: &str, query: &str) -> String {
        let query = query.trim();
        let mut prompt = String::with_capacity(context.len() + query.len() + 160);
        prompt.push_str("Here is the GitOps context for the Kubernetes resources you requested:\n\n");
        prompt.push_str(context);
        prompt.push_str(
            "\n\nBased on this context, please answer the following question or perform the requested analysis:\n\n",
        );
        prompt.push_str(query);
        prompt
    }

    /// Prompt for a troubleshooting session: detected issues and baseline
    /// recommendations, plus the user's question.
    pub fn troubleshoot_prompt(
        &self,
        kind: &str,
        name: &str,
        namespace: &str,
        report: &TroubleshootReport,
        query: &str,
    ) -> String {
        let mut prompt = format!(
            "I'm troubleshooting a Kubernetes {kind} named '{name}' in namespace '{namespace}'.\n\n"
        );

        prompt.push_str("The following issues were detected:\n");
        for (index, issue) in report.issues.iter().enumerate() {
            let _ = writeln!(prompt, "{}. {}", index + 1, format_issue(issue));
        }

        prompt.push_str("\nGeneral recommendations:\n");
        for (index, recommendation) in report.recommendations.iter().enumerate() {
            let _ = writeln!(prompt, "{}. {}", index + 1, recommendation);
        }

        prompt.push_str(
            "\nBased on these detected issues, please provide specific kubectl commands that I can use to troubleshoot and fix the problems. ",
        );
        prompt.push_str(query.trim());
        prompt
    }
}

fn format_issue(issue: &Issue) -> String {
    format!("{} ({}): {}", issue.title, issue.severity, issue.description)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IssueCategory, IssueSeverity, IssueSource, ResourceContext};

    #[test]
    fn user_prompt_embeds_context_and_query() {
        let prompt = PromptGenerator::default().user_prompt("CONTEXT", "  why is it failing?  ");
        assert!(prompt.contains("CONTEXT"));
        assert!(prompt.ends_with("why is it failing?"));
    }

    #[test]
    fn troubleshoot_prompt_numbers_issues() {
        let report = TroubleshootReport {
            resource_context: ResourceContext::new("Pod", "web-1", "default"),
            issues: vec![Issue {
                title: "Pod Failed".into(),
                category: IssueCategory::PodNotRunning,
                severity: IssueSeverity::Error,
                source: IssueSource::Kubernetes,
                description: "Pod is in Failed state".into(),
            }],
            recommendations: vec!["Check pod logs for errors.".into()],
        };
        let prompt = PromptGenerator::default().troubleshoot_prompt(
            "pod",
            "web-1",
            "default",
            &report,
            "fix it",
        );
        assert!(prompt.contains("1. Pod Failed (Error): Pod is in Failed state"));
        assert!(prompt.contains("1. Check pod logs for errors."));
        assert!(prompt.ends_with("fix it"));
    }

    #[test]
    fn custom_base_prompt_replaces_default() {
        let generator = PromptGenerator::default().with_base_prompt("terse mode");
        assert_eq!(generator.system_prompt(), "terse mode");
    }
}
