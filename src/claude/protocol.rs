//! Prompt budget enforcement in front of the completion provider.

use std::sync::Arc;

use crate::error::Result;
use crate::util::truncate::{truncate_content, truncate_smart};

use super::CompletionProvider;

/// Default combined budget for system + user prompt, in characters.
pub const DEFAULT_MAX_PROMPT_SIZE: usize = 100_000;

/// Headroom left between the system prompt and the user-prompt budget.
const BUDGET_MARGIN: usize = 100;

/// Minimum useful user-prompt budget; below this the system prompt is
/// truncated first.
const MIN_USER_BUDGET: usize = 1000;

/// Wraps a [`CompletionProvider`] and keeps the combined prompt size within
/// budget before every call.
pub struct CompletionProtocol {
    provider: Arc<dyn CompletionProvider>,
    max_prompt_size: usize,
}

impl CompletionProtocol {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self { provider, max_prompt_size: DEFAULT_MAX_PROMPT_SIZE }
    }

    pub fn with_max_prompt_size(mut self, max_prompt_size: usize) -> Self {
        self.max_prompt_size = max_prompt_size;
        self
    }

    /// Fit the prompts to the budget. The user prompt is truncated first;
    /// only when the system prompt alone nearly fills the budget is it cut
    /// back to half, then the user prompt trimmed to the remainder.
    pub fn fit_prompts(&self, system_prompt: &str, user_prompt: &str) -> (String, String) {
        if system_prompt.len() + user_prompt.len() <= self.max_prompt_size {
            return (system_prompt.to_string(), user_prompt.to_string());
        }

        let mut system = system_prompt.to_string();
        let mut user_budget =
            self.max_prompt_size.saturating_sub(system.len()).saturating_sub(BUDGET_MARGIN);

        if user_budget < MIN_USER_BUDGET {
            system = truncate_content(&system, self.max_prompt_size / 2);
            user_budget = (self.max_prompt_size / 2).saturating_sub(BUDGET_MARGIN);
        }

        (system, truncate_smart(user_prompt, user_budget))
    }

    pub async fn get_completion(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let (system, user) = self.fit_prompts(system_prompt, user_prompt);
        self.provider.complete(&system, &user).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl CompletionProvider for Echo {
        async fn complete(&self, system: &str, user: &str) -> Result<String> {
            Ok(format!("{}|{}", system.len(), user.len()))
        }
    }

    fn protocol(max: usize) -> CompletionProtocol {
        CompletionProtocol::new(Arc::new(Echo)).with_max_prompt_size(max)
    }

    #[test]
    fn prompts_within_budget_pass_through() {
        let p = protocol(1000);
        let (system, user) = p.fit_prompts("sys", "user");
        assert_eq!(system, "sys");
        assert_eq!(user, "user");
    }

    #[test]
    fn user_prompt_is_truncated_first() {
        let p = protocol(10_000);
        let system = "s".repeat(2000);
        let user = format!("{}.", "u".repeat(20_000));
        let (fit_system, fit_user) = p.fit_prompts(&system, &user);
        assert_eq!(fit_system, system);
        assert!(fit_user.len() <= 10_000 - 2000 - 100);
        assert!(fit_user.contains("[...Content truncated...]"));
    }

    #[test]
    fn oversized_system_prompt_is_halved() {
        let p = protocol(10_000);
        let system = "s".repeat(9800);
        let user = "u".repeat(5000);
        let (fit_system, fit_user) = p.fit_prompts(&system, &user);
        assert!(fit_system.len() <= 5000);
        assert!(fit_user.len() <= 5000 - 100);
        assert!(fit_system.len() + fit_user.len() <= 10_000);
    }

    #[tokio::test]
    async fn completion_sees_fitted_prompts() {
        let p = protocol(5000);
        let out = p.get_completion(&"s".repeat(100), &"u".repeat(100)).await.unwrap();
        assert_eq!(out, "100|100");
    }
}
