//! LLM access: the `CompletionProvider` capability, the Claude Messages API
//! client, and the prompt-budget protocol layer.

pub mod client;
pub mod protocol;

use async_trait::async_trait;

use crate::error::Result;

pub use client::ClaudeClient;
pub use protocol::CompletionProtocol;

/// Capability for obtaining a completion from a language model.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}
