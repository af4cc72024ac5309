//! Reasoning contract client.
//!
//! Sends the page text and supplemental corpus to a reasoning service under
//! [`prompt::AGENT_CONTRACT`] and parses the structured reply.

pub mod gemini;
pub mod prompt;
pub mod reply;

use std::sync::Arc;

use async_trait::async_trait;

use crate::types::{truncate, AgentReply, ChainError, ChainResult, SupplementalCorpus};

pub use gemini::GeminiClient;

/// An external service that turns instructions plus a prompt into free text.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    async fn complete(&self, contract: &str, prompt: &str) -> anyhow::Result<String>;
}

/// Obtains an [`AgentReply`] for one challenge page.
#[derive(Clone)]
pub struct ContractClient {
    service: Arc<dyn ReasoningService>,
}

impl ContractClient {
    pub fn new(service: Arc<dyn ReasoningService>) -> Self {
        Self { service }
    }

    pub async fn request_reply(
        &self,
        page_text: &str,
        corpus: &SupplementalCorpus,
    ) -> ChainResult<AgentReply> {
        let prompt = prompt::build_prompt(page_text, corpus);

        let raw = self
            .service
            .complete(prompt::AGENT_CONTRACT, &prompt)
            .await
            .map_err(|e| ChainError::ReasoningService(format!("{e:#}")))?;

        tracing::debug!(reply = %truncate(&raw, 300), "Reasoning service replied");
        reply::parse_reply(&raw)
    }
}
