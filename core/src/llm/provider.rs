//! The completion provider seam.

use super::client::LlmClient;
use super::prompts;
use crate::context::EnvironmentFacts;
use crate::error::Result;
use crate::protocol::{parse_envelope, parse_interpretation, Envelope, Interpretation, ResponseContext};
use async_trait::async_trait;

/// Context for a fresh goal.
#[derive(Debug, Clone, Default)]
pub struct GoalRequest {
    pub goal: String,
    pub recent_output: String,
    pub history: Vec<String>,
    pub environment: Option<EnvironmentFacts>,
}

/// Context for repairing a failed command.
#[derive(Debug, Clone, Default)]
pub struct FixRequest {
    pub goal: String,
    pub failed_output: String,
    /// Every command that already failed for this goal, oldest first.
    pub failed_commands: Vec<String>,
    pub history: Vec<String>,
    pub environment: Option<EnvironmentFacts>,
}

/// Context for judging a finished command.
#[derive(Debug, Clone, Default)]
pub struct InterpretRequest {
    pub goal: String,
    pub command: String,
    pub output: String,
    pub history: Vec<String>,
    pub environment: Option<EnvironmentFacts>,
}

/// External reasoning service proposing commands, fixes and interpretations.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn propose(&self, request: &GoalRequest) -> Result<Envelope>;

    async fn fix(&self, request: &FixRequest) -> Result<Envelope>;

    /// `Ok(None)` when no interpretation is available; the caller then
    /// relies on local classification.
    async fn interpret(&self, request: &InterpretRequest) -> Result<Option<Interpretation>>;
}

/// [`CompletionProvider`] backed by an OpenAI-compatible chat endpoint.
pub struct LlmCompletionProvider {
    client: LlmClient,
}

impl LlmCompletionProvider {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CompletionProvider for LlmCompletionProvider {
    async fn propose(&self, request: &GoalRequest) -> Result<Envelope> {
        crate::debug_log!("Requesting proposal from {} for goal: {}", self.client.model(), request.goal);
        let text = self.client.chat(&prompts::propose_messages(request)).await?;
        parse_envelope(&text, ResponseContext::Propose)
    }

    async fn fix(&self, request: &FixRequest) -> Result<Envelope> {
        crate::debug_log!(
            "Requesting fix after {} failed command(s)",
            request.failed_commands.len()
        );
        let text = self.client.chat(&prompts::fix_messages(request)).await?;
        parse_envelope(&text, ResponseContext::Fix)
    }

    async fn interpret(&self, request: &InterpretRequest) -> Result<Option<Interpretation>> {
        let text = self.client.chat(&prompts::interpret_messages(request)).await?;
        Ok(Some(parse_interpretation(&text)))
    }
}
