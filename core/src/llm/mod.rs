//! Completion provider plumbing
//!
//! An OpenAI-compatible chat client, the prompts sent to it, and the
//! `CompletionProvider` seam the orchestrator talks to.

pub mod client;
pub mod prompts;
pub mod provider;

use serde::{Deserialize, Serialize};

pub use client::LlmClient;
pub use provider::{CompletionProvider, FixRequest, GoalRequest, InterpretRequest, LlmCompletionProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}
