//! Language-model backend contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sessions::Message;

/// A single `(role, content)` pair on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role.as_str().to_string(),
            content: message.content.clone(),
        }
    }
}

/// Everything the backend needs for one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    /// Most recent prior turns, oldest first.
    pub prior_turns: Vec<ChatMessage>,
    pub query: String,
    /// Optional trailing system instruction appended after the query.
    pub closing_instruction: Option<String>,
}

impl CompletionRequest {
    /// Flatten into the ordered message list sent to chat-completion APIs.
    pub fn to_messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.prior_turns.len() + 3);
        messages.push(ChatMessage::system(self.system_prompt.clone()));
        messages.extend(self.prior_turns.iter().cloned());
        messages.push(ChatMessage::user(self.query.clone()));
        if let Some(ref instruction) = self.closing_instruction {
            messages.push(ChatMessage::system(instruction.clone()));
        }
        messages
    }
}

/// Sampling parameters for a completion.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOptions {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: Option<u32>,
    pub presence_penalty: Option<f64>,
    pub frequency_penalty: Option<f64>,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            model: "gpt-4".into(),
            temperature: 0.7,
            max_tokens: None,
            presence_penalty: None,
            frequency_penalty: None,
        }
    }
}

/// Failures talking to the model backend. Never fatal to a session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("{provider} API key not set. Set PERSONACHAT_API_KEY or add api_key to config.toml")]
    MissingApiKey { provider: String },

    #[error("could not reach model backend: {0}")]
    Unreachable(String),

    #[error("authentication failed ({status}): {message}")]
    Auth { status: u16, message: String },

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("model backend timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("model backend returned an empty response")]
    EmptyResponse,

    #[error("invalid response from model backend: {0}")]
    InvalidResponse(String),
}

/// A language-model backend.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Complete one turn, returning the raw model text.
    async fn complete(
        &self,
        request: &CompletionRequest,
        options: &ModelOptions,
    ) -> Result<String, ServiceError>;

    /// The name of this provider implementation.
    fn name(&self) -> &str;
}
