//! Conversation types and errors shared by the session state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Title used when a conversation has no user message to derive one from.
pub const UNTITLED: &str = "Untitled";

/// Who produced a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A single chat message. Immutable once appended to a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            agent_name: None,
        }
    }

    pub fn assistant(content: impl Into<String>, agent_name: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            agent_name: Some(agent_name.into()),
        }
    }
}

/// A persisted conversation entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub messages: Vec<Message>,
    pub last_updated: DateTime<Utc>,
    /// Per-session save counter; orders entries saved within the same instant.
    #[serde(skip)]
    pub(crate) revision: u64,
}

/// Lightweight listing entry for sidebars and the HTTP API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub message_count: usize,
    pub last_updated: DateTime<Utc>,
    pub is_current: bool,
}

/// Lifecycle of the current conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    /// Fresh id, no messages.
    Empty,
    /// Has messages that differ from what is stored under its id.
    TitledPending,
    /// Stored entry matches the working copy.
    Persisted,
}

/// Serializable view of a session for renderers and API responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub current_conversation_id: String,
    pub title: String,
    pub state: ConversationState,
    pub messages: Vec<Message>,
    pub active_agent: Option<String>,
    pub used_agents: Vec<String>,
    pub recent_conversations: Vec<ConversationSummary>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("conversation not found: {id}")]
    NotFound { id: String },

    #[error("unknown persona: {name}")]
    UnknownPersona { name: String },

    #[error("too many open sessions (limit {max})")]
    RegistryFull { max: usize },
}
