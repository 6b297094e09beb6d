//! Conversation sessions and their per-key registry.

pub mod in_memory;
pub mod store;
pub mod title;
pub mod traits;

pub use in_memory::{SessionHandle, SessionRegistry, DEFAULT_MAX_SESSIONS, DEFAULT_SESSION_IDLE};
pub use store::ChatSession;
pub use title::derive_title;
pub use traits::{
    Conversation, ConversationState, ConversationSummary, Message, Role, SessionError,
    SessionSnapshot, UNTITLED,
};

use std::time::Duration;

use crate::config::GatewayConfig;

/// Create an empty registry sized by the gateway config.
pub fn create_session_registry(config: &GatewayConfig) -> SessionRegistry {
    SessionRegistry::with_limits(
        config.max_sessions,
        Duration::from_secs(config.session_idle_secs),
    )
}
