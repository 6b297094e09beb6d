use crate::routing::PersonaSet;
use crate::sessions::{Message, SessionSnapshot};

/// Presentation layer for a chat session.
///
/// Renderers are pure: they turn session state into display text and never
/// mutate the session.
pub trait ChatRenderer: Send + Sync {
    /// Recent conversations, recently used personas, and the pin.
    fn render_sidebar(&self, snapshot: &SessionSnapshot, personas: &PersonaSet) -> String;

    /// The messages of the current conversation.
    fn render_chat(&self, messages: &[Message], personas: &PersonaSet) -> String;

    /// The name of this renderer implementation.
    fn name(&self) -> &str;
}
