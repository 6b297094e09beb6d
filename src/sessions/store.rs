//! Per-session conversation state machine.

use chrono::Utc;
use std::collections::HashMap;
use uuid::Uuid;

use super::title::derive_title;
use super::traits::{
    Conversation, ConversationState, ConversationSummary, Message, SessionError, SessionSnapshot,
    UNTITLED,
};
use crate::routing::PersonaSet;

/// All conversations for one user session plus the conversation being edited.
///
/// The current conversation is a working copy: [`append_message`] only touches
/// it, and [`save_conversation`] commits it under its id.
///
/// [`append_message`]: ChatSession::append_message
/// [`save_conversation`]: ChatSession::save_conversation
#[derive(Debug, Clone)]
pub struct ChatSession {
    session_id: String,
    current_id: String,
    current_title: String,
    messages: Vec<Message>,
    active_agent: Option<String>,
    used_agents: Vec<String>,
    conversations: HashMap<String, Conversation>,
    revision: u64,
    /// Set by a clear: the next save replaces the stored entry outright.
    cleared: bool,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::with_session_id(Uuid::new_v4().to_string())
    }

    pub fn with_session_id(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            current_id: Uuid::new_v4().to_string(),
            current_title: String::new(),
            messages: Vec::new(),
            active_agent: None,
            used_agents: Vec::new(),
            conversations: HashMap::new(),
            revision: 0,
            cleared: false,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn current_conversation_id(&self) -> &str {
        &self.current_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn active_agent(&self) -> Option<&str> {
        self.active_agent.as_deref()
    }

    pub fn used_agents(&self) -> &[String] {
        &self.used_agents
    }

    pub fn conversation(&self, id: &str) -> Option<&Conversation> {
        self.conversations.get(id)
    }

    pub fn conversation_count(&self) -> usize {
        self.conversations.len()
    }

    /// Title of the current conversation: explicit, then stored, then derived.
    pub fn current_title(&self) -> String {
        if !self.current_title.is_empty() {
            return self.current_title.clone();
        }
        match self.conversations.get(&self.current_id) {
            Some(stored) if !self.cleared && !stored.title.is_empty() => stored.title.clone(),
            _ => derive_title(&self.messages),
        }
    }

    /// Append to the current conversation. Does not persist.
    pub fn append_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Upsert a conversation entry.
    ///
    /// An empty `title` keeps an existing real title, otherwise one is
    /// derived from the first user message.
    pub fn save_conversation(
        &mut self,
        id: &str,
        title: &str,
        messages: &[Message],
    ) -> &Conversation {
        let title = if title.is_empty() {
            match self.conversations.get(id) {
                Some(existing) if !existing.title.is_empty() && existing.title != UNTITLED => {
                    existing.title.clone()
                }
                _ => derive_title(messages),
            }
        } else {
            title.to_string()
        };

        self.revision += 1;
        let conversation = Conversation {
            id: id.to_string(),
            title,
            messages: messages.to_vec(),
            last_updated: Utc::now(),
            revision: self.revision,
        };

        tracing::debug!(
            session = %self.session_id,
            conversation = %id,
            messages = messages.len(),
            "Conversation saved"
        );

        self.conversations.insert(id.to_string(), conversation);
        &self.conversations[id]
    }

    /// Commit the current conversation if it has any messages.
    ///
    /// Returns whether anything was written.
    pub fn save_current(&mut self) -> bool {
        if self.messages.is_empty() {
            return false;
        }
        let id = self.current_id.clone();
        let messages = std::mem::take(&mut self.messages);
        let title = if self.cleared && self.current_title.is_empty() {
            derive_title(&messages)
        } else {
            self.current_title.clone()
        };
        self.save_conversation(&id, &title, &messages);
        self.messages = messages;
        self.cleared = false;
        true
    }

    /// Flush the current conversation, then switch to a fresh empty one.
    pub fn start_new_conversation(&mut self) -> &str {
        self.save_current();
        self.current_id = Uuid::new_v4().to_string();
        self.current_title.clear();
        self.messages.clear();
        self.cleared = false;
        tracing::info!(
            session = %self.session_id,
            conversation = %self.current_id,
            "Started new conversation"
        );
        &self.current_id
    }

    /// Flush the current conversation, then make a stored one current.
    ///
    /// An unknown id leaves the session untouched.
    pub fn load_conversation(&mut self, id: &str) -> Result<(), SessionError> {
        if !self.conversations.contains_key(id) {
            return Err(SessionError::NotFound { id: id.to_string() });
        }

        self.save_current();

        let stored = &self.conversations[id];
        self.current_id = stored.id.clone();
        self.current_title = stored.title.clone();
        self.messages = stored.messages.clone();
        self.cleared = false;

        tracing::info!(
            session = %self.session_id,
            conversation = %id,
            messages = self.messages.len(),
            "Loaded conversation"
        );
        Ok(())
    }

    /// Stored conversations, most recently updated first.
    pub fn list_recent(&self, n: usize) -> Vec<&Conversation> {
        let mut conversations: Vec<&Conversation> = self.conversations.values().collect();
        conversations.sort_by(|a, b| {
            b.last_updated
                .cmp(&a.last_updated)
                .then(b.revision.cmp(&a.revision))
        });
        conversations.truncate(n);
        conversations
    }

    /// Summaries of [`list_recent`](Self::list_recent) for display.
    pub fn recent_summaries(&self, n: usize) -> Vec<ConversationSummary> {
        self.list_recent(n)
            .into_iter()
            .map(|c| ConversationSummary {
                id: c.id.clone(),
                title: if c.title.is_empty() {
                    UNTITLED.to_string()
                } else {
                    c.title.clone()
                },
                message_count: c.messages.len(),
                last_updated: c.last_updated,
                is_current: c.id == self.current_id,
            })
            .collect()
    }

    /// Pin a persona for subsequent turns.
    pub fn pin_agent(&mut self, name: &str, personas: &PersonaSet) -> Result<(), SessionError> {
        if !personas.contains(name) {
            return Err(SessionError::UnknownPersona {
                name: name.to_string(),
            });
        }
        self.active_agent = Some(name.to_string());
        self.record_used_agent(name);
        Ok(())
    }

    pub fn unpin_agent(&mut self) {
        self.active_agent = None;
    }

    /// Move `name` to the front of the used-persona list.
    pub fn record_used_agent(&mut self, name: &str) {
        self.used_agents.retain(|used| used != name);
        self.used_agents.insert(0, name.to_string());
    }

    pub fn recent_agents(&self, n: usize) -> &[String] {
        &self.used_agents[..n.min(self.used_agents.len())]
    }

    /// Drop the current conversation's messages and the pin, keeping the id.
    ///
    /// The stored copy stays loadable until the next save, which replaces it
    /// and derives a fresh title from the new messages.
    pub fn clear_conversation(&mut self) {
        self.messages.clear();
        self.current_title.clear();
        self.active_agent = None;
        self.cleared = true;
    }

    pub fn lifecycle(&self) -> ConversationState {
        if self.messages.is_empty() {
            return ConversationState::Empty;
        }
        match self.conversations.get(&self.current_id) {
            Some(stored) if stored.messages == self.messages => ConversationState::Persisted,
            _ => ConversationState::TitledPending,
        }
    }

    /// The last `window` messages before the most recent one.
    ///
    /// Used after the current query has been appended, so the query itself is
    /// excluded.
    pub fn prior_turns(&self, window: usize) -> &[Message] {
        let prior = &self.messages[..self.messages.len().saturating_sub(1)];
        &prior[prior.len().saturating_sub(window)..]
    }

    pub fn snapshot(&self, recent_limit: usize) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            current_conversation_id: self.current_id.clone(),
            title: self.current_title(),
            state: self.lifecycle(),
            messages: self.messages.clone(),
            active_agent: self.active_agent.clone(),
            used_agents: self.used_agents.clone(),
            recent_conversations: self.recent_summaries(recent_limit),
        }
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::personas::builtin_persona_set;

    fn session_with(messages: &[Message]) -> ChatSession {
        let mut session = ChatSession::with_session_id("test-session");
        for message in messages {
            session.append_message(message.clone());
        }
        session
    }

    #[test]
    fn new_session_starts_empty() {
        let session = ChatSession::new();
        assert!(session.messages().is_empty());
        assert_eq!(session.conversation_count(), 0);
        assert_eq!(session.lifecycle(), ConversationState::Empty);
        assert!(session.active_agent().is_none());
    }

    #[test]
    fn save_then_load_restores_messages() {
        let messages = vec![
            Message::user("plan a trip to Lisbon"),
            Message::assistant("Sure, here is a plan", "Travel Agent"),
            Message::user("and a hotel?"),
        ];
        let mut session = ChatSession::new();
        session.save_conversation("conv-1", "", &messages);

        session.start_new_conversation();
        session.load_conversation("conv-1").unwrap();

        assert_eq!(session.current_conversation_id(), "conv-1");
        assert_eq!(session.messages(), messages.as_slice());
        assert_eq!(session.current_title(), "plan a trip to Lisbon");
    }

    #[test]
    fn save_is_idempotent() {
        let messages = vec![Message::user("hello world")];
        let mut session = ChatSession::new();
        let first = session.save_conversation("c", "", &messages).clone();
        let second = session.save_conversation("c", "", &messages).clone();

        assert_eq!(session.conversation_count(), 1);
        assert_eq!(first.title, second.title);
        assert_eq!(first.messages, second.messages);
    }

    #[test]
    fn save_derives_untitled_without_user_message() {
        let mut session = ChatSession::new();
        let saved = session.save_conversation("c", "", &[Message::assistant("hi", "System")]);
        assert_eq!(saved.title, UNTITLED);
    }

    #[test]
    fn explicit_title_overrides_and_empty_title_keeps_it() {
        let mut session = ChatSession::new();
        let messages = vec![Message::user("first question here")];
        session.save_conversation("c", "My Title", &messages);
        assert_eq!(session.conversation("c").unwrap().title, "My Title");

        let mut more = messages.clone();
        more.push(Message::user("another"));
        session.save_conversation("c", "", &more);
        assert_eq!(session.conversation("c").unwrap().title, "My Title");
        assert_eq!(session.conversation("c").unwrap().messages.len(), 2);
    }

    #[test]
    fn new_conversation_on_empty_does_not_persist() {
        let mut session = ChatSession::new();
        let before = session.current_conversation_id().to_string();
        session.start_new_conversation();
        assert_eq!(session.conversation_count(), 0);
        assert_ne!(session.current_conversation_id(), before);
    }

    #[test]
    fn new_conversation_flushes_current() {
        let mut session = session_with(&[Message::user("one two three four five six seven")]);
        let old_id = session.current_conversation_id().to_string();

        session.start_new_conversation();

        let stored = session.conversation(&old_id).unwrap();
        assert_eq!(stored.title, "one two three four five");
        assert_eq!(stored.messages.len(), 1);
        assert!(session.messages().is_empty());
        assert_eq!(session.lifecycle(), ConversationState::Empty);
    }

    #[test]
    fn load_unknown_id_is_not_found_and_keeps_state() {
        let mut session = session_with(&[Message::user("unsaved draft")]);
        let current = session.current_conversation_id().to_string();

        let err = session.load_conversation("missing").unwrap_err();
        assert_eq!(
            err,
            SessionError::NotFound {
                id: "missing".to_string()
            }
        );
        assert_eq!(session.current_conversation_id(), current);
        assert_eq!(session.messages().len(), 1);
        assert_eq!(session.conversation_count(), 0);
    }

    #[test]
    fn load_saves_current_first() {
        let mut session = ChatSession::new();
        session.save_conversation("stored", "", &[Message::user("stored chat")]);

        session.append_message(Message::user("work in progress"));
        let draft_id = session.current_conversation_id().to_string();
        session.load_conversation("stored").unwrap();

        let draft = session.conversation(&draft_id).unwrap();
        assert_eq!(draft.messages[0].content, "work in progress");
        assert_eq!(session.messages()[0].content, "stored chat");
    }

    #[test]
    fn lifecycle_follows_append_and_save() {
        let mut session = ChatSession::new();
        assert_eq!(session.lifecycle(), ConversationState::Empty);

        session.append_message(Message::user("hi"));
        assert_eq!(session.lifecycle(), ConversationState::TitledPending);

        session.save_current();
        assert_eq!(session.lifecycle(), ConversationState::Persisted);

        session.append_message(Message::assistant("hello", "General Assistant"));
        assert_eq!(session.lifecycle(), ConversationState::TitledPending);
        session.save_current();
        assert_eq!(session.lifecycle(), ConversationState::Persisted);
    }

    #[test]
    fn list_recent_orders_newest_first_and_limits() {
        let mut session = ChatSession::new();
        for i in 0..4 {
            session.save_conversation(&format!("c{i}"), "", &[Message::user(format!("chat {i}"))]);
        }
        // touching c1 makes it the most recent
        session.save_conversation("c1", "", &[Message::user("chat 1")]);

        let recent: Vec<&str> = session
            .list_recent(3)
            .into_iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(recent, vec!["c1", "c3", "c2"]);
    }

    #[test]
    fn recent_summaries_mark_current() {
        let mut session = session_with(&[Message::user("current chat")]);
        session.save_current();
        session.save_conversation("other", "", &[Message::user("other chat")]);

        let summaries = session.recent_summaries(5);
        assert_eq!(summaries.len(), 2);
        let current = summaries.iter().find(|s| s.is_current).unwrap();
        assert_eq!(current.id, session.current_conversation_id());
        assert_eq!(current.title, "current chat");
    }

    #[test]
    fn repeated_pins_do_not_duplicate_used_agents() {
        let personas = builtin_persona_set();
        let mut session = ChatSession::new();
        session.pin_agent("Travel Agent", &personas).unwrap();
        session.pin_agent("Tech Expert", &personas).unwrap();
        session.pin_agent("Travel Agent", &personas).unwrap();
        session.pin_agent("Travel Agent", &personas).unwrap();

        assert_eq!(session.used_agents(), ["Travel Agent", "Tech Expert"]);
        assert_eq!(session.active_agent(), Some("Travel Agent"));
    }

    #[test]
    fn pin_unknown_persona_fails() {
        let personas = builtin_persona_set();
        let mut session = ChatSession::new();
        let err = session.pin_agent("Pirate", &personas).unwrap_err();
        assert!(matches!(err, SessionError::UnknownPersona { .. }));
        assert!(session.active_agent().is_none());
        assert!(session.used_agents().is_empty());
    }

    #[test]
    fn recent_agents_caps_at_limit() {
        let mut session = ChatSession::new();
        for name in ["a", "b", "c", "d"] {
            session.record_used_agent(name);
        }
        assert_eq!(session.recent_agents(3), ["d", "c", "b"]);
        assert_eq!(session.recent_agents(10).len(), 4);
    }

    #[test]
    fn clear_keeps_id_and_drops_pin() {
        let personas = builtin_persona_set();
        let mut session = session_with(&[Message::user("hello")]);
        session.pin_agent("Tech Expert", &personas).unwrap();
        let id = session.current_conversation_id().to_string();

        session.clear_conversation();

        assert_eq!(session.current_conversation_id(), id);
        assert!(session.messages().is_empty());
        assert!(session.active_agent().is_none());
        assert_eq!(session.used_agents(), ["Tech Expert"]);
    }

    #[test]
    fn prior_turns_excludes_latest_and_caps_window() {
        let mut session = ChatSession::new();
        for i in 0..15 {
            session.append_message(Message::user(format!("m{i}")));
        }
        let prior = session.prior_turns(10);
        assert_eq!(prior.len(), 10);
        assert_eq!(prior[0].content, "m4");
        assert_eq!(prior[9].content, "m13");

        let single = session_with(&[Message::user("only")]);
        assert!(single.prior_turns(10).is_empty());
        assert!(ChatSession::new().prior_turns(10).is_empty());
    }

    #[test]
    fn snapshot_reflects_state() {
        let mut session = session_with(&[Message::user("snapshot me please")]);
        session.save_current();
        let snapshot = session.snapshot(5);
        assert_eq!(snapshot.session_id, "test-session");
        assert_eq!(snapshot.title, "snapshot me please");
        assert_eq!(snapshot.state, ConversationState::Persisted);
        assert_eq!(snapshot.recent_conversations.len(), 1);
    }

    #[test]
    fn save_after_clear_derives_a_fresh_title() {
        let mut session = session_with(&[
            Message::user("what should I eat tonight"),
            Message::assistant("Try a salad", "Health Advisor"),
        ]);
        session.save_current();
        let id = session.current_conversation_id().to_string();

        session.clear_conversation();
        assert_eq!(session.current_title(), UNTITLED);
        assert_eq!(session.conversation(&id).unwrap().messages.len(), 2);

        session.append_message(Message::user("plan a trip to Rome"));
        session.save_current();

        let stored = session.conversation(&id).unwrap();
        assert_eq!(stored.title, "plan a trip to Rome");
        assert_eq!(stored.messages.len(), 1);
        assert_eq!(session.current_title(), "plan a trip to Rome");

        // Later saves go back to keeping the stored title.
        session.append_message(Message::user("with a day in Florence"));
        session.save_current();
        assert_eq!(
            session.conversation(&id).unwrap().title,
            "plan a trip to Rome"
        );
    }
}
