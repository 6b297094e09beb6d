//! One chat turn: route, call the backend, clean, record.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::cleanup::clean;
use super::personas::SYSTEM_AGENT;
use crate::config::Config;
use crate::providers::{ChatMessage, CompletionRequest, ModelOptions, Provider, ServiceError};
use crate::routing::{MatchedBy, PersonaSet, Router};
use crate::sessions::{ChatSession, Message};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TurnError {
    #[error("message is empty")]
    EmptyQuery,

    #[error("turn cancelled")]
    Cancelled,
}

/// Per-turn settings derived from config.
#[derive(Debug, Clone)]
pub struct TurnOptions {
    pub model: ModelOptions,
    /// Prior messages passed to the backend.
    pub history_window: usize,
    pub timeout: Duration,
    pub closing_instruction: Option<String>,
}

impl TurnOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: ModelOptions {
                model: config
                    .default_model
                    .clone()
                    .unwrap_or_else(|| ModelOptions::default().model),
                temperature: config.default_temperature,
                max_tokens: Some(config.chat.max_tokens),
                presence_penalty: Some(config.chat.presence_penalty),
                frequency_penalty: Some(config.chat.frequency_penalty),
            },
            history_window: config.chat.history_window,
            timeout: Duration::from_secs(config.chat.request_timeout_secs),
            closing_instruction: config
                .chat
                .closing_guidance
                .clone()
                .filter(|g| !g.trim().is_empty()),
        }
    }
}

impl Default for TurnOptions {
    fn default() -> Self {
        Self {
            model: ModelOptions::default(),
            history_window: 10,
            timeout: Duration::from_secs(120),
            closing_instruction: None,
        }
    }
}

/// What happened during a turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnReport {
    /// Persona the router picked.
    pub persona: String,
    pub matched_by: MatchedBy,
    /// The assistant message appended to the conversation.
    pub reply: Message,
    /// Set when the backend failed and `reply` carries the error text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TurnReport {
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Runs turns against shared, immutable routing and backend configuration.
///
/// One runner serves every session; session state is passed in per call.
pub struct TurnRunner {
    provider: Arc<dyn Provider>,
    router: Box<dyn Router>,
    personas: PersonaSet,
    options: TurnOptions,
}

impl TurnRunner {
    pub fn new(
        provider: Arc<dyn Provider>,
        router: Box<dyn Router>,
        personas: PersonaSet,
        options: TurnOptions,
    ) -> Self {
        Self {
            provider,
            router,
            personas,
            options,
        }
    }

    pub fn personas(&self) -> &PersonaSet {
        &self.personas
    }

    pub fn options(&self) -> &TurnOptions {
        &self.options
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Handle one user message to completion.
    ///
    /// Backend failures are recorded in the conversation as a `System`
    /// assistant message and reported, not returned as errors.
    pub async fn run(
        &self,
        session: &mut ChatSession,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnReport, TurnError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(TurnError::EmptyQuery);
        }
        if cancel.is_cancelled() {
            return Err(TurnError::Cancelled);
        }

        session.append_message(Message::user(query));
        session.save_current();

        let route = self
            .router
            .select(query, session.active_agent(), &self.personas);
        let persona = route.persona;
        session.record_used_agent(&persona.name);

        tracing::info!(
            session = %session.session_id(),
            conversation = %session.current_conversation_id(),
            persona = %persona.name,
            matched_by = ?route.matched_by,
            "Routing turn"
        );

        let request = CompletionRequest {
            system_prompt: persona.system_prompt.clone(),
            prior_turns: session
                .prior_turns(self.options.history_window)
                .iter()
                .map(ChatMessage::from)
                .collect(),
            query: query.to_string(),
            closing_instruction: self.options.closing_instruction.clone(),
        };

        let call = tokio::time::timeout(
            self.options.timeout,
            self.provider.complete(&request, &self.options.model),
        );
        let outcome = tokio::select! {
            () = cancel.cancelled() => {
                tracing::info!(session = %session.session_id(), "Turn cancelled");
                return Err(TurnError::Cancelled);
            }
            outcome = call => outcome.unwrap_or(Err(ServiceError::Timeout {
                secs: self.options.timeout.as_secs(),
            })),
        };

        let (reply, error) = match outcome {
            Ok(text) => (Message::assistant(clean(&text), persona.name.clone()), None),
            Err(e) => {
                tracing::warn!(
                    session = %session.session_id(),
                    provider = self.provider.name(),
                    error = %e,
                    "Model backend call failed"
                );
                (
                    Message::assistant(format!("Error: {e}"), SYSTEM_AGENT),
                    Some(e.to_string()),
                )
            }
        };

        session.append_message(reply.clone());
        session.save_current();

        Ok(TurnReport {
            persona: persona.name.clone(),
            matched_by: route.matched_by,
            reply,
            error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::personas::builtin_persona_set;
    use crate::providers::EchoProvider;
    use crate::routing::KeywordRouter;
    use crate::sessions::{ConversationState, Role};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct RecordingProvider {
        seen: Mutex<Vec<CompletionRequest>>,
        reply: String,
    }

    #[async_trait]
    impl Provider for RecordingProvider {
        async fn complete(
            &self,
            request: &CompletionRequest,
            _options: &ModelOptions,
        ) -> Result<String, ServiceError> {
            self.seen.lock().push(request.clone());
            Ok(self.reply.clone())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl Provider for FailingProvider {
        async fn complete(
            &self,
            _request: &CompletionRequest,
            _options: &ModelOptions,
        ) -> Result<String, ServiceError> {
            Err(ServiceError::Auth {
                status: 401,
                message: "bad key".into(),
            })
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    struct StalledProvider;

    #[async_trait]
    impl Provider for StalledProvider {
        async fn complete(
            &self,
            _request: &CompletionRequest,
            _options: &ModelOptions,
        ) -> Result<String, ServiceError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("too late".into())
        }

        fn name(&self) -> &str {
            "stalled"
        }
    }

    fn runner(provider: Arc<dyn Provider>, options: TurnOptions) -> TurnRunner {
        TurnRunner::new(
            provider,
            Box::new(KeywordRouter),
            builtin_persona_set(),
            options,
        )
    }

    #[tokio::test]
    async fn successful_turn_appends_and_persists() {
        let runner = runner(Arc::new(EchoProvider), TurnOptions::default());
        let mut session = ChatSession::new();

        let report = runner
            .run(&mut session, "Book me a flight and a hotel", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.persona, "Travel Agent");
        assert!(!report.failed());
        assert_eq!(session.messages().len(), 2);
        assert_eq!(session.messages()[1].agent_name.as_deref(), Some("Travel Agent"));
        assert_eq!(
            session.messages()[1].content,
            "This is a response to: Book me a flight and a hotel"
        );
        assert_eq!(session.lifecycle(), ConversationState::Persisted);
        assert_eq!(session.used_agents(), ["Travel Agent"]);
        assert_eq!(session.current_title(), "Book me a flight and");
    }

    #[tokio::test]
    async fn history_is_capped_and_excludes_query() {
        let provider = Arc::new(RecordingProvider {
            seen: Mutex::new(Vec::new()),
            reply: "ok".into(),
        });
        let runner = runner(provider.clone(), TurnOptions::default());
        let mut session = ChatSession::new();
        let cancel = CancellationToken::new();

        for i in 0..7 {
            runner
                .run(&mut session, &format!("question {i}"), &cancel)
                .await
                .unwrap();
        }

        let seen = provider.seen.lock();
        assert!(seen[0].prior_turns.is_empty());

        let last = seen.last().unwrap();
        assert_eq!(last.query, "question 6");
        assert_eq!(last.prior_turns.len(), 10);
        assert_eq!(last.prior_turns[0].content, "question 1");
        assert_eq!(last.prior_turns[9].role, "assistant");
        assert!(last.prior_turns.iter().all(|m| m.content != "question 6"));
    }

    #[tokio::test]
    async fn reply_is_cleaned() {
        let provider = Arc::new(RecordingProvider {
            seen: Mutex::new(Vec::new()),
            reply: "**Tip**: bestTime\r\n\r\n\r\n\r\nnow".into(),
        });
        let runner = runner(provider, TurnOptions::default());
        let mut session = ChatSession::new();

        let report = runner
            .run(&mut session, "anything", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.reply.content, "<strong>Tip</strong>: best Time\n\nnow");
    }

    #[tokio::test]
    async fn pinned_persona_is_used() {
        let runner = runner(Arc::new(EchoProvider), TurnOptions::default());
        let mut session = ChatSession::new();
        session
            .pin_agent("Health Advisor", runner.personas())
            .unwrap();

        let report = runner
            .run(&mut session, "debug my python code", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.persona, "Health Advisor");
        assert_eq!(report.matched_by, MatchedBy::Pinned);
    }

    #[tokio::test]
    async fn backend_failure_becomes_system_message() {
        let runner = runner(Arc::new(FailingProvider), TurnOptions::default());
        let mut session = ChatSession::new();

        let report = runner
            .run(&mut session, "hello", &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.failed());
        let reply = &session.messages()[1];
        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.agent_name.as_deref(), Some(SYSTEM_AGENT));
        assert!(reply.content.starts_with("Error: authentication failed"));
        assert_eq!(session.lifecycle(), ConversationState::Persisted);

        // The session keeps working after a failure.
        let again = runner
            .run(&mut session, "still there?", &CancellationToken::new())
            .await
            .unwrap();
        assert!(again.failed());
        assert_eq!(session.messages().len(), 4);
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let options = TurnOptions {
            timeout: Duration::from_secs(1),
            ..TurnOptions::default()
        };
        let runner = runner(Arc::new(StalledProvider), options);
        let mut session = ChatSession::new();

        let report = runner
            .run(&mut session, "hello", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            report.error.as_deref(),
            Some("model backend timed out after 1s")
        );
        assert_eq!(
            session.messages()[1].agent_name.as_deref(),
            Some(SYSTEM_AGENT)
        );
    }

    #[tokio::test]
    async fn cancellation_stops_in_flight_turn() {
        let runner = runner(Arc::new(StalledProvider), TurnOptions::default());
        let mut session = ChatSession::new();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = runner.run(&mut session, "hello", &cancel).await.unwrap_err();
        assert_eq!(err, TurnError::Cancelled);
        // Only the user message was recorded.
        assert_eq!(session.messages().len(), 1);
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let runner = runner(Arc::new(EchoProvider), TurnOptions::default());
        let mut session = ChatSession::new();
        let err = runner
            .run(&mut session, "   ", &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, TurnError::EmptyQuery);
        assert!(session.messages().is_empty());
    }

    #[test]
    fn options_from_default_config() {
        let options = TurnOptions::from_config(&Config::default());
        assert_eq!(options.history_window, 10);
        assert_eq!(options.model.model, "gpt-4");
        assert_eq!(options.model.max_tokens, Some(3000));
        assert_eq!(options.timeout, Duration::from_secs(120));
        assert_eq!(
            options.closing_instruction.as_deref(),
            Some(crate::config::schema::DEFAULT_CLOSING_GUIDANCE)
        );
    }

    #[test]
    fn blank_closing_guidance_sends_none() {
        let mut config = Config::default();
        config.chat.closing_guidance = Some("  ".into());
        assert!(TurnOptions::from_config(&config).closing_instruction.is_none());
    }
}
