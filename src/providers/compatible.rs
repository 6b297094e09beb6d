//! Generic OpenAI-compatible provider.
//! Speaks the `/chat/completions` format shared by OpenAI and most hosted LLM APIs.

use crate::providers::traits::{
    ChatMessage, CompletionRequest, ModelOptions, Provider, ServiceError,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const CONNECT_TIMEOUT_SECS: u64 = 10;

/// A provider that speaks the OpenAI-compatible chat completions API.
pub struct OpenAiCompatibleProvider {
    pub(crate) name: String,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
    client: Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(name: &str, base_url: &str, api_key: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(ToString::to_string),
            // The overall deadline is enforced per turn; only bound the connect here.
            client: Client::builder()
                .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    /// Build the full URL for chat completions, detecting if base_url already includes the path.
    fn chat_completions_url(&self) -> String {
        let has_full_endpoint = reqwest::Url::parse(&self.base_url)
            .map(|url| {
                url.path()
                    .trim_end_matches('/')
                    .ends_with("/chat/completions")
            })
            .unwrap_or_else(|_| self.base_url.ends_with("/chat/completions"));

        if has_full_endpoint {
            self.base_url.clone()
        } else {
            format!("{}/chat/completions", self.base_url)
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ApiChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

fn map_transport_error(error: &reqwest::Error) -> ServiceError {
    if error.is_timeout() {
        ServiceError::Timeout {
            secs: CONNECT_TIMEOUT_SECS,
        }
    } else {
        ServiceError::Unreachable(super::sanitize_api_error(&error.to_string()))
    }
}

fn extract_content(response: ApiChatResponse) -> Result<String, ServiceError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or(ServiceError::EmptyResponse)
}

#[async_trait]
impl Provider for OpenAiCompatibleProvider {
    async fn complete(
        &self,
        request: &CompletionRequest,
        options: &ModelOptions,
    ) -> Result<String, ServiceError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| ServiceError::MissingApiKey {
                provider: self.name.clone(),
            })?;

        let messages = request.to_messages();
        let body = ChatRequest {
            model: &options.model,
            messages: &messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            presence_penalty: options.presence_penalty,
            frequency_penalty: options.frequency_penalty,
        };

        let url = self.chat_completions_url();
        tracing::debug!(
            provider = %self.name,
            model = %options.model,
            messages = messages.len(),
            "Sending chat completion request"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(&e))?;

        if !response.status().is_success() {
            return Err(super::api_error(response).await);
        }

        let chat_response: ApiChatResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))?;

        extract_content(chat_response)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};

    fn make_provider(url: &str, key: Option<&str>) -> OpenAiCompatibleProvider {
        OpenAiCompatibleProvider::new("test", url, key)
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            system_prompt: "You are a travel agent.".into(),
            prior_turns: vec![],
            query: "Where should I go?".into(),
            closing_instruction: None,
        }
    }

    async fn spawn_backend(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/v1")
    }

    #[test]
    fn creates_with_key() {
        let p = make_provider("https://api.openai.com/v1/", Some("sk-test"));
        assert_eq!(p.base_url, "https://api.openai.com/v1");
        assert_eq!(p.api_key.as_deref(), Some("sk-test"));
        assert_eq!(p.name(), "test");
    }

    #[tokio::test]
    async fn complete_fails_without_key() {
        let p = make_provider("https://api.openai.com/v1", None);
        let err = p
            .complete(&request(), &ModelOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::MissingApiKey { .. }));
        assert!(err.to_string().contains("API key not set"));
    }

    #[test]
    fn request_serializes_optional_fields() {
        let messages = vec![ChatMessage::user("hi")];
        let body = ChatRequest {
            model: "gpt-4",
            messages: &messages,
            temperature: 0.7,
            max_tokens: Some(3000),
            presence_penalty: None,
            frequency_penalty: Some(0.1),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "gpt-4");
        assert_eq!(json["max_tokens"], 3000);
        assert!(json.get("presence_penalty").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn response_deserializes() {
        let json = r#"{"choices":[{"message":{"content":"Hello!"}}]}"#;
        let resp: ApiChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(extract_content(resp).unwrap(), "Hello!");
    }

    #[test]
    fn response_empty_choices_is_empty_response() {
        let resp: ApiChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert_eq!(extract_content(resp), Err(ServiceError::EmptyResponse));
    }

    #[test]
    fn chat_completions_url_standard_openai() {
        let p = make_provider("https://api.openai.com/v1", None);
        assert_eq!(
            p.chat_completions_url(),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn chat_completions_url_custom_full_endpoint() {
        let p = make_provider("https://llm.example.com/api/v3/chat/completions", None);
        assert_eq!(
            p.chat_completions_url(),
            "https://llm.example.com/api/v3/chat/completions"
        );
    }

    #[tokio::test]
    async fn complete_returns_first_choice_content() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|Json(body): Json<serde_json::Value>| async move {
                let system = body["messages"][0]["content"].as_str().unwrap_or_default();
                Json(serde_json::json!({
                    "choices": [{"message": {"content": format!("echo: {system}")}}]
                }))
            }),
        );
        let url = spawn_backend(app).await;
        let p = make_provider(&url, Some("sk-test"));

        let text = p
            .complete(&request(), &ModelOptions::default())
            .await
            .unwrap();
        assert_eq!(text, "echo: You are a travel agent.");
    }

    #[tokio::test]
    async fn api_key_is_sent_as_bearer_token() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|headers: axum::http::HeaderMap| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                Json(serde_json::json!({
                    "choices": [{"message": {"content": auth}}]
                }))
            }),
        );
        let url = spawn_backend(app).await;
        let p = make_provider(&url, Some("sk-test"));

        let text = p
            .complete(&request(), &ModelOptions::default())
            .await
            .unwrap();
        assert_eq!(text, "Bearer sk-test");
    }

    #[tokio::test]
    async fn unauthorized_maps_to_auth_error() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async { (StatusCode::UNAUTHORIZED, "invalid key sk-abcdef123") }),
        );
        let url = spawn_backend(app).await;
        let p = make_provider(&url, Some("sk-test"));

        let err = p
            .complete(&request(), &ModelOptions::default())
            .await
            .unwrap_err();
        match err {
            ServiceError::Auth { status, message } => {
                assert_eq!(status, 401);
                assert!(!message.contains("sk-abcdef123"));
            }
            other => panic!("expected auth error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn server_error_maps_to_api_error() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded") }),
        );
        let url = spawn_backend(app).await;
        let p = make_provider(&url, Some("sk-test"));

        let err = p
            .complete(&request(), &ModelOptions::default())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ServiceError::Api {
                status: 500,
                message: "upstream exploded".into()
            }
        );
    }

    #[tokio::test]
    async fn unreachable_backend_maps_to_unreachable() {
        // Bind and drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let p = make_provider(&format!("http://{addr}/v1"), Some("sk-test"));
        let err = p
            .complete(&request(), &ModelOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unreachable(_)));
    }
}
