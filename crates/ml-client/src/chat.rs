//! Chat-completions client for OpenAI-compatible endpoints (Groq by default).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::http::{build_client, check_status, map_transport_error, normalize_base_url};
use crate::{BackendError, LanguageModel};

const SERVICE: &str = "language-model backend";

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";

/// Generation parameters sent with every request
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.0,
            max_tokens: 1024,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for `POST {base_url}/chat/completions`
#[derive(Clone)]
pub struct ChatCompletionsClient {
    client: Client,
    endpoint: String,
    api_key: String,
    settings: ChatSettings,
}

impl ChatCompletionsClient {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        settings: ChatSettings,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(BackendError::InvalidRequest("API key is empty".into()));
        }
        let base = normalize_base_url(base_url)?;
        Ok(Self {
            client: build_client(timeout)?,
            endpoint: format!("{base}/chat/completions"),
            api_key,
            settings,
        })
    }
}

#[async_trait]
impl LanguageModel for ChatCompletionsClient {
    fn model_name(&self) -> &str {
        &self.settings.model
    }

    #[instrument(skip(self, prompt), fields(model = %self.settings.model, prompt_chars = prompt.len()))]
    async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        let body = ChatRequest {
            model: &self.settings.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(SERVICE, e))?;
        let response = check_status(SERVICE, response).await?;
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| BackendError::MalformedResponse(e.to_string()))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| BackendError::MalformedResponse("response has no choices".into()))?;

        debug!("Generated {} characters", text.len());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ChatCompletionsClient {
        ChatCompletionsClient::new(
            &server.uri(),
            "gsk_test",
            ChatSettings::default(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_generate_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer gsk_test"))
            .and(body_partial_json(serde_json::json!({
                "model": DEFAULT_MODEL,
                "messages": [{"role": "user", "content": "recommend something"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "1. Clannad"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = client(&server).generate("recommend something").await.unwrap();
        assert_eq!(text, "1. Clannad");
    }

    #[tokio::test]
    async fn test_generate_without_choices_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
            .mount(&server)
            .await;

        let err = client(&server).generate("q").await.unwrap_err();
        assert!(matches!(err, BackendError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_generate_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let err = client(&server).generate("q").await.unwrap_err();
        assert_eq!(err, BackendError::RateLimited { retry_after_secs: Some(7) });
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_generate_unauthorized_is_not_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&server)
            .await;

        let err = client(&server).generate("q").await.unwrap_err();
        assert!(matches!(err, BackendError::Status { status: 401, .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_empty_api_key_rejected() {
        let result = ChatCompletionsClient::new(
            DEFAULT_BASE_URL,
            "  ",
            ChatSettings::default(),
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(BackendError::InvalidRequest(_))));
    }
}
