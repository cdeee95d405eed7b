use crate::auth::TokenProvider;
use crate::error::{RelayError, Result};
use async_trait::async_trait;
use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One role-tagged turn of a chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Error body most OpenAI-compatible providers return on failure.
#[derive(Debug, Deserialize)]
struct UpstreamErrorBody {
    error: UpstreamErrorDetails,
}

#[derive(Debug, Deserialize)]
struct UpstreamErrorDetails {
    message: String,
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Send one chat completion round trip and return the first choice's
    /// message text.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Chat completion client for an OpenAI-compatible endpoint.
pub struct ChatClient {
    http_client: reqwest::Client,
    completions_url: String,
    deployment: String,
    token_provider: Arc<dyn TokenProvider>,
}

impl ChatClient {
    pub fn new(
        completions_url: String,
        deployment: String,
        token_provider: Arc<dyn TokenProvider>,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .build()
            .map_err(|e| RelayError::Upstream(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            completions_url,
            deployment,
            token_provider,
        })
    }
}

#[async_trait]
impl CompletionClient for ChatClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        debug!(
            "Requesting chat completion: model={} turns={}",
            self.deployment,
            messages.len()
        );

        let token = self.token_provider.bearer_token().await?;
        let payload = ChatCompletionRequest {
            model: &self.deployment,
            messages,
        };

        let response = self
            .http_client
            .post(&self.completions_url)
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!("Chat completion request failed: {}", e);
                RelayError::Upstream(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            // Prefer the provider's own message over the raw body
            let message = serde_json::from_str::<UpstreamErrorBody>(&text)
                .map(|b| b.error.message)
                .unwrap_or_else(|_| format!("Upstream returned status {}: {}", status, text));
            error!("Chat completion failed: {}", message);
            return Err(RelayError::Upstream(message));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| RelayError::Upstream(format!("Malformed completion response: {}", e)))?;

        let text = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                RelayError::Upstream("Completion response contained no choices".to_string())
            })?;

        debug!("Received completion of length {}", text.len());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let messages = vec![
            ChatMessage::system("You are a helpful assistant."),
            ChatMessage::user("What is 2+2?"),
        ];
        let payload = ChatCompletionRequest {
            model: "gpt-4",
            messages: &messages,
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["model"], "gpt-4");
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["role"], "user");
        assert_eq!(value["messages"][1]["content"], "What is 2+2?");
    }

    #[test]
    fn test_response_extracts_first_choice() {
        let body = r#"{
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "4"}, "finish_reason": "stop"},
                {"index": 1, "message": {"role": "assistant", "content": "four"}, "finish_reason": "stop"}
            ],
            "usage": {"prompt_tokens": 9, "completion_tokens": 1, "total_tokens": 10}
        }"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(body).unwrap();
        let first = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap();
        assert_eq!(first, "4");
    }

    #[test]
    fn test_upstream_error_body_parsing() {
        let body = r#"{"error": {"message": "Rate limit exceeded", "type": "rate_limit_error", "code": "429"}}"#;
        let parsed: UpstreamErrorBody = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.error.message, "Rate limit exceeded");
    }

    #[test]
    fn test_empty_choices_is_an_error_shape() {
        let parsed: ChatCompletionResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(parsed.choices.is_empty());
    }
}
