use std::time::Duration;

use async_trait::async_trait;
use crew_common::{CrewError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::{LlmClient, LlmRequest, LlmResponse, Role, TokenUsage};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    max_tokens: u32,
}

#[derive(Serialize, Debug, Clone)]
struct AnthropicMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize, Debug, Clone)]
struct AnthropicContent {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    model: String,
    usage: Option<AnthropicUsage>,
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

pub struct AnthropicClient {
    base_url: String,
    model: String,
    api_key: String,
    http_client: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(
        base_url: Option<String>,
        model: String,
        api_key: String,
        timeout: Duration,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CrewError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url
                .unwrap_or_else(|| ANTHROPIC_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model,
            api_key,
            http_client,
        })
    }

    /// System turns inside the transcript are folded into the top-level
    /// `system` field; the Messages API only accepts user/assistant turns.
    fn build_body<'a>(&'a self, request: &LlmRequest) -> AnthropicRequest<'a> {
        let inline_system: Vec<&str> = request
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        let system = match (&request.system_prompt, inline_system.is_empty()) {
            (Some(s), true) => Some(s.clone()),
            (Some(s), false) => Some(format!("{s}\n\n{}", inline_system.join("\n\n"))),
            (None, false) => Some(inline_system.join("\n\n")),
            (None, true) => None,
        };

        let messages = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| AnthropicMessage {
                role: if m.role == Role::Assistant {
                    "assistant"
                } else {
                    "user"
                },
                content: m.content.clone(),
            })
            .collect();

        AnthropicRequest {
            model: &self.model,
            messages,
            system,
            temperature: request.temperature,
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        }
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let body = self.build_body(&request);
        debug!(model = %self.model, messages = body.messages.len(), "Sending messages request");

        let response = self
            .http_client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| CrewError::Provider(format!("Anthropic request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(CrewError::Provider(format!(
                "Anthropic API error {status}: {body_text}"
            )));
        }

        let anthropic_response: AnthropicResponse = response.json().await.map_err(|e| {
            CrewError::Provider(format!("Failed to parse Anthropic response: {e}"))
        })?;

        let content = anthropic_response
            .content
            .into_iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text)
            .collect::<String>();

        Ok(LlmResponse {
            content,
            model: anthropic_response.model,
            usage: anthropic_response.usage.map(|u| TokenUsage {
                prompt_tokens: u.input_tokens,
                completion_tokens: u.output_tokens,
            }),
            finish_reason: anthropic_response.stop_reason,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ChatMessage;

    fn client() -> AnthropicClient {
        AnthropicClient::new(
            None,
            "claude-sonnet-4-20250514".to_string(),
            "sk-ant-test".to_string(),
            Duration::from_secs(30),
        )
        .unwrap()
    }

    #[test]
    fn request_body_matches_messages_format() {
        let request = LlmRequest::new("Eres cardiólogo.")
            .with_message(ChatMessage::user("Paciente con FA"))
            .with_message(ChatMessage {
                role: Role::Assistant,
                content: "{\"tool_calls\": []}".to_string(),
            })
            .with_temperature(Some(0.3))
            .with_max_tokens(Some(1024));

        let client = client();
        let json = serde_json::to_value(client.build_body(&request)).unwrap();

        assert_eq!(json["model"], "claude-sonnet-4-20250514");
        assert_eq!(json["system"], "Eres cardiólogo.");
        assert_eq!(json["max_tokens"], 1024);
        let messages = json["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[1]["role"], "assistant");
    }

    #[test]
    fn inline_system_turns_fold_into_system_field() {
        let request = LlmRequest::new("Base").with_message(ChatMessage {
            role: Role::System,
            content: "Consultas pendientes: cardiology".to_string(),
        });
        let client = client();
        let json = serde_json::to_value(client.build_body(&request)).unwrap();

        assert_eq!(json["system"], "Base\n\nConsultas pendientes: cardiology");
        assert!(json["messages"].as_array().unwrap().is_empty());
    }

    #[test]
    fn default_max_tokens_when_none() {
        let request = LlmRequest::default().with_message(ChatMessage::user("Hola"));
        let client = client();
        let json = serde_json::to_value(client.build_body(&request)).unwrap();
        assert_eq!(json["max_tokens"], DEFAULT_MAX_TOKENS);
        assert!(json.get("system").is_none());
    }
}
