//! Per-role model handles.

use std::sync::Arc;

use crew_common::{Result, TranscriptEntry};
use crew_llm::{LlmClient, LlmConfig, LlmRequest, build_llm_client};
use tracing::debug;

/// A chat model bound to one agent role with that role's sampling settings.
#[derive(Clone)]
pub struct RoleModel {
    client: Arc<dyn LlmClient>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl RoleModel {
    pub fn new(client: Arc<dyn LlmClient>, temperature: Option<f32>, max_tokens: Option<u32>) -> Self {
        Self {
            client,
            temperature,
            max_tokens,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        Ok(Self::new(
            build_llm_client(config)?,
            config.temperature,
            config.max_tokens,
        ))
    }

    pub fn model_name(&self) -> &str {
        self.client.model_name()
    }

    pub async fn complete(&self, system_prompt: &str, transcript: &[TranscriptEntry]) -> Result<String> {
        self.complete_at(system_prompt, transcript, self.temperature).await
    }

    /// Same as [`RoleModel::complete`] with a step-specific temperature.
    pub async fn complete_with_temperature(
        &self,
        system_prompt: &str,
        transcript: &[TranscriptEntry],
        temperature: f32,
    ) -> Result<String> {
        self.complete_at(system_prompt, transcript, Some(temperature)).await
    }

    async fn complete_at(
        &self,
        system_prompt: &str,
        transcript: &[TranscriptEntry],
        temperature: Option<f32>,
    ) -> Result<String> {
        let request = LlmRequest::new(system_prompt)
            .with_transcript(transcript)
            .with_temperature(temperature)
            .with_max_tokens(self.max_tokens);
        let response = self.client.complete(request).await?;
        debug!(
            model = %response.model,
            chars = response.content.len(),
            "Model reply received"
        );
        Ok(response.content)
    }
}
