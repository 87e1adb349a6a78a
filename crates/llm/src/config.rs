use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use crew_common::{CrewError, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::anthropic::AnthropicClient;
use crate::client::{LlmClient, LlmRequest, LlmResponse};
use crate::openai::OpenAiClient;
use crate::retry::{RetryConfig, RetryingClient};

/// Model settings for one agent role (coordinator or specialist).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// `openai`, `openai_compatible` or `anthropic`
    pub provider: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Environment variable holding the key, overriding the provider default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_timeout_ms() -> u64 {
    120_000
}

fn default_max_concurrent() -> usize {
    4
}

impl LlmConfig {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            api_key: None,
            api_key_env: None,
            api_url: None,
            temperature: None,
            max_tokens: None,
            timeout_ms: default_timeout_ms(),
            max_concurrent_requests: default_max_concurrent(),
            retry: RetryConfig::default(),
        }
    }

    /// Resolve the API key.
    ///
    /// Priority:
    /// 1. Explicit `api_key`
    /// 2. The variable named by `api_key_env`
    /// 3. The provider default: `OPENAI_API_KEY` or `ANTHROPIC_API_KEY`
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.is_empty()) {
            return Some(key.clone());
        }

        let env_var = match (&self.api_key_env, self.provider.as_str()) {
            (Some(var), _) => var.as_str(),
            (None, "openai") => "OPENAI_API_KEY",
            (None, "anthropic") => "ANTHROPIC_API_KEY",
            _ => return None,
        };

        std::env::var(env_var).ok().filter(|k| !k.is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

pub struct SemaphoredClient {
    inner: Arc<dyn LlmClient>,
    semaphore: Arc<tokio::sync::Semaphore>,
}

impl SemaphoredClient {
    pub fn new(inner: Arc<dyn LlmClient>, max_concurrent: usize) -> Self {
        Self {
            inner,
            semaphore: Arc::new(tokio::sync::Semaphore::new(max_concurrent.max(1))),
        }
    }
}

#[async_trait]
impl LlmClient for SemaphoredClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| CrewError::Provider(format!("Semaphore acquire failed: {e}")))?;
        self.inner.complete(request).await
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

/// Build the provider client wrapped in transport retry and a concurrency
/// limit.
pub fn build_llm_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    let api_key = config.resolve_api_key();
    let base_client: Box<dyn LlmClient> = match config.provider.as_str() {
        "openai" => {
            let api_key = api_key.ok_or_else(|| {
                CrewError::Config("OpenAI requires an API key (set OPENAI_API_KEY)".to_string())
            })?;
            Box::new(OpenAiClient::new(
                config.api_url.clone(),
                config.model.clone(),
                Some(api_key),
                config.timeout(),
            )?)
        }
        "openai_compatible" => {
            let api_url = config.api_url.clone().ok_or_else(|| {
                CrewError::Config("openai_compatible provider requires api_url".to_string())
            })?;
            Box::new(OpenAiClient::new(
                Some(api_url),
                config.model.clone(),
                api_key,
                config.timeout(),
            )?)
        }
        "anthropic" => {
            let api_key = api_key.ok_or_else(|| {
                CrewError::Config(
                    "Anthropic requires an API key (set ANTHROPIC_API_KEY)".to_string(),
                )
            })?;
            Box::new(AnthropicClient::new(
                config.api_url.clone(),
                config.model.clone(),
                api_key,
                config.timeout(),
            )?)
        }
        other => {
            return Err(CrewError::Config(format!("Unknown LLM provider: {other}")));
        }
    };

    info!(
        provider = %config.provider,
        model = %config.model,
        max_concurrent = config.max_concurrent_requests,
        "Built LLM client"
    );

    let retrying: Box<dyn LlmClient> =
        Box::new(RetryingClient::new(base_client, config.retry.clone()));

    let semaphored = SemaphoredClient::new(Arc::from(retrying), config.max_concurrent_requests);

    Ok(Arc::new(semaphored))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOML_CONFIG: &str = r#"
provider = "openai_compatible"
model = "llama3.1:70b"
api_url = "http://localhost:11434"
temperature = 0.2
max_tokens = 8192
max_concurrent_requests = 6

[retry]
max_retries = 5
initial_backoff_ms = 1000
"#;

    #[test]
    fn deserialize_config_from_toml() {
        let config: LlmConfig = toml::from_str(TOML_CONFIG).unwrap();
        assert_eq!(config.provider, "openai_compatible");
        assert_eq!(config.model, "llama3.1:70b");
        assert_eq!(config.api_url.as_deref(), Some("http://localhost:11434"));
        assert_eq!(config.temperature, Some(0.2));
        assert_eq!(config.max_tokens, Some(8192));
        assert_eq!(config.max_concurrent_requests, 6);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.initial_backoff_ms, 1000);
        assert_eq!(config.retry.max_backoff_ms, 30_000);
    }

    #[test]
    fn deserialize_config_defaults() {
        let config: LlmConfig = toml::from_str(
            r#"
provider = "anthropic"
model = "claude-sonnet-4-20250514"
"#,
        )
        .unwrap();
        assert_eq!(config.max_concurrent_requests, 4);
        assert_eq!(config.timeout_ms, 120_000);
        assert_eq!(config.retry.max_retries, 3);
        assert!(config.temperature.is_none());
    }

    #[test]
    fn explicit_key_wins_over_environment() {
        let mut config = LlmConfig::new("openai", "gpt-4o");
        config.api_key = Some("sk-inline".into());
        config.api_key_env = Some("CREW_TEST_KEY_THAT_IS_NEVER_SET".into());
        assert_eq!(config.resolve_api_key().as_deref(), Some("sk-inline"));
    }

    #[test]
    fn missing_custom_env_var_resolves_to_none() {
        let mut config = LlmConfig::new("openai_compatible", "local");
        config.api_key_env = Some("CREW_TEST_KEY_THAT_IS_NEVER_SET".into());
        assert!(config.resolve_api_key().is_none());
    }

    #[test]
    fn build_openai_compatible_client_without_key() {
        let mut config = LlmConfig::new("openai_compatible", "llama3");
        config.api_url = Some("http://localhost:11434".into());
        let client = build_llm_client(&config).unwrap();
        assert_eq!(client.model_name(), "llama3");
    }

    #[test]
    fn build_openai_compatible_without_url_fails() {
        let config = LlmConfig::new("openai_compatible", "llama3");
        assert!(build_llm_client(&config).is_err());
    }

    #[test]
    fn build_anthropic_client() {
        let mut config = LlmConfig::new("anthropic", "claude-sonnet-4-20250514");
        config.api_key = Some("sk-ant-test".into());
        let client = build_llm_client(&config).unwrap();
        assert_eq!(client.model_name(), "claude-sonnet-4-20250514");
    }

    #[test]
    fn build_unknown_provider_fails() {
        let mut config = LlmConfig::new("gemini", "gemini-pro");
        config.api_key = Some("key".into());
        let err = build_llm_client(&config).err().unwrap();
        assert!(err.to_string().contains("gemini"));
    }

    #[tokio::test]
    async fn semaphored_client_limits_concurrency() {
        use std::sync::atomic::{AtomicU32, Ordering};

        struct CountingClient {
            concurrent: Arc<AtomicU32>,
            max_seen: Arc<AtomicU32>,
        }

        #[async_trait]
        impl LlmClient for CountingClient {
            async fn complete(&self, _request: LlmRequest) -> Result<LlmResponse> {
                let current = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_seen.fetch_max(current, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                self.concurrent.fetch_sub(1, Ordering::SeqCst);
                Ok(LlmResponse {
                    content: "ok".to_string(),
                    model: "test".to_string(),
                    usage: None,
                    finish_reason: None,
                })
            }
            fn model_name(&self) -> &str {
                "test"
            }
        }

        let max_seen = Arc::new(AtomicU32::new(0));
        let inner = Arc::new(CountingClient {
            concurrent: Arc::new(AtomicU32::new(0)),
            max_seen: max_seen.clone(),
        });
        let semaphored = Arc::new(SemaphoredClient::new(inner, 2));

        let mut handles = vec![];
        for _ in 0..6 {
            let client = semaphored.clone();
            handles.push(tokio::spawn(async move {
                client.complete(LlmRequest::default()).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert!(max_seen.load(Ordering::SeqCst) <= 2);
        assert!(max_seen.load(Ordering::SeqCst) >= 1);
    }
}
