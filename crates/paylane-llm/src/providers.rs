//! LLM Provider implementations

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::types::*;

/// Trait for LLM providers
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &'static str;

    /// Get the provider kind
    fn kind(&self) -> ProviderKind;

    /// Complete a conversation
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;
}

/// Hermes endpoint when configured, deterministic fallback otherwise
pub fn provider_from_env() -> Arc<dyn LLMProvider> {
    match HermesProvider::from_env() {
        Some(provider) => {
            debug!(model = %provider.config.model, "using Hermes provider");
            Arc::new(provider)
        }
        None => {
            debug!("HERMES_BASE_URL not set, using deterministic provider");
            Arc::new(DeterministicProvider::new())
        }
    }
}

// ============================================================================
// Hermes Provider (OpenAI-compatible)
// ============================================================================

/// Configuration for the Hermes provider
#[derive(Debug, Clone)]
pub struct HermesConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
}

impl HermesConfig {
    /// Read configuration from `HERMES_BASE_URL`, `HERMES_API_KEY`, and
    /// `HERMES_MODEL`. Returns `None` when no base URL is configured.
    pub fn from_env() -> Option<Self> {
        Some(Self {
            base_url: std::env::var("HERMES_BASE_URL").ok()?,
            api_key: std::env::var("HERMES_API_KEY").ok(),
            model: std::env::var("HERMES_MODEL").unwrap_or_else(|_| "Hermes-4-405B".to_string()),
        })
    }
}

/// Hermes chat completion provider (any OpenAI-compatible endpoint works)
pub struct HermesProvider {
    config: HermesConfig,
    client: reqwest::Client,
}

impl HermesProvider {
    pub fn new(config: HermesConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env() -> Option<Self> {
        Some(Self::new(HermesConfig::from_env()?))
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize, Default)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[async_trait]
impl LLMProvider for HermesProvider {
    fn name(&self) -> &'static str {
        "Hermes"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Hermes
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let mut messages: Vec<ChatMessage> = vec![];

        if let Some(ref system) = request.system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }

        for msg in &request.messages {
            messages.push(ChatMessage {
                role: msg.role.as_str().to_string(),
                content: msg.content.clone(),
            });
        }

        let chat_request = ChatRequest {
            model: request.model.unwrap_or_else(|| self.config.model.clone()),
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: false,
        };

        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let mut req = self.client.post(&url).json(&chat_request);
        if let Some(ref key) = self.config.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| LLMError::NetworkError {
            message: e.to_string(),
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LLMError::RequestFailed {
                message: format!("HTTP {}: {}", status, body),
            });
        }

        let chat_response: ChatResponse =
            response.json().await.map_err(|e| LLMError::InvalidResponse {
                message: e.to_string(),
            })?;

        let content = chat_response
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .unwrap_or_default();

        let usage = chat_response.usage.unwrap_or_default();

        Ok(CompletionResponse {
            content,
            usage: TokenUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            },
            model: Some(self.config.model.clone()),
        })
    }
}

// ============================================================================
// Deterministic Provider (Fallback)
// ============================================================================

/// Deterministic fallback when no LLM endpoint is configured.
///
/// Echoes the request back in a fixed shape so pipelines stay runnable
/// offline; same request, same output.
pub struct DeterministicProvider;

impl DeterministicProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DeterministicProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LLMProvider for DeterministicProvider {
    fn name(&self) -> &'static str {
        "Deterministic"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Deterministic
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let role = request.system.as_deref().unwrap_or("assistant");
        let input = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.as_str())
            .unwrap_or("");

        let mut excerpt: String = input.chars().take(200).collect();
        if input.chars().count() > 200 {
            excerpt.push_str("...");
        }

        let content = format!(
            "[{}] Deterministic completion.\n\nInput:\n{}",
            role.lines().next().unwrap_or(role),
            excerpt
        );

        Ok(CompletionResponse {
            content,
            usage: TokenUsage::default(),
            model: Some("deterministic".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deterministic_is_repeatable() {
        let provider = DeterministicProvider::new();
        let request = CompletionRequest::new(vec![Message::user("summarize the findings")])
            .with_system("You are a research agent.");

        let a = provider.complete(request.clone()).await.unwrap();
        let b = provider.complete(request).await.unwrap();
        assert_eq!(a.content, b.content);
        assert!(a.content.contains("summarize the findings"));
    }

    #[tokio::test]
    async fn test_deterministic_truncates_long_input() {
        let provider = DeterministicProvider::new();
        let long = "x".repeat(500);
        let request = CompletionRequest::new(vec![Message::user(long)]);

        let response = provider.complete(request).await.unwrap();
        assert!(response.content.contains("..."));
    }

    #[test]
    fn test_hermes_config_absent_without_env() {
        // HERMES_BASE_URL is not set in the test environment
        if std::env::var("HERMES_BASE_URL").is_err() {
            assert!(HermesConfig::from_env().is_none());
        }
    }
}
