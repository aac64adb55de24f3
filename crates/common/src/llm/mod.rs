//! Generation backend clients
//!
//! Chat-completions clients for OpenAI and Azure OpenAI deployments,
//! plus a canned generator for tests and offline runs.

use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One generation call
#[derive(Debug, Clone)]
pub struct GenerationRequest<'a> {
    pub query: &'a str,
    /// Context strings, joined by blank lines in the prompt
    pub context: &'a [String],
    pub system_prompt: Option<&'a str>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl<'a> GenerationRequest<'a> {
    pub fn new(query: &'a str, context: &'a [String]) -> Self {
        Self {
            query,
            context,
            system_prompt: None,
            temperature: 0.7,
            max_tokens: 800,
        }
    }

    pub fn with_system_prompt(mut self, prompt: Option<&'a str>) -> Self {
        self.system_prompt = prompt;
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    /// The user message sent to the model
    pub fn user_message(&self) -> String {
        format!(
            "Context:\n{}\n\nQuestion: {}",
            self.context.join("\n\n"),
            self.query
        )
    }
}

/// Trait for answer generation
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce answer text. Never returns an empty string.
    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String>;

    /// Whether the backend currently answers
    async fn health_check(&self) -> bool;

    fn model_name(&self) -> &str;
}

/// Wire flavor of a chat-completions endpoint
#[derive(Debug, Clone, PartialEq)]
pub enum ChatFlavor {
    /// `{base}/chat/completions` with bearer auth
    OpenAI { base_url: String },
    /// `{endpoint}/openai/deployments/{deployment}/chat/completions` with `api-key` header
    Azure { endpoint: String, api_version: String },
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

/// Client for OpenAI-style chat completions
pub struct ChatCompletionsGenerator {
    client: reqwest::Client,
    flavor: ChatFlavor,
    api_key: String,
    model: String,
    temperature: f32,
}

impl ChatCompletionsGenerator {
    pub fn new(flavor: ChatFlavor, config: &LlmConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
            message: format!("llm.api_key is required for the {} provider", config.provider),
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            flavor,
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    fn url(&self) -> String {
        match &self.flavor {
            ChatFlavor::OpenAI { base_url } => {
                format!("{}/chat/completions", base_url.trim_end_matches('/'))
            }
            ChatFlavor::Azure {
                endpoint,
                api_version,
            } => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                endpoint.trim_end_matches('/'),
                self.model,
                api_version
            ),
        }
    }

    async fn complete(
        &self,
        messages: Vec<ChatMessage<'_>>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String> {
        let request = ChatRequest {
            // Azure addresses the deployment in the URL
            model: match self.flavor {
                ChatFlavor::OpenAI { .. } => Some(self.model.as_str()),
                ChatFlavor::Azure { .. } => None,
            },
            messages,
            max_tokens,
            temperature,
        };

        let builder = self.client.post(self.url()).json(&request);
        let builder = match self.flavor {
            ChatFlavor::OpenAI { .. } => builder.bearer_auth(&self.api_key),
            ChatFlavor::Azure { .. } => builder.header("api-key", &self.api_key),
        };

        let response = builder.send().await.map_err(|e| AppError::GenerationError {
            message: format!("LLM API request failed: {}", e),
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::GenerationError {
                message: format!("LLM API error {}: {}", status, body),
            });
        }

        let chat_response: ChatResponse =
            response.json().await.map_err(|e| AppError::GenerationError {
                message: format!("Failed to parse LLM response: {}", e),
            })?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| AppError::GenerationError {
                message: "Empty response from LLM".to_string(),
            })
    }
}

#[async_trait]
impl Generator for ChatCompletionsGenerator {
    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String> {
        let start = Instant::now();
        let user_message = request.user_message();

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &user_message,
        });

        let result = self
            .complete(messages, request.temperature, request.max_tokens)
            .await;

        crate::metrics::record_generation(&self.model, result.is_ok(), start.elapsed());
        if let Err(e) = &result {
            tracing::error!(model = %self.model, error = %e, "Generation failed");
        }
        result
    }

    async fn health_check(&self) -> bool {
        let messages = vec![ChatMessage {
            role: "user",
            content: "ping",
        }];

        match self.complete(messages, self.temperature, 1).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Generation backend health check failed");
                false
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Canned generator for tests and offline runs
#[derive(Debug, Default)]
pub struct MockGenerator;

impl MockGenerator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String> {
        let network_context = request
            .context
            .iter()
            .any(|chunk| chunk.to_lowercase().contains("organization"));

        if network_context {
            return Ok(format!(
                "Based on the network configuration, here is what I found about \"{}\": {}",
                request.query,
                request.context.join(" ")
            ));
        }

        Ok(format!(
            "Answer to \"{}\" using {} context chunk(s). [Mock response - LLM not configured]",
            request.query,
            request.context.len()
        ))
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn model_name(&self) -> &str {
        "mock-llm"
    }
}

/// Create a generator based on configuration
pub fn create_generator(config: &LlmConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "openai" => {
            let base_url = config
                .endpoint
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
            Ok(Arc::new(ChatCompletionsGenerator::new(
                ChatFlavor::OpenAI { base_url },
                config,
            )?))
        }
        "azure" => {
            let endpoint = config.endpoint.clone().ok_or_else(|| AppError::Configuration {
                message: "llm.endpoint is required for the azure provider".to_string(),
            })?;
            Ok(Arc::new(ChatCompletionsGenerator::new(
                ChatFlavor::Azure {
                    endpoint,
                    api_version: config.api_version.clone(),
                },
                config,
            )?))
        }
        "mock" => Ok(Arc::new(MockGenerator::new())),
        other => Err(AppError::Configuration {
            message: format!("Unknown llm provider: {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: &str) -> LlmConfig {
        LlmConfig {
            provider: provider.to_string(),
            api_key: Some("test-key".to_string()),
            endpoint: Some("https://example.openai.azure.com/".to_string()),
            model: "gpt-4o".to_string(),
            ..LlmConfig::default()
        }
    }

    #[test]
    fn test_user_message_layout() {
        let context = vec!["VLAN 100 is Data".to_string(), "VLAN 200 is Voice".to_string()];
        let request = GenerationRequest::new("What VLANs exist?", &context);

        assert_eq!(
            request.user_message(),
            "Context:\nVLAN 100 is Data\n\nVLAN 200 is Voice\n\nQuestion: What VLANs exist?"
        );
    }

    #[test]
    fn test_azure_url() {
        let generator = ChatCompletionsGenerator::new(
            ChatFlavor::Azure {
                endpoint: "https://example.openai.azure.com/".to_string(),
                api_version: "2024-02-15-preview".to_string(),
            },
            &config("azure"),
        )
        .unwrap();

        assert_eq!(
            generator.url(),
            "https://example.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-02-15-preview"
        );
    }

    #[test]
    fn test_openai_url() {
        let generator = ChatCompletionsGenerator::new(
            ChatFlavor::OpenAI {
                base_url: "https://api.openai.com/v1/".to_string(),
            },
            &config("openai"),
        )
        .unwrap();

        assert_eq!(generator.url(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn test_create_generator() {
        assert_eq!(create_generator(&config("mock")).unwrap().model_name(), "mock-llm");
        assert!(create_generator(&config("azure")).is_ok());

        let mut missing_key = config("openai");
        missing_key.api_key = None;
        assert!(matches!(
            create_generator(&missing_key),
            Err(AppError::Configuration { .. })
        ));

        assert!(create_generator(&config("bard")).is_err());
    }

    #[tokio::test]
    async fn test_mock_generator_flavors() {
        let generator = MockGenerator::new();

        let network = vec!["Organization: Big Data Org".to_string()];
        let answer = generator
            .generate(&GenerationRequest::new("list devices", &network))
            .await
            .unwrap();
        assert!(answer.contains("network configuration"));

        let answer = generator
            .generate(&GenerationRequest::new("hello", &[]))
            .await
            .unwrap();
        assert!(answer.contains("0 context chunk"));
        assert!(generator.health_check().await);
    }
}
