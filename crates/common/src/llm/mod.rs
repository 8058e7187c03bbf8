//! Text generation backends
//!
//! Provides:
//! - `TextGenerator`, the single-method capability the pipeline depends on
//! - An OpenAI-compatible chat completions client
//! - A disabled backend that always reports itself unavailable

use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Per-call generation parameters
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    /// Sampling temperature (0.0 - 1.0)
    pub temperature: f32,

    /// Maximum output tokens
    pub max_tokens: usize,

    /// System prompt override
    pub system_prompt: Option<String>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 800,
            system_prompt: None,
        }
    }
}

impl GenerationOptions {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            system_prompt: None,
        }
    }
}

/// Free-text generation capability
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate text for a prompt
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String>;

    /// Backend name for logs and metrics
    fn name(&self) -> &str;
}

/// OpenAI-compatible chat completions client
pub struct OpenAIGenerator {
    config: LlmConfig,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

impl OpenAIGenerator {
    /// Create a new chat completions client
    pub fn new(config: LlmConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
            message: "llm.api_key is required for the openai provider".to_string(),
        })?;

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { config, api_key, client })
    }
}

#[async_trait]
impl TextGenerator for OpenAIGenerator {
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: options.system_prompt.clone().unwrap_or_else(|| {
                        "You are a careful review analyst.".to_string()
                    }),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        };

        let response = self.client
            .post(&self.config.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::GenerationUnavailable {
                message: format!("LLM API request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::GenerationUnavailable {
                message: format!("LLM API error {}: {}", status, body),
            });
        }

        let chat_response: ChatResponse = response.json().await
            .map_err(|e| AppError::GenerationUnavailable {
                message: format!("Failed to parse LLM response: {}", e),
            })?;

        chat_response.choices.into_iter().next()
            .map(|c| c.message.content)
            .ok_or_else(|| AppError::GenerationUnavailable {
                message: "Empty response from LLM".to_string(),
            })
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}

/// Backend used when no provider is configured
pub struct DisabledGenerator;

#[async_trait]
impl TextGenerator for DisabledGenerator {
    async fn generate(&self, _prompt: &str, _options: &GenerationOptions) -> Result<String> {
        Err(AppError::GenerationUnavailable {
            message: "no text generation provider configured".to_string(),
        })
    }

    fn name(&self) -> &str {
        "disabled"
    }
}

/// Create a generator based on configuration
pub fn create_generator(config: &LlmConfig) -> Result<Arc<dyn TextGenerator>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config.clone())?)),
        "disabled" | "none" => Ok(Arc::new(DisabledGenerator)),
        other => {
            tracing::warn!(provider = other, "Unknown LLM provider, text generation disabled");
            Ok(Arc::new(DisabledGenerator))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_generator_is_unavailable() {
        let generator = DisabledGenerator;
        let err = generator
            .generate("prompt", &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::GenerationUnavailable { .. }));
    }

    #[test]
    fn test_openai_requires_key() {
        let config = LlmConfig {
            provider: "openai".to_string(),
            ..LlmConfig::default()
        };
        assert!(create_generator(&config).is_err());
    }

    #[test]
    fn test_options_from_config() {
        let config = LlmConfig { temperature: 0.5, max_tokens: 256, ..LlmConfig::default() };
        let options = GenerationOptions::from_config(&config);
        assert_eq!(options.max_tokens, 256);
        assert!((options.temperature - 0.5).abs() < f32::EPSILON);
    }
}
