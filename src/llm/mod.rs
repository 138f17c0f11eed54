pub mod extract;
pub mod prompts;
pub mod providers;

use crate::config::LlmConfig;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM connection error: {0}")]
    ConnectionError(String),
    #[error("LLM response error: {0}")]
    ResponseError(String),
    #[error("LLM configuration error: {0}")]
    ConfigError(String),
}

/// Sampling parameters passed with every completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationConfig {
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: Option<u32>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "gemini-pro".to_string(),
            temperature: 0.7,
            top_p: 0.85,
            max_tokens: None,
        }
    }
}

impl From<&LlmConfig> for GenerationConfig {
    fn from(config: &LlmConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            top_p: config.top_p,
            max_tokens: config.max_tokens,
        }
    }
}

/// A hosted text-completion model. Its output is untrusted text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, prompt: &str, config: &GenerationConfig) -> Result<String, LlmError>;
}

pub struct LlmManager {
    generator: Box<dyn TextGenerator + Send + Sync>,
    generation: GenerationConfig,
}

impl LlmManager {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let generator: Box<dyn TextGenerator + Send + Sync> = match config.backend.as_str() {
            "gemini" => Box::new(providers::gemini::GeminiProvider::new(config, timeout)?),
            "remote" => Box::new(providers::remote::RemoteLlmProvider::new(config, timeout)?),
            "ollama" => Box::new(providers::ollama::OllamaProvider::new(config, timeout)?),
            _ => {
                return Err(LlmError::ConfigError(format!(
                    "Unsupported LLM backend: {}",
                    config.backend
                )))
            }
        };

        Ok(Self {
            generator,
            generation: GenerationConfig::from(config),
        })
    }

    /// Wraps an existing generator, e.g. a scripted one in tests.
    pub fn with_generator(
        generator: Box<dyn TextGenerator + Send + Sync>,
        generation: GenerationConfig,
    ) -> Self {
        Self {
            generator,
            generation,
        }
    }

    pub async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.generator.complete(prompt, &self.generation).await
    }
}
