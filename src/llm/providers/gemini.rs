use crate::config::LlmConfig;
use crate::llm::{GenerationConfig, LlmError, TextGenerator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

const DEFAULT_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Google Generative Language API (`models/{model}:generateContent`).
pub struct GeminiProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: SamplingConfig,
}

#[derive(Serialize, Deserialize, Debug)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize, Debug)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SamplingConfig {
    temperature: f32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

impl GeminiProvider {
    pub fn new(config: &LlmConfig, timeout: Duration) -> Result<Self, LlmError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            LlmError::ConfigError(
                "API key is required for the gemini provider (set GOOGLE_API_KEY)".to_string(),
            )
        })?;

        let api_url = config
            .api_url
            .clone()
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            api_url,
            api_key,
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/{}:generateContent",
            self.api_url.trim_end_matches('/'),
            model
        )
    }
}

fn build_request(prompt: &str, config: &GenerationConfig) -> GenerateRequest {
    GenerateRequest {
        contents: vec![Content {
            parts: vec![Part {
                text: prompt.to_string(),
            }],
        }],
        generation_config: SamplingConfig {
            temperature: config.temperature,
            top_p: config.top_p,
            max_output_tokens: config.max_tokens,
        },
    }
}

fn parse_response(body: &str) -> Result<String, LlmError> {
    let response: GenerateResponse = serde_json::from_str(body).map_err(|e| {
        LlmError::ResponseError(format!("Failed to parse Gemini response: {}", e))
    })?;

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::ResponseError("No candidates in response".to_string()))?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(LlmError::ResponseError(format!(
            "Empty candidate (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }

    Ok(text)
}

#[async_trait]
impl TextGenerator for GeminiProvider {
    async fn complete(&self, prompt: &str, config: &GenerationConfig) -> Result<String, LlmError> {
        info!("Sending request to Gemini with model: {}", config.model);

        let response = self
            .client
            .post(self.endpoint(&config.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&build_request(prompt, config))
            .send()
            .await
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::ResponseError(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            error!("Gemini API responded with status code: {} - {}", status, body);
            return Err(LlmError::ResponseError(format!(
                "Gemini API responded with status code: {}",
                status
            )));
        }

        debug!("Raw response from Gemini: {}", body);
        parse_response(&body)
    }
}
