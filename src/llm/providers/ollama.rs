use crate::config::LlmConfig;
use crate::llm::{GenerationConfig, LlmError, TextGenerator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

pub struct OllamaProvider {
    client: reqwest::Client,
    api_url: String,
}

#[derive(Serialize, Debug)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize, Debug)]
struct OllamaOptions {
    temperature: f32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Deserialize, Debug)]
struct OllamaResponse {
    response: String,
    #[serde(default)]
    done: Option<bool>,
}

impl OllamaProvider {
    pub fn new(config: &LlmConfig, timeout: Duration) -> Result<Self, LlmError> {
        let api_url = config
            .api_url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434/api/generate".to_string());

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        Ok(Self { client, api_url })
    }
}

fn build_request(prompt: &str, config: &GenerationConfig) -> OllamaRequest {
    OllamaRequest {
        model: config.model.clone(),
        prompt: prompt.to_string(),
        stream: false,
        options: OllamaOptions {
            temperature: config.temperature,
            top_p: config.top_p,
            num_predict: config.max_tokens,
        },
    }
}

#[async_trait]
impl TextGenerator for OllamaProvider {
    async fn complete(&self, prompt: &str, config: &GenerationConfig) -> Result<String, LlmError> {
        info!("Sending request to Ollama with model: {}", config.model);
        debug!("API URL: {}", self.api_url);

        let response = self
            .client
            .post(&self.api_url)
            .json(&build_request(prompt, config))
            .send()
            .await
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = match response.text().await {
                Ok(body) => format!(" - Response body: {}", body),
                Err(_) => String::new(),
            };

            error!("Ollama API responded with status code: {}{}", status, error_body);
            return Err(LlmError::ResponseError(format!(
                "Ollama API responded with status code: {}{}",
                status, error_body
            )));
        }

        let response_text = response
            .text()
            .await
            .map_err(|e| LlmError::ResponseError(format!("Failed to read response body: {}", e)))?;

        debug!("Raw response from Ollama: {}", response_text);

        let ollama_response = match serde_json::from_str::<OllamaResponse>(&response_text) {
            Ok(resp) => resp,
            Err(e) => {
                error!("Failed to parse Ollama response: {} - Response was: {}", e, response_text);
                return Err(LlmError::ResponseError(format!(
                    "Failed to parse Ollama response: {}",
                    e
                )));
            }
        };

        if ollama_response.done == Some(false) {
            debug!("Ollama reported an unfinished generation");
        }

        Ok(ollama_response.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_disables_streaming_and_sets_options() {
        let config = GenerationConfig {
            model: "sqlcoder".to_string(),
            temperature: 0.5,
            top_p: 0.9,
            max_tokens: Some(256),
        };
        let body = serde_json::to_value(build_request("q", &config)).unwrap();

        assert_eq!(body["model"], "sqlcoder");
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["num_predict"], 256);
        assert!((body["options"]["top_p"].as_f64().unwrap() - 0.9).abs() < 1e-6);
    }
}
