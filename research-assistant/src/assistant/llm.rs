use async_trait::async_trait;
use ollama_rs::generation::completion::request::GenerationRequest;
use ollama_rs::Ollama;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use super::configuration::{Configuration, LlmProvider};
use crate::error::{ReportError, Result};

/// A chat model that turns a system prompt and a user prompt into text.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String>;

    fn model_name(&self) -> &str;
}

/// Client for any OpenAI-compatible chat completions endpoint.
pub struct OpenAiClient {
    api_key: String,
    model: String,
    base_url: String,
    client: Client,
}

impl OpenAiClient {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        debug!(model = %self.model, "requesting chat completion");
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "messages": [
                    { "role": "system", "content": system },
                    { "role": "user", "content": prompt }
                ],
                "temperature": 0.7
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReportError::Upstream {
                service: "OpenAI",
                message: format!("{status}: {body}"),
            });
        }

        let data = response.json::<Value>().await?;
        completion_content(&data)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn completion_content(data: &Value) -> Result<String> {
    data["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ReportError::Upstream {
            service: "OpenAI",
            message: "response did not contain a message".to_string(),
        })
}

/// Local model served by Ollama on its default address.
pub struct OllamaClient {
    ollama: Ollama,
    model: String,
}

impl OllamaClient {
    pub fn new(model: String) -> Self {
        Self {
            ollama: Ollama::default(),
            model,
        }
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        debug!(model = %self.model, "requesting ollama generation");
        let request = GenerationRequest::new(self.model.clone(), format!("{system}\n\n{prompt}"));
        let response = self
            .ollama
            .generate(request)
            .await
            .map_err(|e| ReportError::Upstream {
                service: "Ollama",
                message: e.to_string(),
            })?;
        Ok(strip_think_tags(&response.response))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Remove `<think>…</think>` reasoning blocks emitted by reasoning models.
pub fn strip_think_tags(text: &str) -> String {
    let mut out = text.to_string();
    while let Some(start) = out.find("<think>") {
        let Some(end) = out[start..].find("</think>") else {
            break;
        };
        out.replace_range(start..start + end + "</think>".len(), "");
    }
    out.trim().to_string()
}

pub fn language_model(config: &Configuration) -> Arc<dyn LanguageModel> {
    match config.llm_provider {
        LlmProvider::OpenAi => Arc::new(OpenAiClient::new(
            config.openai_api_key.clone(),
            config.openai_model.clone(),
            config.openai_base_url.clone(),
        )),
        LlmProvider::Ollama => Arc::new(OllamaClient::new(config.ollama_model.clone())),
    }
}
