// src/backend/openai.rs
// OpenAI-compatible chat completions (Ollama, vLLM, hosted endpoints).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{InferenceBackend, InferenceTask};
use crate::config::BackendSettings;
use crate::error::InferenceError;

pub struct OpenAiCompatBackend {
    name: String,
    client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
    health_timeout: Duration,
    default_model: Option<String>,
    default_max_tokens: u32,
    default_temperature: f32,
    default_top_p: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Default API base per flavour when none is configured.
fn default_api_base(kind: &str) -> &'static str {
    match kind {
        "vllm" => "http://localhost:8000/v1",
        "openai" => "https://api.openai.com/v1",
        _ => "http://localhost:11434/v1",
    }
}

impl OpenAiCompatBackend {
    pub fn new(kind: &str, settings: &BackendSettings) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(settings.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        let api_base = settings
            .api_base
            .clone()
            .unwrap_or_else(|| default_api_base(kind).to_string());
        Self {
            name: kind.to_string(),
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            health_timeout: settings.health_timeout,
            default_model: settings.default_model.clone(),
            default_max_tokens: settings.default_max_tokens,
            default_temperature: settings.default_temperature,
            default_top_p: settings.default_top_p,
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn health_timeout(&self) -> Duration {
        self.health_timeout
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }

    fn request_body(&self, task: &InferenceTask) -> Result<serde_json::Value, InferenceError> {
        let model = task
            .model
            .clone()
            .or_else(|| self.default_model.clone())
            .ok_or_else(|| InferenceError::Unavailable("no model requested or configured".into()))?;
        Ok(json!({
            "model": model,
            "messages": [{ "role": "user", "content": task.prompt }],
            "max_tokens": task.max_tokens.unwrap_or(self.default_max_tokens),
            "temperature": task.temperature.unwrap_or(self.default_temperature),
            "top_p": task.top_p.unwrap_or(self.default_top_p),
        }))
    }
}

#[async_trait]
impl InferenceBackend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn health_check(&self) -> bool {
        let req = self
            .authorized(self.client.get(format!("{}/models", self.api_base)))
            .timeout(self.health_timeout);
        matches!(req.send().await, Ok(resp) if resp.status().is_success())
    }

    async fn run_task(&self, task: &InferenceTask) -> Result<String, InferenceError> {
        let body = self.request_body(task)?;
        let resp = self
            .authorized(
                self.client
                    .post(format!("{}/chat/completions", self.api_base))
                    .json(&body),
            )
            .send()
            .await
            .map_err(|e| InferenceError::Unavailable(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(InferenceError::Request(format!("status {status}: {text}")));
        }
        let completion: ChatCompletion = resp
            .json()
            .await
            .map_err(|e| InferenceError::InvalidResponse(e.to_string()))?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.unwrap_or_default())
            .ok_or_else(|| InferenceError::InvalidResponse("no choices returned".into()))
    }
}
