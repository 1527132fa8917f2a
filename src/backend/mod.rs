//! Inference collaborators.
//!
//! The responder core only sees [`InferenceBackend`]; concrete engines are
//! chosen once at startup by [`build_backend`].

pub mod mock;
pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::BackendSettings;
use crate::emit_system_event;
use crate::error::InferenceError;
use crate::events::model::LogLevel;

pub use mock::MockBackend;
pub use openai::OpenAiCompatBackend;

/// Decrypted challenge plaintext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceTask {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Opaque requester data, echoed back in the output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl InferenceTask {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: None,
            max_tokens: None,
            temperature: None,
            top_p: None,
            metadata: None,
        }
    }
}

/// Plaintext of a successful challenge reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceOutput {
    pub response_text: String,
    pub response_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

#[async_trait]
pub trait InferenceBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Cheap liveness check used by the readiness poller.
    async fn health_check(&self) -> bool;

    async fn run_task(&self, task: &InferenceTask) -> Result<String, InferenceError>;
}

const KNOWN_KINDS: &[&str] = &["mock", "openai", "ollama", "vllm"];

/// Instantiate the configured backend. Test mode always yields the canned mock.
pub fn build_backend(settings: &BackendSettings) -> Arc<dyn InferenceBackend> {
    if settings.test_mode {
        return Arc::new(MockBackend::test_mode());
    }
    let kind = if KNOWN_KINDS.contains(&settings.kind.as_str()) {
        settings.kind.as_str()
    } else {
        emit_system_event!(
            "backend",
            LogLevel::Warn,
            "unknown_backend",
            Some(format!(
                "kind={} falling back to {}",
                settings.kind, KNOWN_KINDS[0]
            ))
        );
        KNOWN_KINDS[0]
    };
    match kind {
        "openai" | "ollama" | "vllm" => Arc::new(OpenAiCompatBackend::new(kind, settings)),
        _ => Arc::new(MockBackend::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_defaults_optional_fields() {
        let t: InferenceTask = serde_json::from_str(r#"{"prompt":"hi"}"#).unwrap();
        assert_eq!(t.prompt, "hi");
        assert!(t.model.is_none() && t.metadata.is_none());
        assert!(serde_json::from_str::<InferenceTask>(r#"{"model":"x"}"#).is_err());
    }

    #[test]
    fn registry_resolves_kinds() {
        let mut s = BackendSettings::default();
        assert_eq!(build_backend(&s).name(), "mock");
        s.kind = "vllm".into();
        assert_eq!(build_backend(&s).name(), "vllm");
        s.kind = "does-not-exist".into();
        assert_eq!(build_backend(&s).name(), "mock");
        s.test_mode = true;
        assert_eq!(build_backend(&s).name(), "mock");
    }
}
