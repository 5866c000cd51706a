//! Language-model capability over OpenAI-compatible chat completions.
//!
//! All settings, the API key included, come from an [`LlmSettings`] value
//! handed over at construction. Nothing is read from process-wide state
//! after that.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use sieve_core::config::LlmSettings;
use sieve_core::{Error, LanguageModel, ModelReply, Result};

pub struct OpenAiCompatibleModel {
    endpoint: String,
    model: String,
    temperature: f32,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiCompatibleModel {
    pub fn from_settings(settings: &LlmSettings) -> Result<Self> {
        if settings.model.trim().is_empty() {
            return Err(Error::InvalidConfig("llm.model must not be empty".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .build()
            .map_err(|e| Error::Llm(format!("http client: {e}")))?;
        Ok(Self {
            endpoint: format!("{}/chat/completions", settings.api_base.trim_end_matches('/')),
            model: settings.model.clone(),
            temperature: settings.temperature,
            api_key: settings.resolved_api_key(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub(crate) fn request_body(&self, prompt: &str) -> Value {
        serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": false,
            "temperature": self.temperature,
        })
    }
}

/// Pulls `choices[0].message.content` out of a completion response.
pub(crate) fn reply_content(json: &Value) -> Result<String> {
    json["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| Error::Llm("response has no choices[0].message.content".into()))
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleModel {
    async fn invoke(&self, prompt: &str) -> Result<ModelReply> {
        let body = self.request_body(prompt);
        tracing::debug!(model = %self.model, prompt_len = prompt.len(), "sending LLM request");

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.map_err(|e| Error::Llm(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(Error::Llm(format!("{status}: {err_body}")));
        }

        let json: Value = response.json().await.map_err(|e| Error::Llm(format!("malformed response: {e}")))?;
        let content = reply_content(&json)?;
        tracing::info!(model = %self.model, content_len = content.len(), "LLM JSON response received");
        Ok(ModelReply::new(content))
    }
}
