//! Core `VisionService` trait and the `ApiVisionClient` implementation.
//!
//! `ApiVisionClient` calls an OpenAI-compatible chat-completions endpoint
//! (OpenRouter by default) with the JPEG frame attached as a base64 data URL.
//! All connection details come from [`VisionConfig`].

use async_trait::async_trait;
use base64::Engine;
use thiserror::Error;

use super::prompt::{analysis_prompt, chat_prompt, clean_for_speech};
use super::VisionMode;
use crate::camera::Frame;
use crate::config::VisionConfig;

// ---------------------------------------------------------------------------
// VisionError
// ---------------------------------------------------------------------------

/// Errors that can occur while talking to the vision endpoint.
#[derive(Debug, Error)]
pub enum VisionError {
    /// No API key was supplied at startup.
    #[error("vision service is not configured (missing API key)")]
    NotConfigured,

    /// HTTP transport or connection error.
    #[error("HTTP request failed: {0}")]
    Request(String),

    #[error("vision request timed out")]
    Timeout,

    /// The endpoint answered with a non-success status.
    #[error("vision endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The HTTP response could not be parsed as expected JSON.
    #[error("failed to parse vision response: {0}")]
    Parse(String),

    /// The model returned no usable text.
    #[error("vision endpoint returned an empty response")]
    EmptyResponse,
}

impl From<reqwest::Error> for VisionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            VisionError::Timeout
        } else {
            VisionError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// VisionService trait
// ---------------------------------------------------------------------------

/// Remote image analysis and conversation.
///
/// Implementors must be `Send + Sync` so they can be shared as
/// `Arc<dyn VisionService>` between the controller and the guidance worker.
#[async_trait]
pub trait VisionService: Send + Sync {
    /// Analyse `frame` for the given purpose and return speakable text.
    async fn analyze(&self, frame: &Frame, mode: VisionMode) -> Result<String, VisionError>;

    /// Answer `text`, optionally grounded by `frame`.
    async fn chat(&self, text: &str, frame: Option<&Frame>) -> Result<String, VisionError>;
}

// ---------------------------------------------------------------------------
// ApiVisionClient
// ---------------------------------------------------------------------------

pub struct ApiVisionClient {
    client: reqwest::Client,
    config: VisionConfig,
}

impl ApiVisionClient {
    /// Build a client from application config.
    ///
    /// The HTTP client carries the per-request timeout from
    /// `config.timeout_secs`.
    pub fn from_config(config: &VisionConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            config: config.clone(),
        }
    }

    /// Build the user message content: prompt text plus optional image part.
    fn content(prompt: &str, frame: Option<&Frame>) -> serde_json::Value {
        let mut parts = vec![serde_json::json!({ "type": "text", "text": prompt })];

        if let Some(frame) = frame {
            let encoded = base64::engine::general_purpose::STANDARD.encode(&frame.jpeg);
            parts.push(serde_json::json!({
                "type": "image_url",
                "image_url": { "url": format!("data:{};base64,{encoded}", Frame::MIME) }
            }));
        }

        serde_json::Value::Array(parts)
    }

    fn request_body(&self, prompt: &str, frame: Option<&Frame>) -> serde_json::Value {
        serde_json::json!({
            "model":       self.config.model,
            "messages": [
                { "role": "user", "content": Self::content(prompt, frame) }
            ],
            "stream":      false,
            "temperature": self.config.temperature,
            "max_tokens":  self.config.max_tokens
        })
    }

    async fn complete(&self, prompt: &str, frame: Option<&Frame>) -> Result<String, VisionError> {
        let key = self
            .config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(VisionError::NotConfigured)?;

        let response = self
            .client
            .post(&self.config.url)
            .bearer_auth(key)
            .json(&self.request_body(prompt, frame))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VisionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| VisionError::Parse(e.to_string()))?;

        extract_reply(&json)
    }
}

/// Pull the first choice's message text out of a chat-completions response
/// and clean it for speech.
pub(crate) fn extract_reply(json: &serde_json::Value) -> Result<String, VisionError> {
    let text = json["choices"][0]["message"]["content"]
        .as_str()
        .ok_or(VisionError::EmptyResponse)?;

    let cleaned = clean_for_speech(text);
    if cleaned.is_empty() {
        return Err(VisionError::EmptyResponse);
    }
    Ok(cleaned)
}

#[async_trait]
impl VisionService for ApiVisionClient {
    async fn analyze(&self, frame: &Frame, mode: VisionMode) -> Result<String, VisionError> {
        self.complete(analysis_prompt(mode), Some(frame)).await
    }

    async fn chat(&self, text: &str, frame: Option<&Frame>) -> Result<String, VisionError> {
        self.complete(&chat_prompt(text), frame).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
