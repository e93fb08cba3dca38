//! Backend adapters for local and hosted chat providers
//!
//! One [`ChatBackend`] implementation per backend kind:
//! - Ollama (local server)
//! - Anthropic (Claude)
//! - OpenAI (ChatGPT)
//! - xAI (Grok)
//!
//! Adapters translate a uniform conversation into each provider's native
//! request schema and pull the assistant's text back out of its response
//! envelope. Failures are normalized into the categories on
//! [`AtelierError`](crate::error::AtelierError) so callers can tell an
//! unreachable server from a rejected key from a provider-side error.

pub mod anthropic;
pub mod ollama;
pub mod openai;
pub mod xai;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::{
    config::{ApiKey, BackendConfig, BackendKind},
    error::{AtelierError, Result},
    messages::Message,
};

/// Options applied to a single completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatOptions {
    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Temperature for sampling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            max_tokens: Some(2048),
            temperature: None,
        }
    }
}

/// Token usage reported by a backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// A completed assistant turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantReply {
    /// Generated text, extracted from the provider's envelope
    pub text: String,

    /// Model the provider says produced the reply
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Core trait for chat backends
///
/// Implementations make exactly one network call per [`send`](Self::send)
/// and never retry; retry policy belongs to the caller. The request is
/// bounded by the timeout carried in the adapter's [`BackendConfig`], so a
/// blocking caller is never stuck indefinitely.
#[async_trait]
pub trait ChatBackend: std::fmt::Debug + Send + Sync {
    /// Which backend kind this adapter talks to
    fn kind(&self) -> BackendKind;

    /// Model identifier sent with each request
    fn model(&self) -> &str;

    /// Send the conversation and return the next assistant turn
    ///
    /// `system_prompt` is reshaped into whatever the provider expects (a
    /// dedicated request field or a leading `system` message). On failure the
    /// caller gets a typed error and no partial text.
    async fn send(
        &self,
        conversation: &[Message],
        system_prompt: Option<&str>,
        options: &ChatOptions,
    ) -> Result<AssistantReply>;
}

/// Factory for chat backends, keyed on the configured kind
pub struct BackendFactory;

impl BackendFactory {
    /// Build the adapter for `config.kind`
    ///
    /// Hosted kinds fail here with
    /// [`AtelierError::MissingCredential`] when no API key is present,
    /// before any request is made.
    pub fn create(config: BackendConfig) -> Result<Box<dyn ChatBackend>> {
        Ok(match config.kind {
            BackendKind::Ollama => Box::new(ollama::OllamaBackend::new(config)?),
            BackendKind::Anthropic => Box::new(anthropic::AnthropicBackend::new(config)?),
            BackendKind::OpenAi => Box::new(openai::OpenAiBackend::new(config)?),
            BackendKind::Xai => Box::new(xai::XaiBackend::new(config)?),
        })
    }
}

/// Take the API key out of a hosted backend's config
pub(crate) fn require_api_key(config: &BackendConfig) -> Result<ApiKey> {
    config
        .api_key
        .clone()
        .filter(|key| !key.is_empty())
        .ok_or_else(|| AtelierError::MissingCredential {
            backend: config.kind.to_string(),
        })
}

/// Map a transport-layer failure (timeout, DNS, refused connection) onto the
/// unavailable category
pub(crate) fn transport_error(kind: BackendKind, err: &reqwest::Error) -> AtelierError {
    let message = if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        "connection failed".to_string()
    } else {
        err.to_string()
    };
    AtelierError::BackendUnavailable {
        backend: kind.to_string(),
        message,
    }
}

/// Classify a non-success HTTP status, passing the provider's own message
/// through when the body carries one
pub(crate) fn status_error(kind: BackendKind, status: StatusCode, body: &str) -> AtelierError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AtelierError::AuthenticationFailed {
            backend: kind.to_string(),
        },
        StatusCode::TOO_MANY_REQUESTS => AtelierError::RateLimited {
            backend: kind.to_string(),
        },
        _ => AtelierError::ProviderError {
            backend: kind.to_string(),
            message: provider_message(body).unwrap_or_else(|| format!("HTTP {status}")),
        },
    }
}

/// Shorthand for a missing-field failure
pub(crate) fn malformed(kind: BackendKind, field: &str) -> AtelierError {
    AtelierError::MalformedResponse {
        backend: kind.to_string(),
        field: field.to_string(),
    }
}

// Anthropic, OpenAI, and xAI wrap errors as {"error": {"message": ...}};
// Ollama uses a bare {"error": "..."} string.
fn provider_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match &value["error"] {
        serde_json::Value::String(message) => Some(message.clone()),
        nested @ serde_json::Value::Object(_) => {
            nested["message"].as_str().map(ToString::to_string)
        }
        _ => None,
    }
}
