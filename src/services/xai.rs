//! xAI Grok API adapter
//!
//! Grok speaks a chat-completions dialect at `https://api.x.ai/v1`. The
//! envelope is close to OpenAI's but is parsed with its own types so a drift
//! on either side stays contained to one adapter.

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    config::{BackendConfig, BackendKind},
    error::{AtelierError, Result},
    messages::{Message, Role},
};

use super::{
    malformed, require_api_key, status_error, transport_error, AssistantReply, ChatBackend,
    ChatOptions, Usage,
};

/// xAI API adapter
#[derive(Debug)]
pub struct XaiBackend {
    client: Client,
    base_url: String,
    model: String,
}

impl XaiBackend {
    /// Create a new xAI adapter
    ///
    /// Fails with [`AtelierError::MissingCredential`] when the config carries
    /// no API key; no request is made in that case.
    pub fn new(config: BackendConfig) -> Result<Self> {
        let api_key = require_api_key(&config)?;
        let base_url = config.effective_base_url();

        let client = Client::builder()
            .default_headers({
                let mut headers = header::HeaderMap::new();
                let mut auth_value =
                    header::HeaderValue::from_str(&format!("Bearer {}", api_key.expose()))
                        .map_err(|_| {
                            AtelierError::InvalidConfig("Invalid API key format".to_string())
                        })?;
                auth_value.set_sensitive(true);
                headers.insert(header::AUTHORIZATION, auth_value);
                headers
            })
            .timeout(config.timeout)
            .build()
            .map_err(|e| AtelierError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            model: config.model,
        })
    }

    fn convert_messages(
        conversation: &[Message],
        system_prompt: Option<&str>,
    ) -> Vec<WireMessage> {
        let mut messages = Vec::with_capacity(conversation.len() + 1);

        if let Some(system) = system_prompt {
            if !conversation.iter().any(Message::is_system) {
                messages.push(WireMessage {
                    role: Role::System.as_str().to_string(),
                    content: system.to_string(),
                });
            }
        }

        messages.extend(conversation.iter().map(|msg| WireMessage {
            role: msg.role.as_str().to_string(),
            content: msg.content.clone(),
        }));

        messages
    }
}

#[async_trait]
impl ChatBackend for XaiBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Xai
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn send(
        &self,
        conversation: &[Message],
        system_prompt: Option<&str>,
        options: &ChatOptions,
    ) -> Result<AssistantReply> {
        let request = GrokRequest {
            model: self.model.clone(),
            messages: Self::convert_messages(conversation, system_prompt),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            stream: false,
        };

        debug!(model = %self.model, turns = conversation.len(), "sending completions request to xai");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(BackendKind::Xai, &e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(BackendKind::Xai, &e))?;

        if !status.is_success() {
            return Err(status_error(BackendKind::Xai, status, &body));
        }

        let envelope: GrokResponse =
            serde_json::from_str(&body).map_err(|_| malformed(BackendKind::Xai, "choices"))?;

        let choice = envelope
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| malformed(BackendKind::Xai, "choices"))?;

        let text = choice
            .message
            .content
            .ok_or_else(|| malformed(BackendKind::Xai, "choices[0].message.content"))?;

        Ok(AssistantReply {
            text,
            model: envelope.model,
            usage: envelope.usage.map(|usage| Usage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            }),
        })
    }
}

// xAI API types

#[derive(Debug, Serialize)]
struct GrokRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct GrokResponse {
    choices: Vec<GrokChoice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<GrokUsage>,
}

#[derive(Debug, Deserialize)]
struct GrokChoice {
    message: GrokReply,
}

#[derive(Debug, Deserialize)]
struct GrokReply {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GrokUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
