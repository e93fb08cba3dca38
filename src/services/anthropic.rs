//! Anthropic Claude API adapter
//!
//! Talks to the messages API. The system prompt travels in the dedicated
//! `system` request field, never as a message turn, because the API rejects
//! a `system` role in the message list.

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

const ANTHROPIC_VERSION: &str = "2023-06-01";

const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Anthropic API adapter
#[derive(Debug)]
pub struct AnthropicBackend {
    client: Client,
    base_url: String,
    model: String,
}

impl AnthropicBackend {
    /// Create a new Anthropic adapter
    ///
    /// Fails with [`AtelierError::MissingCredential`] when the config carries
    /// no API key; no request is made in that case.
    pub fn new(config: BackendConfig) -> Result<Self> {
        let api_key = require_api_key(&config)?;
        let base_url = config.effective_base_url();

        let client = Client::builder()
            .default_headers({
                let mut headers = header::HeaderMap::new();
                let mut key_value = header::HeaderValue::from_str(api_key.expose())
                    .map_err(|_| {
                        AtelierError::InvalidConfig("Invalid API key format".to_string())
                    })?;
                key_value.set_sensitive(true);
                headers.insert("x-api-key", key_value);
                headers.insert(
                    "anthropic-version",
                    header::HeaderValue::from_static(ANTHROPIC_VERSION),
                );
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

    /// Lift the system prompt (or a leading system turn) into the `system`
    /// field and convert the remaining turns to API messages
    fn convert_messages(
        conversation: &[Message],
        system_prompt: Option<&str>,
    ) -> (Option<String>, Vec<WireMessage>) {
        let system = system_prompt.map(ToString::to_string).or_else(|| {
            conversation
                .iter()
                .find(|msg| msg.is_system())
                .map(|msg| msg.content.clone())
        });

        let messages = conversation
            .iter()
            .filter(|msg| !msg.is_system())
            .map(|msg| WireMessage {
                role: match msg.role {
                    Role::Assistant => "assistant",
                    _ => "user",
                },
                content: msg.content.clone(),
            })
            .collect();

        (system, messages)
    }
}

#[async_trait]
impl ChatBackend for AnthropicBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Anthropic
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
        let (system, messages) = Self::convert_messages(conversation, system_prompt);

        let request = MessagesRequest {
            model: self.model.clone(),
            messages,
            system,
            max_tokens: options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: options.temperature,
        };

        debug!(model = %self.model, turns = conversation.len(), "sending messages request to anthropic");

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(BackendKind::Anthropic, &e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(BackendKind::Anthropic, &e))?;

        if !status.is_success() {
            return Err(status_error(BackendKind::Anthropic, status, &body));
        }

        let envelope: MessagesResponse = serde_json::from_str(&body)
            .map_err(|_| malformed(BackendKind::Anthropic, "content"))?;

        // The reply is the concatenation of the text blocks; anything else
        // (thinking blocks and the like) is skipped.
        let text: String = envelope
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text.as_deref())
            .collect();

        if text.is_empty() {
            return Err(malformed(BackendKind::Anthropic, "content[].text"));
        }

        Ok(AssistantReply {
            text,
            model: envelope.model,
            usage: envelope.usage.map(|usage| Usage {
                input_tokens: usage.input_tokens,
                output_tokens: usage.output_tokens,
            }),
        })
    }
}

// Anthropic API types

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    input_tokens: u32,
    output_tokens: u32,
}
