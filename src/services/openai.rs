//! OpenAI API adapter
//!
//! Talks to the chat completions API. The system prompt is prepended as a
//! `system` message when the conversation does not already carry one.

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

/// OpenAI API adapter
#[derive(Debug)]
pub struct OpenAiBackend {
    client: Client,
    base_url: String,
    model: String,
}

impl OpenAiBackend {
    /// Create a new OpenAI adapter
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
impl ChatBackend for OpenAiBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::OpenAi
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
        let request = CompletionsRequest {
            model: self.model.clone(),
            messages: Self::convert_messages(conversation, system_prompt),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            stream: false,
        };

        debug!(model = %self.model, turns = conversation.len(), "sending completions request to openai");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(BackendKind::OpenAi, &e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(BackendKind::OpenAi, &e))?;

        if !status.is_success() {
            return Err(status_error(BackendKind::OpenAi, status, &body));
        }

        let envelope: CompletionsResponse = serde_json::from_str(&body)
            .map_err(|_| malformed(BackendKind::OpenAi, "choices"))?;

        let choice = envelope
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| malformed(BackendKind::OpenAi, "choices"))?;

        if let Some(reason) = &choice.finish_reason {
            debug!(finish_reason = %reason, "openai completion finished");
        }

        let text = choice
            .message
            .content
            .ok_or_else(|| malformed(BackendKind::OpenAi, "choices[0].message.content"))?;

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

// OpenAI API types

#[derive(Debug, Serialize)]
struct CompletionsRequest {
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
struct CompletionsResponse {
    choices: Vec<WireChoice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireReply,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireReply {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{BackendFactory, ChatOptions};
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use wiremock::{
        matchers::{body_partial_json, header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn config(base_url: &str) -> BackendConfig {
        BackendConfig::for_kind(BackendKind::OpenAi)
            .with_base_url(base_url)
            .with_api_key("sk-test")
    }

    fn completions_reply(text: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 0,
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": text},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 5, "completion_tokens": 2, "total_tokens": 7}
        }))
    }

    #[test]
    fn test_missing_credential_fails_before_any_request() {
        let err =
            BackendFactory::create(BackendConfig::for_kind(BackendKind::OpenAi)).unwrap_err();
        assert!(matches!(err, AtelierError::MissingCredential { .. }));
    }

    #[test]
    fn test_system_prompt_prepended_once() {
        let conversation = vec![Message::user("hello")];
        let messages = OpenAiBackend::convert_messages(&conversation, Some("Be terse"));
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");

        let conversation = vec![Message::system("Already here"), Message::user("hello")];
        let messages = OpenAiBackend::convert_messages(&conversation, Some("Be terse"));
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "Already here");
    }

    #[tokio::test]
    async fn test_replies_with_extracted_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o-mini",
                "stream": false,
                "messages": [{"role": "user", "content": "hello"}]
            })))
            .respond_with(completions_reply("hi there"))
            .mount(&server)
            .await;

        let backend = BackendFactory::create(config(&server.uri())).unwrap();
        let reply = backend
            .send(&[Message::user("hello")], None, &ChatOptions::default())
            .await
            .unwrap();

        assert_eq!(reply.text, "hi there");
        assert_eq!(reply.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(reply.usage.unwrap().input_tokens, 5);
    }

    #[tokio::test]
    async fn test_empty_choices_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "chatcmpl-1",
                "model": "gpt-4o-mini",
                "choices": []
            })))
            .mount(&server)
            .await;

        let backend = BackendFactory::create(config(&server.uri())).unwrap();
        let err = backend
            .send(&[Message::user("hello")], None, &ChatOptions::default())
            .await
            .unwrap_err();

        assert!(
            matches!(err, AtelierError::MalformedResponse { ref field, .. } if field == "choices")
        );
    }

    #[tokio::test]
    async fn test_null_content_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "chatcmpl-1",
                "model": "gpt-4o-mini",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": null},
                    "finish_reason": "stop"
                }]
            })))
            .mount(&server)
            .await;

        let backend = BackendFactory::create(config(&server.uri())).unwrap();
        let err = backend
            .send(&[Message::user("hello")], None, &ChatOptions::default())
            .await
            .unwrap_err();

        assert!(
            matches!(err, AtelierError::MalformedResponse { ref field, .. } if field == "choices[0].message.content"),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn test_auth_and_rate_limit_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": {"message": "Rate limit reached", "type": "tokens"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = BackendFactory::create(config(&server.uri())).unwrap();
        let err = backend
            .send(&[Message::user("hello")], None, &ChatOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AtelierError::RateLimited { .. }));

        server.reset().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}
            })))
            .mount(&server)
            .await;

        let err = backend
            .send(&[Message::user("hello")], None, &ChatOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AtelierError::AuthenticationFailed { .. }));
    }

    #[tokio::test]
    async fn test_timeout_maps_to_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(completions_reply("late").set_delay(Duration::from_millis(250)))
            .mount(&server)
            .await;

        let backend = BackendFactory::create(
            config(&server.uri()).with_timeout(Duration::from_millis(50)),
        )
        .unwrap();
        let err = backend
            .send(&[Message::user("hello")], None, &ChatOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AtelierError::BackendUnavailable { .. }));
    }
}
