//! Ollama local-server adapter
//!
//! Two pieces: [`OllamaBackend`] implements the chat contract against
//! `POST /api/chat`, and [`OllamaManager`] wraps the management endpoints the
//! CLI uses (`/api/tags`, `/api/pull`, `/api/delete`). No credential is
//! required for either.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    config::{BackendConfig, BackendKind},
    error::Result,
    messages::{Message, Role},
};

use super::{
    malformed, status_error, transport_error, AssistantReply, ChatBackend, ChatOptions, Usage,
};

/// Reachability probes and model listing stay snappy
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Pulling a model downloads gigabytes
const PULL_TIMEOUT: Duration = Duration::from_secs(600);

/// Chat adapter for a local Ollama server
#[derive(Debug)]
pub struct OllamaBackend {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaBackend {
    /// Create a new Ollama adapter
    pub fn new(config: BackendConfig) -> Result<Self> {
        let base_url = config.effective_base_url();
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| crate::error::AtelierError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            model: config.model,
        })
    }

    // The server takes the system prompt as a leading system message; keep an
    // existing one if the conversation already carries it.
    fn convert_messages(
        conversation: &[Message],
        system_prompt: Option<&str>,
    ) -> Vec<WireMessage> {
        let mut messages = Vec::with_capacity(conversation.len() + 1);

        if let Some(system) = system_prompt {
            if !conversation.iter().any(Message::is_system) {
                messages.push(WireMessage {
                    role: Role::System.as_str(),
                    content: system.to_string(),
                });
            }
        }

        messages.extend(conversation.iter().map(|msg| WireMessage {
            role: msg.role.as_str(),
            content: msg.content.clone(),
        }));

        messages
    }
}

#[async_trait]
impl ChatBackend for OllamaBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Ollama
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn send(
        &self,
        conversation: &[Message],
        system_prompt: Option<&str>,
        _options: &ChatOptions,
    ) -> Result<AssistantReply> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: Self::convert_messages(conversation, system_prompt),
            stream: false,
        };

        debug!(model = %self.model, turns = conversation.len(), "sending chat request to ollama");

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(BackendKind::Ollama, &e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(BackendKind::Ollama, &e))?;

        if !status.is_success() {
            return Err(status_error(BackendKind::Ollama, status, &body));
        }

        let envelope: ChatResponse = serde_json::from_str(&body)
            .map_err(|_| malformed(BackendKind::Ollama, "message"))?;

        let text = envelope
            .message
            .and_then(|msg| msg.content)
            .ok_or_else(|| malformed(BackendKind::Ollama, "message.content"))?;

        let usage = match (envelope.prompt_eval_count, envelope.eval_count) {
            (Some(input_tokens), Some(output_tokens)) => Some(Usage {
                input_tokens,
                output_tokens,
            }),
            _ => None,
        };

        Ok(AssistantReply {
            text,
            model: envelope.model,
            usage,
        })
    }
}

/// Management client for the local server
///
/// These are simple pass-throughs consumed by the CLI; chat traffic goes
/// through [`OllamaBackend`].
pub struct OllamaManager {
    client: Client,
    base_url: String,
}

impl OllamaManager {
    /// Create a management client for `base_url`
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| crate::error::AtelierError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Check whether the server answers at all
    pub async fn is_reachable(&self) -> bool {
        self.client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map(|response| response.status().is_success())
            .unwrap_or(false)
    }

    /// List installed models, sorted by name
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| transport_error(BackendKind::Ollama, &e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(BackendKind::Ollama, &e))?;

        if !status.is_success() {
            return Err(status_error(BackendKind::Ollama, status, &body));
        }

        let tags: TagsResponse =
            serde_json::from_str(&body).map_err(|_| malformed(BackendKind::Ollama, "models"))?;

        let mut names: Vec<String> = tags.models.into_iter().map(|tag| tag.name).collect();
        names.sort();
        Ok(names)
    }

    /// Pull a model from the registry, returning the final status line
    pub async fn pull_model(&self, name: &str) -> Result<String> {
        debug!(model = name, "pulling ollama model");

        let response = self
            .client
            .post(format!("{}/api/pull", self.base_url))
            .json(&NamedModel {
                name: name.to_string(),
                stream: false,
            })
            .timeout(PULL_TIMEOUT)
            .send()
            .await
            .map_err(|e| transport_error(BackendKind::Ollama, &e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(BackendKind::Ollama, &e))?;

        if !status.is_success() {
            return Err(status_error(BackendKind::Ollama, status, &body));
        }

        let pull: PullResponse =
            serde_json::from_str(&body).map_err(|_| malformed(BackendKind::Ollama, "status"))?;
        pull.status
            .ok_or_else(|| malformed(BackendKind::Ollama, "status"))
    }

    /// Remove an installed model
    pub async fn delete_model(&self, name: &str) -> Result<()> {
        let response = self
            .client
            .delete(format!("{}/api/delete", self.base_url))
            .json(&serde_json::json!({ "name": name }))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| transport_error(BackendKind::Ollama, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(BackendKind::Ollama, status, &body));
        }
        Ok(())
    }
}

// Wire types

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<WireReply>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct WireReply {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

#[derive(Debug, Serialize)]
struct NamedModel {
    name: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct PullResponse {
    #[serde(default)]
    status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AtelierError;
    use pretty_assertions::assert_eq;
    use wiremock::{
        matchers::{body_partial_json, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn config(base_url: &str) -> BackendConfig {
        BackendConfig::for_kind(BackendKind::Ollama).with_base_url(base_url)
    }

    #[test]
    fn test_system_prompt_prepended_once() {
        let conversation = vec![Message::user("hello")];
        let messages = OllamaBackend::convert_messages(&conversation, Some("Be terse"));
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[0].content, "Be terse");

        // An existing system turn wins over the prompt argument.
        let conversation = vec![Message::system("Already here"), Message::user("hello")];
        let messages = OllamaBackend::convert_messages(&conversation, Some("Be terse"));
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "Already here");
    }

    #[tokio::test]
    async fn test_replies_with_generated_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(serde_json::json!({
                "model": "llama3",
                "stream": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "llama3",
                "message": {"role": "assistant", "content": "hi there"},
                "done": true,
                "prompt_eval_count": 12,
                "eval_count": 3
            })))
            .mount(&server)
            .await;

        let backend = OllamaBackend::new(config(&server.uri())).unwrap();
        let reply = backend
            .send(&[Message::user("hello")], None, &ChatOptions::default())
            .await
            .unwrap();

        assert_eq!(reply.text, "hi there");
        assert_eq!(reply.model.as_deref(), Some("llama3"));
        let usage = reply.usage.unwrap();
        assert_eq!(usage.input_tokens, 12);
        assert_eq!(usage.output_tokens, 3);
    }

    #[tokio::test]
    async fn test_missing_content_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "llama3",
                "done": true
            })))
            .mount(&server)
            .await;

        let backend = OllamaBackend::new(config(&server.uri())).unwrap();
        let err = backend
            .send(&[Message::user("hello")], None, &ChatOptions::default())
            .await
            .unwrap_err();

        assert!(
            matches!(err, AtelierError::MalformedResponse { ref field, .. } if field == "message.content"),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn test_timeout_maps_to_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"message": {"content": "late"}}))
                    .set_delay(Duration::from_millis(250)),
            )
            .mount(&server)
            .await;

        let backend = OllamaBackend::new(
            config(&server.uri()).with_timeout(Duration::from_millis(50)),
        )
        .unwrap();
        let err = backend
            .send(&[Message::user("hello")], None, &ChatOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AtelierError::BackendUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_connection_refused_maps_to_unavailable() {
        // Port 1 is never listening.
        let backend = OllamaBackend::new(config("http://127.0.0.1:1")).unwrap();
        let err = backend
            .send(&[Message::user("hello")], None, &ChatOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AtelierError::BackendUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_server_error_passes_message_through() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(serde_json::json!({"error": "model 'missing' not found"})),
            )
            .mount(&server)
            .await;

        let backend = OllamaBackend::new(config(&server.uri())).unwrap();
        let err = backend
            .send(&[Message::user("hello")], None, &ChatOptions::default())
            .await
            .unwrap_err();

        match err {
            AtelierError::ProviderError { message, .. } => {
                assert_eq!(message, "model 'missing' not found");
            }
            other => panic!("expected ProviderError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_list_models_sorted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": [
                    {"name": "mistral", "size": 1},
                    {"name": "llama3", "size": 2}
                ]
            })))
            .mount(&server)
            .await;

        let manager = OllamaManager::new(server.uri()).unwrap();
        assert!(manager.is_reachable().await);
        assert_eq!(manager.list_models().await.unwrap(), vec!["llama3", "mistral"]);
    }

    #[tokio::test]
    async fn test_pull_and_delete() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/pull"))
            .and(body_partial_json(serde_json::json!({"name": "llama3"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "success"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/delete"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let manager = OllamaManager::new(server.uri()).unwrap();
        assert_eq!(manager.pull_model("llama3").await.unwrap(), "success");
        manager.delete_model("llama3").await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_manager() {
        let manager = OllamaManager::new("http://127.0.0.1:1").unwrap();
        assert!(!manager.is_reachable().await);
        assert!(matches!(
            manager.list_models().await.unwrap_err(),
            AtelierError::BackendUnavailable { .. }
        ));
    }
}
