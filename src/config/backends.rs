//! Backend kinds and per-call configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AtelierError;

/// Default bound on a single chat request
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// The interchangeable text-generation backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Local Ollama server
    Ollama,
    /// Anthropic messages API
    Anthropic,
    /// OpenAI chat completions API
    OpenAi,
    /// xAI chat completions API
    Xai,
}

impl BackendKind {
    /// Every backend kind, in menu order
    pub const ALL: [Self; 4] = [Self::Ollama, Self::Anthropic, Self::OpenAi, Self::Xai];

    /// Get the default base URL for this backend
    #[must_use]
    pub const fn default_base_url(self) -> &'static str {
        match self {
            Self::Ollama => "http://localhost:11434",
            Self::Anthropic => "https://api.anthropic.com",
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Xai => "https://api.x.ai/v1",
        }
    }

    /// Get the model used when the caller does not pick one
    #[must_use]
    pub const fn default_model(self) -> &'static str {
        match self {
            Self::Ollama => "llama3",
            Self::Anthropic => "claude-3-5-sonnet-20241022",
            Self::OpenAi => "gpt-4o-mini",
            Self::Xai => "grok-beta",
        }
    }

    /// Check if this backend requires an API key
    #[must_use]
    pub const fn requires_api_key(self) -> bool {
        !matches!(self, Self::Ollama)
    }

    /// Human-readable label for menus and status output
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Ollama => "Ollama (Local)",
            Self::Anthropic => "Claude (Anthropic)",
            Self::OpenAi => "ChatGPT (OpenAI)",
            Self::Xai => "Grok (xAI)",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ollama => write!(f, "ollama"),
            Self::Anthropic => write!(f, "anthropic"),
            Self::OpenAi => write!(f, "openai"),
            Self::Xai => write!(f, "xai"),
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = AtelierError;

    // Accepts the provider names plus the product aliases users actually type.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" | "local" => Ok(Self::Ollama),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "openai" | "chatgpt" => Ok(Self::OpenAi),
            "xai" | "grok" => Ok(Self::Xai),
            _ => Err(AtelierError::InvalidConfig(format!(
                "unknown backend '{s}', expected one of: ollama, anthropic, openai, xai"
            ))),
        }
    }
}

/// API key for a hosted backend
///
/// `Debug` output is redacted so keys never reach logs or error chains, and
/// the type deliberately has no serde impls so it cannot be persisted by
/// accident.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Borrow the secret for building an auth header
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(****)")
    }
}

impl From<String> for ApiKey {
    fn from(key: String) -> Self {
        Self::new(key)
    }
}

impl From<&str> for ApiKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// Everything one call needs to reach a backend
///
/// Built fresh per invocation and passed by value into the factory; the
/// credential is never cached anywhere else.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Which backend to talk to
    pub kind: BackendKind,

    /// Model identifier sent with the request
    pub model: String,

    /// Custom endpoint (defaults per kind)
    pub base_url: Option<String>,

    /// API key for hosted kinds
    pub api_key: Option<ApiKey>,

    /// Bound on the blocking call
    pub timeout: Duration,
}

impl BackendConfig {
    /// Create a config for `kind` with an explicit model
    #[must_use]
    pub fn new(kind: BackendKind, model: impl Into<String>) -> Self {
        Self {
            kind,
            model: model.into(),
            base_url: None,
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Create a config for `kind` with its default model
    #[must_use]
    pub fn for_kind(kind: BackendKind) -> Self {
        Self::new(kind, kind.default_model())
    }

    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<ApiKey>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the effective base URL (custom or default), without a trailing slash
    #[must_use]
    pub fn effective_base_url(&self) -> String {
        let url = self
            .base_url
            .clone()
            .unwrap_or_else(|| self.kind.default_base_url().to_string());
        url.trim_end_matches('/').to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_base_urls() {
        assert_eq!(
            BackendKind::Ollama.default_base_url(),
            "http://localhost:11434"
        );
        assert_eq!(
            BackendKind::Anthropic.default_base_url(),
            "https://api.anthropic.com"
        );
        assert_eq!(BackendKind::Xai.default_base_url(), "https://api.x.ai/v1");
    }

    #[test]
    fn test_only_local_backend_is_keyless() {
        assert!(!BackendKind::Ollama.requires_api_key());
        assert!(BackendKind::Anthropic.requires_api_key());
        assert!(BackendKind::OpenAi.requires_api_key());
        assert!(BackendKind::Xai.requires_api_key());
    }

    #[test]
    fn test_kind_from_str_accepts_aliases() {
        assert_eq!("ollama".parse::<BackendKind>().unwrap(), BackendKind::Ollama);
        assert_eq!(
            "claude".parse::<BackendKind>().unwrap(),
            BackendKind::Anthropic
        );
        assert_eq!(
            "chatgpt".parse::<BackendKind>().unwrap(),
            BackendKind::OpenAi
        );
        assert_eq!("grok".parse::<BackendKind>().unwrap(), BackendKind::Xai);
        assert!("bard".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_api_key_debug_is_redacted() {
        let key = ApiKey::new("sk-very-secret");
        assert_eq!(format!("{key:?}"), "ApiKey(****)");

        let config = BackendConfig::for_kind(BackendKind::OpenAi).with_api_key("sk-very-secret");
        assert!(!format!("{config:?}").contains("sk-very-secret"));
    }

    #[test]
    fn test_effective_base_url_strips_trailing_slash() {
        let config =
            BackendConfig::for_kind(BackendKind::Ollama).with_base_url("http://10.0.0.5:11434/");
        assert_eq!(config.effective_base_url(), "http://10.0.0.5:11434");

        let config = BackendConfig::for_kind(BackendKind::OpenAi);
        assert_eq!(config.effective_base_url(), "https://api.openai.com/v1");
    }
}
