//! Environment-backed runtime settings
//!
//! The binary calls `dotenv` once at startup, so a local `.env` file works
//! the same as exported variables:
//!
//! - `OLLAMA_HOST`: local server address (default `http://localhost:11434`)
//! - `DEFAULT_MODEL`: Ollama model when none is picked (default `llama3`)
//! - `ANTHROPIC_API_KEY` / `OPENAI_API_KEY` / `XAI_API_KEY`: hosted keys
//! - `ATELIER_TIMEOUT_SECS`: per-request bound (default 60)
//! - `ATELIER_DATA_DIR`: where assistant stores live (default platform data dir)

use std::{env, path::PathBuf, time::Duration};

use super::backends::{ApiKey, BackendConfig, BackendKind, DEFAULT_TIMEOUT};

/// Runtime settings assembled from the environment
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base URL of the local Ollama server
    pub ollama_host: String,

    /// Ollama model used when the caller does not pick one
    pub default_model: String,

    /// Anthropic API key, if configured
    pub anthropic_api_key: Option<ApiKey>,

    /// OpenAI API key, if configured
    pub openai_api_key: Option<ApiKey>,

    /// xAI API key, if configured
    pub xai_api_key: Option<ApiKey>,

    /// Bound on a single chat request
    pub timeout: Duration,

    /// Directory holding assistant store files
    pub data_dir: PathBuf,
}

impl Settings {
    /// Assemble settings from the process environment
    #[must_use]
    pub fn from_env() -> Self {
        let timeout = env::var("ATELIER_TIMEOUT_SECS")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .map_or(DEFAULT_TIMEOUT, Duration::from_secs);

        let data_dir = env::var("ATELIER_DATA_DIR").map_or_else(
            |_| {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("atelier")
            },
            PathBuf::from,
        );

        Self {
            ollama_host: env::var("OLLAMA_HOST")
                .unwrap_or_else(|_| BackendKind::Ollama.default_base_url().to_string()),
            default_model: env::var("DEFAULT_MODEL")
                .unwrap_or_else(|_| BackendKind::Ollama.default_model().to_string()),
            anthropic_api_key: read_key("ANTHROPIC_API_KEY"),
            openai_api_key: read_key("OPENAI_API_KEY"),
            xai_api_key: read_key("XAI_API_KEY"),
            timeout,
            data_dir,
        }
    }

    /// Get the configured API key for a backend kind, if any
    #[must_use]
    pub fn api_key_for(&self, kind: BackendKind) -> Option<&ApiKey> {
        match kind {
            BackendKind::Ollama => None,
            BackendKind::Anthropic => self.anthropic_api_key.as_ref(),
            BackendKind::OpenAi => self.openai_api_key.as_ref(),
            BackendKind::Xai => self.xai_api_key.as_ref(),
        }
    }

    /// Build a per-call backend config for `kind`
    ///
    /// The credential is cloned into the config by value; the adapter never
    /// reaches back into settings.
    #[must_use]
    pub fn backend_config(&self, kind: BackendKind, model: Option<String>) -> BackendConfig {
        let model = model.unwrap_or_else(|| match kind {
            BackendKind::Ollama => self.default_model.clone(),
            _ => kind.default_model().to_string(),
        });

        let mut config = BackendConfig::new(kind, model).with_timeout(self.timeout);

        if kind == BackendKind::Ollama {
            config = config.with_base_url(self.ollama_host.clone());
        }
        if let Some(key) = self.api_key_for(kind) {
            config = config.with_api_key(key.clone());
        }

        config
    }
}

fn read_key(name: &str) -> Option<ApiKey> {
    env::var(name)
        .ok()
        .filter(|key| !key.trim().is_empty())
        .map(ApiKey::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn bare_settings() -> Settings {
        Settings {
            ollama_host: "http://localhost:11434".to_string(),
            default_model: "llama3".to_string(),
            anthropic_api_key: None,
            openai_api_key: Some(ApiKey::new("sk-test")),
            xai_api_key: None,
            timeout: Duration::from_secs(30),
            data_dir: PathBuf::from("/tmp/atelier"),
        }
    }

    #[test]
    fn test_api_key_lookup_per_kind() {
        let settings = bare_settings();
        assert!(settings.api_key_for(BackendKind::Ollama).is_none());
        assert!(settings.api_key_for(BackendKind::Anthropic).is_none());
        assert!(settings.api_key_for(BackendKind::OpenAi).is_some());
    }

    #[test]
    fn test_backend_config_defaults() {
        let settings = bare_settings();

        let config = settings.backend_config(BackendKind::Ollama, None);
        assert_eq!(config.model, "llama3");
        assert_eq!(config.effective_base_url(), "http://localhost:11434");
        assert!(config.api_key.is_none());
        assert_eq!(config.timeout, Duration::from_secs(30));

        let config = settings.backend_config(BackendKind::OpenAi, Some("gpt-4o".to_string()));
        assert_eq!(config.model, "gpt-4o");
        assert!(config.api_key.is_some());
    }
}
