//! Assistant definitions and their JSON store
//!
//! An assistant is a named system prompt with an optional knowledge-base
//! text. Definitions live in a pretty-printed JSON file, one file per user,
//! and can be exported and re-imported as single-assistant JSON documents.

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AtelierError, Result};

/// Knowledge-base text is capped on ingest
pub const KNOWLEDGE_BASE_LIMIT: usize = 5000;

/// Whether an assistant is ready to chat with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssistantStatus {
    #[default]
    Active,
    Draft,
}

impl std::fmt::Display for AssistantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "Active"),
            Self::Draft => write!(f, "Draft"),
        }
    }
}

/// A configured assistant
///
/// Imported documents may omit `id`, `status`, and `created_at`; those fill
/// with fresh defaults. Name, description, and system prompt are required and
/// checked by [`validate`](Self::validate).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assistant {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,

    pub name: String,

    #[serde(default)]
    pub description: String,

    pub system_prompt: String,

    /// Reference text appended to the system prompt at chat time
    #[serde(default)]
    pub knowledge_base: String,

    #[serde(default)]
    pub status: AssistantStatus,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Assistant {
    /// Create a new active assistant
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: description.into(),
            system_prompt: system_prompt.into(),
            knowledge_base: String::new(),
            status: AssistantStatus::Active,
            created_at: Utc::now(),
        }
    }

    /// Attach knowledge-base text, capped at [`KNOWLEDGE_BASE_LIMIT`]
    #[must_use]
    pub fn with_knowledge_base(mut self, text: impl Into<String>) -> Self {
        self.knowledge_base = cap_knowledge_base(text.into());
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: AssistantStatus) -> Self {
        self.status = status;
        self
    }

    /// The system prompt sent to a backend, with the knowledge base appended
    #[must_use]
    pub fn full_system_prompt(&self) -> String {
        if self.knowledge_base.is_empty() {
            self.system_prompt.clone()
        } else {
            format!(
                "{}\n\n**Knowledge Base Context:**\n{}",
                self.system_prompt, self.knowledge_base
            )
        }
    }

    /// Check the required fields
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("name", &self.name),
            ("description", &self.description),
            ("system_prompt", &self.system_prompt),
        ] {
            if value.trim().is_empty() {
                return Err(AtelierError::InvalidAssistant(format!(
                    "missing required field: {field}"
                )));
            }
        }
        Ok(())
    }
}

fn cap_knowledge_base(mut text: String) -> String {
    if text.len() > KNOWLEDGE_BASE_LIMIT {
        let mut end = KNOWLEDGE_BASE_LIMIT;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}

/// JSON-file store of assistant definitions
#[derive(Debug, Clone)]
pub struct AssistantStore {
    path: PathBuf,
}

impl AssistantStore {
    /// Open a store at an explicit path
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Open the per-user store under `dir`
    ///
    /// `alice` maps to `alice_assistants.json`; no username maps to the
    /// shared `assistants.json`.
    #[must_use]
    pub fn for_user(dir: &Path, username: Option<&str>) -> Self {
        let file = match username.map(str::trim) {
            Some(user) if !user.is_empty() => format!("{}_assistants.json", user.to_lowercase()),
            _ => "assistants.json".to_string(),
        };
        Self::new(dir.join(file))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every assistant; a missing file is an empty store
    pub fn load(&self) -> Result<Vec<Assistant>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(&self.path)?;
        serde_json::from_str(&contents).map_err(|e| AtelierError::StoreParse {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }

    /// Save the full list, creating parent directories as needed
    pub fn save(&self, assistants: &[Assistant]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(assistants)?)?;
        Ok(())
    }

    /// Add a validated assistant; names are unique within a store
    pub fn add(&self, assistant: Assistant) -> Result<Assistant> {
        assistant.validate()?;

        let mut assistants = self.load()?;
        if assistants.iter().any(|a| a.name == assistant.name) {
            return Err(AtelierError::InvalidAssistant(format!(
                "an assistant named '{}' already exists",
                assistant.name
            )));
        }

        assistants.push(assistant.clone());
        self.save(&assistants)?;
        Ok(assistant)
    }

    /// Look an assistant up by name
    pub fn find(&self, name: &str) -> Result<Assistant> {
        self.load()?
            .into_iter()
            .find(|a| a.name == name)
            .ok_or_else(|| AtelierError::AssistantNotFound(name.to_string()))
    }

    /// Delete an assistant by name, returning the removed definition
    pub fn remove(&self, name: &str) -> Result<Assistant> {
        let mut assistants = self.load()?;
        let index = assistants
            .iter()
            .position(|a| a.name == name)
            .ok_or_else(|| AtelierError::AssistantNotFound(name.to_string()))?;

        let removed = assistants.remove(index);
        self.save(&assistants)?;
        Ok(removed)
    }

    /// Import a previously exported assistant document
    ///
    /// Missing id/status/created-at fill with defaults; missing name,
    /// description, or system prompt is rejected.
    pub fn import(&self, json: &str) -> Result<Assistant> {
        let assistant: Assistant = serde_json::from_str(json)
            .map_err(|e| AtelierError::InvalidAssistant(e.to_string()))?;

        let assistant = Assistant {
            knowledge_base: cap_knowledge_base(assistant.knowledge_base),
            ..assistant
        };
        self.add(assistant)
    }

    /// Export one assistant as a pretty JSON document
    pub fn export(&self, name: &str) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.find(name)?)?)
    }
}
