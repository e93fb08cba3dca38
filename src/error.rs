//! Error types for Atelier

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using [`AtelierError`]
pub type Result<T> = std::result::Result<T, AtelierError>;

/// Main error type for Atelier
///
/// Backend failures are classified into distinct categories so callers can
/// render a useful message instead of a raw transport error: a missing key,
/// an unreachable server, a rejected key, a rate limit, an unparseable
/// response body, and everything else the provider reports.
#[derive(Debug, Error)]
pub enum AtelierError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Assistant store could not be parsed
    #[error("Failed to parse assistant store at {}: {message}", .path.display())]
    StoreParse { path: PathBuf, message: String },

    /// Configuration validation error
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Hosted backend selected without an API key
    #[error("No API key configured for {backend}")]
    MissingCredential { backend: String },

    /// Network-layer failure: timeout, DNS, connection refused
    #[error("{backend} is unreachable: {message}")]
    BackendUnavailable { backend: String, message: String },

    /// Provider rejected the API key (HTTP 401/403)
    #[error("{backend} rejected the API key")]
    AuthenticationFailed { backend: String },

    /// Provider signalled quota or rate exceeded (HTTP 429)
    #[error("{backend} rate limit exceeded, try again later")]
    RateLimited { backend: String },

    /// Response body did not match the provider's documented schema
    #[error("Unexpected {backend} response: missing {field}")]
    MalformedResponse { backend: String, field: String },

    /// Provider returned a well-formed error for any other reason
    #[error("{backend} error: {message}")]
    ProviderError { backend: String, message: String },

    /// Assistant not found in the store
    #[error("Assistant not found: {0}")]
    AssistantNotFound(String),

    /// Assistant definition failed validation
    #[error("Invalid assistant definition: {0}")]
    InvalidAssistant(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_errors_name_the_backend() {
        let err = AtelierError::MissingCredential {
            backend: "anthropic".to_string(),
        };
        assert_eq!(err.to_string(), "No API key configured for anthropic");

        let err = AtelierError::MalformedResponse {
            backend: "openai".to_string(),
            field: "choices[0].message.content".to_string(),
        };
        assert!(err.to_string().contains("openai"));
        assert!(err.to_string().contains("choices[0].message.content"));
    }
}
