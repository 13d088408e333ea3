//! Error types for the screening core.

use std::time::Duration;

use crate::screening::Phase;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Shared state error: {0}")]
    Store(#[from] StoreError),

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("State error: {0}")]
    State(#[from] StateError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Provider {provider} unavailable: {reason}")]
    Unavailable { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<LlmError> },
}

impl LlmError {
    /// Whether the failure is worth retrying (rate limit, capacity, 5xx).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Unavailable { .. })
    }

    /// Classify a raw provider error message.
    ///
    /// Providers surface status codes only inside their error text, so
    /// this matches on the markers they are known to use.
    pub fn from_provider_message(provider: &str, message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("429") || lower.contains("rate limit") || lower.contains("rate_limit") {
            return Self::RateLimited {
                provider: provider.to_string(),
                retry_after: None,
            };
        }
        let unavailable = ["500", "502", "503", "504", "capacity", "overloaded", "internal_server_error"];
        if unavailable.iter().any(|m| lower.contains(m)) {
            return Self::Unavailable {
                provider: provider.to_string(),
                reason: message.to_string(),
            };
        }
        if lower.contains("401") || lower.contains("unauthorized") || lower.contains("invalid x-api-key") {
            return Self::AuthFailed {
                provider: provider.to_string(),
            };
        }
        Self::RequestFailed {
            provider: provider.to_string(),
            reason: message.to_string(),
        }
    }
}

/// Shared-state document errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to acquire {kind} lock on {path}: {source}")]
    Lock {
        kind: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt shared state document: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Background store task failed: {0}")]
    Join(String),
}

/// Emotion / risk classifier errors.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("Classifier {name} unavailable: {reason}")]
    Unavailable { name: String, reason: String },

    #[error("Classifier {name} failed: {reason}")]
    Failed { name: String, reason: String },
}

/// Structured-output parsing errors.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("No structured block found in model output")]
    NoStructuredBlock,

    #[error("Malformed structured block: {0}")]
    Malformed(String),
}

/// Conversation state reducer errors.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Handler {writer} may not write field {field}")]
    OwnershipViolation {
        writer: &'static str,
        field: &'static str,
    },

    #[error("Score {0} is outside the 0-3 scale")]
    ScoreOutOfRange(i64),

    #[error("Question index {0} is outside the questionnaire")]
    QuestionOutOfRange(usize),

    #[error("Question {0} already has a recorded response")]
    DuplicateResponse(usize),

    #[error("Question index cannot move back from {from} to {to}")]
    IndexRegression { from: usize, to: usize },

    #[error("Field {0} is already set")]
    AlreadySet(&'static str),

    #[error("Invalid phase transition from {from} to {to}")]
    InvalidTransition { from: Phase, to: Phase },
}
