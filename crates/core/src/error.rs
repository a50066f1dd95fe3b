//! Error types for the maitre domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all maitre operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Profile store errors ---
    #[error("Profile error: {0}")]
    Profile(#[from] ProfileError),

    // --- Knowledge provider errors ---
    #[error("Knowledge error: {0}")]
    Knowledge(#[from] KnowledgeError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// How a failed backend call should be treated by the retry wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// 429-equivalent.
    RateLimited,
    /// Connection refused/reset, DNS, or a timed-out attempt.
    Transport,
    /// 5xx-equivalent.
    Server,
    /// Anything else: bad credentials, unknown model, 4xx, malformed response.
    Fatal,
}

impl FailureKind {
    pub fn is_retryable(self) -> bool {
        !matches!(self, Self::Fatal)
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimited => write!(f, "rate_limited"),
            Self::Transport => write!(f, "transport"),
            Self::Server => write!(f, "server"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

impl ProviderError {
    /// Classify the failure from the variant and status code only.
    ///
    /// Response bodies are never inspected: generated text that merely
    /// mentions "503" must not be mistaken for an outage.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::RateLimited { .. } => FailureKind::RateLimited,
            Self::Network(_) | Self::Timeout(_) => FailureKind::Transport,
            Self::ApiError { status_code, .. } => match *status_code {
                429 => FailureKind::RateLimited,
                408 => FailureKind::Transport,
                500..=599 => FailureKind::Server,
                _ => FailureKind::Fatal,
            },
            Self::AuthenticationFailed(_)
            | Self::ModelNotFound(_)
            | Self::InvalidResponse(_)
            | Self::NotConfigured(_) => FailureKind::Fatal,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Invalid value for field '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("Knowledge source unavailable: {0}")]
    Unavailable(String),

    #[error("Knowledge lookup failed: {0}")]
    LookupFailed(String),
}
