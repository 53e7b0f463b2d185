//! Error types for Convoy.

pub mod quota;

pub use quota::{enrich_error_message, is_quota_error};

use thiserror::Error;

/// Primary error type for all Convoy operations.
#[derive(Error, Debug)]
pub enum ConvoyError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("Rate limited: retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    /// Transport-level malformed response; the same prompt may be re-requested.
    #[error("Invalid stream: {0}")]
    InvalidStream(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Provider error: {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Operation canceled")]
    Canceled,

    #[error("IPC error: {0}")]
    Ipc(String),

    #[error("No worker for conversation {0}")]
    WorkerNotFound(String),
}

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    Quota,
    RateLimit,
    Transport,
    Cancellation,
    Configuration,
    Serialization,
    ToolExecution,
    Unknown,
}

/// Suggested recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    RetrySameRequest,
    RotateApiKey,
    CheckCredentials,
    CheckConfiguration,
    CheckToolImplementation,
    None,
}

impl ConvoyError {
    /// Shorthand for a tool execution failure.
    pub fn tool(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Authentication(_) => ErrorCategory::Authentication,
            Self::QuotaExhausted(_) => ErrorCategory::Quota,
            Self::RateLimited { .. } => ErrorCategory::RateLimit,
            Self::InvalidStream(_) | Self::Stream(_) | Self::Io(_) | Self::Ipc(_) => {
                ErrorCategory::Transport
            }
            Self::Canceled => ErrorCategory::Cancellation,
            Self::Configuration(_) | Self::WorkerNotFound(_) => ErrorCategory::Configuration,
            Self::Serialization(_) | Self::Toml(_) => ErrorCategory::Serialization,
            Self::ToolExecution { .. } | Self::ToolNotFound(_) | Self::InvalidArgument(_) => {
                ErrorCategory::ToolExecution
            }
            Self::Provider { message, .. } if is_quota_error(message) => ErrorCategory::Quota,
            _ => ErrorCategory::Unknown,
        }
    }

    /// Whether this is the transport signal that warrants a fresh stream for the same prompt.
    pub fn is_invalid_stream(&self) -> bool {
        matches!(self, Self::InvalidStream(_))
    }

    /// Whether this error is potentially retryable.
    ///
    /// Cancellation is never retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::RateLimit | ErrorCategory::Quota
        ) || self.is_invalid_stream()
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        if self.is_invalid_stream() {
            return RecoverySuggestion::RetrySameRequest;
        }
        match self.category() {
            ErrorCategory::Authentication => RecoverySuggestion::CheckCredentials,
            ErrorCategory::Quota | ErrorCategory::RateLimit => RecoverySuggestion::RotateApiKey,
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            ErrorCategory::ToolExecution => RecoverySuggestion::CheckToolImplementation,
            _ => RecoverySuggestion::None,
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for ConvoyError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::InvalidState(format!("lock poisoned: {err}"))
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ConvoyError>;
