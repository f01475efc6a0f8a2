//! Error types for Maestro.

use thiserror::Error;

/// Primary error type for all Maestro operations.
#[derive(Error, Debug)]
pub enum MaestroError {
    /// Required provider credential (or other static configuration) is
    /// missing for the requested model. Raised before streaming begins.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Any failure before the first stream event was emitted.
    #[error("Stream setup failed: {0}")]
    StreamSetup(String),

    #[error("Gateway error (status {status}): {message}")]
    Gateway { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored turn that could not be decoded. Loaders skip these; the
    /// variant exists for the decode helpers themselves.
    #[error("History decode error: {0}")]
    HistoryDecode(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Tool execution error in '{tool_name}': {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Coarse error categories used for reporting and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    StreamSetup,
    Gateway,
    Network,
    Serialization,
    HistoryDecode,
    Persistence,
    ToolExecution,
    Unknown,
}

impl MaestroError {
    /// Create a gateway error from an HTTP status and body.
    pub fn gateway(status: u16, message: impl Into<String>) -> Self {
        Self::Gateway {
            status,
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::StreamSetup(_) => ErrorCategory::StreamSetup,
            Self::Gateway { .. } => ErrorCategory::Gateway,
            Self::Network(_) => ErrorCategory::Network,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::HistoryDecode(_) => ErrorCategory::HistoryDecode,
            Self::Persistence(_) => ErrorCategory::Persistence,
            Self::ToolExecution { .. } => ErrorCategory::ToolExecution,
            _ => ErrorCategory::Unknown,
        }
    }

    /// Whether this error is potentially retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Gateway { status, .. } => matches!(status, 429 | 500..=599),
            _ => false,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, MaestroError>;
