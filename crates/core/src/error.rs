//! Error types for the chatdesk domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

use crate::context::ContextError;

/// The top-level error type for all chatdesk operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Persistence errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Conversation context errors ---
    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    // --- Orchestration errors ---
    #[error("Orchestration exhausted after {iterations} model invocations without a final answer")]
    OrchestrationExhausted { iterations: u32 },

    #[error("Conversation {session_id} has already ended")]
    SessionAlreadyEnded { session_id: String },

    #[error("Model invocation timed out after {timeout_secs}s")]
    ModelTimeout { timeout_secs: u64 },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the caller should show this to the end user as a failed turn
    /// (as opposed to an infrastructure fault).
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            Error::OrchestrationExhausted { .. } | Error::SessionAlreadyEnded { .. }
        )
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response from provider: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Transient errors may succeed on retry; everything else is fatal.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::RateLimited { .. }
            | ProviderError::Timeout(_)
            | ProviderError::Network(_) => true,
            ProviderError::ApiError { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool already registered: {0}")]
    DuplicateToolName(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution failed: {tool_name} ({reason})")]
    ExecutionFailed { tool_name: String, reason: String },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Session record could not be decoded: {0}")]
    Serialization(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

/// A tool call was rejected before its handler ran.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Precondition failed: {reason}")]
pub struct PreconditionFailed {
    pub reason: String,
}

impl PreconditionFailed {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
