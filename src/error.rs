//! Error types for the catalog agent

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Error, Debug)]
pub enum AgentError {

    // =============================
    // Retrieval
    // =============================

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    EmbeddingDimensionMismatch { expected: usize, actual: usize },

    // =============================
    // Tools
    // =============================

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Duplicate tool name: {0}")]
    DuplicateTool(String),

    #[error("Invalid input for tool '{tool}': {reason}")]
    InvalidToolInput { tool: String, reason: String },

    #[error("Tool '{tool}' failed: {reason}")]
    ToolError { tool: String, reason: String },

    // =============================
    // Generation loop
    // =============================

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Invalid model response: {0}")]
    InvalidModelResponse(String),

    #[error("Tool-calling loop did not finish within {0} iterations")]
    LoopNonTermination(u32),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Query cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AgentError {
    /// Errors worth another attempt against the same upstream.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AgentError::UpstreamUnavailable(_) | AgentError::Timeout(_))
    }

    pub(crate) fn invalid_tool_input(tool: &str, reason: impl ToString) -> Self {
        AgentError::InvalidToolInput {
            tool: tool.to_string(),
            reason: reason.to_string(),
        }
    }
}
