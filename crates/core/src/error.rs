//! Error types for the Switchboard domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The top-level error type for all Switchboard operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Pre-turn validation ---
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A programming invariant of the turn engine was violated.
    #[error("Invariant violated: {0}")]
    Invariant(String),

    /// A turn failed after escalation (or could not be escalated).
    #[error("Turn failed: {0}")]
    TurnFailed(String),
}

impl Error {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// How a failure is handled by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// Stop immediately and surface the error to the caller.
    Fatal,
    /// Retry once through the escalation agent before surfacing.
    Escalate,
}

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed completion: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

/// Pre-turn validation failures.
///
/// Every variant except [`ValidationError::MaxOverallTurns`] is fatal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} must be a list of records")]
    NotASequence { field: &'static str },

    #[error("No agent configs provided")]
    NoAgents,

    #[error("Found {count} agents with role '{role}', at most one is allowed")]
    DuplicateRole { role: String, count: usize },

    #[error("{kind} config {label} is missing required key(s): {}", .missing.join(", "))]
    MissingKeys {
        kind: &'static str,
        label: String,
        missing: Vec<&'static str>,
    },

    #[error("{kind} config {label} is malformed: {reason}")]
    Malformed {
        kind: &'static str,
        label: String,
        reason: String,
    },

    #[error("Duplicate agent name: {0}")]
    DuplicateAgent(String),

    #[error("Start agent '{0}' is not among the agent configs")]
    UnknownStartAgent(String),

    #[error("Cycle detected in connected agents: {}", format_cycle(.path))]
    Cycle { path: Vec<String> },

    #[error("Max overall turns reached ({limit})")]
    MaxOverallTurns { limit: usize },
}

impl ValidationError {
    pub fn error_type(&self) -> ErrorType {
        match self {
            Self::MaxOverallTurns { .. } => ErrorType::Escalate,
            _ => ErrorType::Fatal,
        }
    }
}

fn format_cycle(path: &[String]) -> String {
    match path.first() {
        Some(first) => format!("{} -> {first}", path.join(" -> ")),
        None => String::new(),
    }
}
