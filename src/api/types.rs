//! API request and response types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request to start a new generation run.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRunRequest {
    /// Natural-language instructions for the server to build
    pub instructions: String,

    /// Optional model override (uses default if not specified)
    pub model: Option<String>,
}

/// Response after creating a run.
#[derive(Debug, Clone, Serialize)]
pub struct CreateRunResponse {
    /// Unique run identifier
    pub id: Uuid,

    /// Current run status
    pub status: RunStatus,
}

/// Run status enumeration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Accepted, not started yet
    Pending,
    /// Agent loop is running
    Running,
    /// Agent produced a final answer
    Completed,
    /// Agent loop stopped with an error
    Failed,
}

/// Full run state including results.
#[derive(Debug, Clone, Serialize)]
pub struct RunState {
    pub id: Uuid,

    pub status: RunStatus,

    /// Original instructions
    pub instructions: String,

    /// Model used for this run
    pub model: String,

    /// Number of iterations completed
    pub iterations: usize,

    /// Final answer or error message
    pub result: Option<String>,

    /// Detailed execution log
    pub log: Vec<TaskLogEntry>,

    /// Creation time (RFC 3339)
    pub created_at: String,
}

/// A single entry in the run's execution log.
#[derive(Debug, Clone, Serialize)]
pub struct TaskLogEntry {
    /// Timestamp (RFC 3339)
    pub timestamp: String,

    /// Entry type
    pub entry_type: LogEntryType,

    /// Content of the entry
    pub content: String,
}

impl TaskLogEntry {
    pub fn now(entry_type: LogEntryType, content: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            entry_type,
            content: content.into(),
        }
    }
}

/// Types of log entries.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogEntryType {
    /// Raw model output for a turn
    Thinking,
    /// Tool is being called
    ToolCall,
    /// Tool returned a result
    ToolResult,
    /// Agent produced final response
    Response,
    /// An error occurred
    Error,
}

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}
