//! Usage log entry written after each plugin execution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ExecutionId, PluginId, ToolId, UserId};

/// Final status of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// The plugin returned a result.
    Success,
    /// The invocation failed.
    Error,
}

/// A persisted record of one plugin invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLog {
    /// Unique identifier.
    pub id: ExecutionId,
    /// The plugin that was executed.
    pub plugin_id: PluginId,
    /// The tool the call came through, if any.
    pub tool_id: Option<ToolId>,
    /// The caller.
    pub user_id: UserId,
    /// Method that was invoked.
    pub method: String,
    /// Serialized parameters.
    pub input: String,
    /// Serialized result or error message.
    pub output: String,
    /// Final status.
    pub status: ExecutionStatus,
    /// Wall-clock duration in milliseconds.
    pub elapsed_ms: u64,
    /// When the log was written.
    pub created_at: DateTime<Utc>,
}
