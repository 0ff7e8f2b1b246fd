//! Registry error types.

use enclave_core::{CoreError, PluginId, ToolId};
use enclave_executor::ExecError;

/// Errors from registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No plugin with this id.
    #[error("plugin not found: {0}")]
    PluginNotFound(PluginId),

    /// No tool with this id.
    #[error("tool not found: {0}")]
    ToolNotFound(ToolId),

    /// The caller lacks the required privilege.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Plugin names are unique.
    #[error("a plugin named '{0}' already exists")]
    PluginNameTaken(String),

    /// Tool names are unique.
    #[error("a tool named '{0}' already exists")]
    ToolNameTaken(String),

    /// A lifecycle transition is not allowed from the current state.
    #[error(transparent)]
    Lifecycle(#[from] CoreError),

    /// Core tools cannot be deleted.
    #[error("core tool {0} cannot be deleted")]
    CoreToolProtected(ToolId),

    /// The tool has no backing plugin to execute.
    #[error("tool {0} is not backed by a plugin")]
    NotPluginBacked(ToolId),

    /// The upload request is malformed.
    #[error("invalid upload: {0}")]
    InvalidUpload(String),

    /// The artifact exceeds the size ceiling.
    #[error("artifact too large: {size} bytes exceeds limit of {limit} bytes")]
    ArtifactTooLarge {
        /// Submitted size.
        size: u64,
        /// Configured ceiling.
        limit: u64,
    },

    /// Writing or removing an artifact failed.
    #[error("artifact storage error: {0}")]
    Artifact(#[from] std::io::Error),

    /// The metadata store failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// The execution engine could not be assembled.
    #[error("engine setup failed: {0}")]
    Engine(#[from] ExecError),
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
