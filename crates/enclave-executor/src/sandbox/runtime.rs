//! Container launch primitive.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::ExecResult;
use crate::sandbox::limits::SandboxLimits;

/// A bind mount into the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    /// Host directory.
    pub host_path: PathBuf,
    /// Mount point inside the container.
    pub container_path: String,
    /// Whether the mount is read-only.
    pub read_only: bool,
}

/// Everything needed to create one container.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSpec {
    /// Unique container name.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Command and arguments.
    pub command: Vec<String>,
    /// Working directory inside the container.
    pub workdir: String,
    /// Bind mounts.
    pub mounts: Vec<Mount>,
    /// Environment variables. Nothing is inherited from the host.
    pub env: Vec<(String, String)>,
    /// Labels for bookkeeping and orphan sweeps.
    pub labels: Vec<(String, String)>,
    /// Resource limits.
    pub limits: SandboxLimits,
}

/// Opaque reference to a created container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerHandle(String);

impl ContainerHandle {
    /// Wrap a runtime-assigned identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The runtime-assigned identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A container launch primitive.
///
/// Implementations must apply every field of [`ContainerSpec::limits`] and
/// must make [`remove`](Self::remove) forcibly terminate a running
/// container. All methods are called concurrently for different handles.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create (but do not start) a container.
    async fn create(&self, spec: &ContainerSpec) -> ExecResult<ContainerHandle>;

    /// Start the container with `input` as its entire standard input.
    /// Called at most once per container.
    async fn attach_stdin(&self, handle: &ContainerHandle, input: &[u8]) -> ExecResult<()>;

    /// Wait for the container to exit and return its exit code.
    async fn wait(&self, handle: &ContainerHandle) -> ExecResult<i64>;

    /// Read captured output, stopping after `max_bytes`.
    ///
    /// Implementations must not buffer more than `max_bytes` regardless of
    /// how much the container wrote.
    async fn logs(&self, handle: &ContainerHandle, max_bytes: usize) -> ExecResult<Vec<u8>>;

    /// Forcibly stop and remove the container. Removing an already removed
    /// container is not an error.
    async fn remove(&self, handle: &ContainerHandle) -> ExecResult<()>;
}
