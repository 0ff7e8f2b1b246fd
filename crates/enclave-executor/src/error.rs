//! Execution error taxonomy.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use enclave_core::{PluginId, PluginState};
use serde::{Deserialize, Serialize};

/// Errors from plugin execution.
///
/// Every variant surfaces to callers as an error outcome inside an
/// [`ExecutionResult`](crate::ExecutionResult); the dispatcher never lets one
/// escape as an `Err`.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// The artifact does not exist at the recorded path.
    #[error("artifact not found: {}", path.display())]
    ArtifactNotFound {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// The artifact exists but could not be read.
    #[error("failed to read artifact {}: {source}", path.display())]
    ArtifactUnreadable {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The artifact has no usable entry point, or the method is absent.
    #[error("entry point missing: {0}")]
    EntryPointMissing(String),

    /// The plugin reported its own failure. The message is the plugin's.
    #[error("{0}")]
    PluginRaised(String),

    /// The plugin process exited abnormally without a decodable response.
    #[error("plugin crashed with exit code {exit_code}: {detail}")]
    PluginCrashed {
        /// Exit code reported by the container runtime.
        exit_code: i64,
        /// Tail of the captured output, or a diagnosis.
        detail: String,
    },

    /// The deadline elapsed before the plugin completed.
    #[error("plugin timed out after {}ms", timeout.as_millis())]
    PluginTimeout {
        /// The configured deadline.
        timeout: Duration,
    },

    /// The caller cancelled the invocation.
    #[error("execution cancelled")]
    Cancelled,

    /// Captured output exceeded the configured ceiling.
    #[error("plugin output too large: {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge {
        /// Observed size (at least `limit + 1`; reading stops there).
        size: usize,
        /// Configured ceiling.
        limit: usize,
    },

    /// Output did not contain a well-formed response envelope.
    #[error("malformed plugin output: {0}")]
    MalformedOutput(String),

    /// The plugin is not in an executable lifecycle state.
    #[error(
        "plugin {plugin_id} is not executable in state '{state}': it must be approved and active"
    )]
    LifecycleViolation {
        /// The rejected plugin.
        plugin_id: PluginId,
        /// Its current state.
        state: PluginState,
    },

    /// Trusted load or invocation failed; carries the artifact for diagnosis.
    #[error("plugin execution failed for {}: {source}", artifact.display())]
    PluginExecutionFailed {
        /// The artifact being loaded.
        artifact: PathBuf,
        /// The underlying cause.
        #[source]
        source: Box<ExecError>,
    },

    /// A trusted-mode artifact lives outside the trusted directory.
    #[error("artifact {} is outside the trusted plugin directory", path.display())]
    UntrustedArtifact {
        /// The rejected path.
        path: PathBuf,
    },

    /// Sandbox limits are unusable.
    #[error("invalid sandbox limits: {0}")]
    InvalidLimits(String),

    /// Preparing or removing the staging area failed.
    #[error("staging error: {0}")]
    Staging(#[source] std::io::Error),

    /// The container runtime failed.
    #[error("container runtime error: {0}")]
    Runtime(String),

    /// Encoding the request envelope failed.
    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result type for execution operations.
pub type ExecResult<T> = Result<T, ExecError>;

/// Flat classification of an [`ExecError`], stable across serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`ExecError::ArtifactNotFound`].
    ArtifactNotFound,
    /// See [`ExecError::EntryPointMissing`].
    EntryPointMissing,
    /// See [`ExecError::PluginRaised`].
    PluginRaised,
    /// See [`ExecError::PluginCrashed`].
    PluginCrashed,
    /// Deadline elapsed or the caller cancelled.
    PluginTimeout,
    /// See [`ExecError::PayloadTooLarge`].
    PayloadTooLarge,
    /// See [`ExecError::MalformedOutput`].
    MalformedOutput,
    /// See [`ExecError::LifecycleViolation`].
    LifecycleViolation,
    /// See [`ExecError::UntrustedArtifact`].
    UntrustedArtifact,
    /// Host-side failure: staging, runtime, limits or encoding.
    Engine,
}

impl ErrorKind {
    /// Snake-case name of the kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ArtifactNotFound => "artifact_not_found",
            Self::EntryPointMissing => "entry_point_missing",
            Self::PluginRaised => "plugin_raised",
            Self::PluginCrashed => "plugin_crashed",
            Self::PluginTimeout => "plugin_timeout",
            Self::PayloadTooLarge => "payload_too_large",
            Self::MalformedOutput => "malformed_output",
            Self::LifecycleViolation => "lifecycle_violation",
            Self::UntrustedArtifact => "untrusted_artifact",
            Self::Engine => "engine",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ExecError {
    /// Classify this error. Wrapped trusted-mode failures report the kind of
    /// their cause.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ArtifactNotFound { .. } | Self::ArtifactUnreadable { .. } => {
                ErrorKind::ArtifactNotFound
            },
            Self::EntryPointMissing(_) => ErrorKind::EntryPointMissing,
            Self::PluginRaised(_) => ErrorKind::PluginRaised,
            Self::PluginCrashed { .. } => ErrorKind::PluginCrashed,
            Self::PluginTimeout { .. } | Self::Cancelled => ErrorKind::PluginTimeout,
            Self::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
            Self::MalformedOutput(_) => ErrorKind::MalformedOutput,
            Self::LifecycleViolation { .. } => ErrorKind::LifecycleViolation,
            Self::PluginExecutionFailed { source, .. } => source.kind(),
            Self::UntrustedArtifact { .. } => ErrorKind::UntrustedArtifact,
            Self::InvalidLimits(_) | Self::Staging(_) | Self::Runtime(_) | Self::Encode(_) => {
                ErrorKind::Engine
            },
        }
    }

    /// Whether the failure originated in plugin code rather than the host.
    #[must_use]
    pub fn is_plugin_fault(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::PluginRaised
                | ErrorKind::PluginCrashed
                | ErrorKind::PluginTimeout
                | ErrorKind::PayloadTooLarge
                | ErrorKind::MalformedOutput
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raised_message_is_verbatim() {
        let err = ExecError::PluginRaised("bad input".into());
        assert_eq!(err.to_string(), "bad input");
        assert_eq!(err.kind(), ErrorKind::PluginRaised);
    }

    #[test]
    fn wrapped_failure_keeps_cause_kind_and_artifact() {
        let err = ExecError::PluginExecutionFailed {
            artifact: PathBuf::from("/trusted/echo.toml"),
            source: Box::new(ExecError::EntryPointMissing("method 'nope' not found".into())),
        };
        assert_eq!(err.kind(), ErrorKind::EntryPointMissing);
        let msg = err.to_string();
        assert!(msg.contains("/trusted/echo.toml"));
        assert!(msg.contains("nope"));
    }

    #[test]
    fn cancellation_is_reported_as_timeout() {
        assert_eq!(ExecError::Cancelled.kind(), ErrorKind::PluginTimeout);
    }

    #[test]
    fn payload_message_names_size_and_limit() {
        let err = ExecError::PayloadTooLarge {
            size: 1_048_577,
            limit: 1_048_576,
        };
        let msg = err.to_string();
        assert!(msg.contains("1048577"));
        assert!(msg.contains("1048576"));
        assert!(err.is_plugin_fault());
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::PayloadTooLarge).unwrap();
        assert_eq!(json, "\"payload_too_large\"");
        assert_eq!(ErrorKind::LifecycleViolation.to_string(), "lifecycle_violation");
    }
}
