//! Normalized execution results.

use std::time::Duration;

use enclave_core::ExecutionStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorKind, ExecError};

/// Success or failure of one invocation. Exactly one of the two is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    /// The plugin returned a value.
    Success {
        /// The decoded return value.
        result: Value,
    },
    /// The invocation failed.
    Error {
        /// Failure classification.
        kind: ErrorKind,
        /// Human-readable message.
        error: String,
    },
}

/// The outcome of one invocation plus its wall-clock duration.
///
/// Serializes as `{"status": "success", "result": ..., "elapsed_ms": n}` or
/// `{"status": "error", "kind": ..., "error": ..., "elapsed_ms": n}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// What happened.
    #[serde(flatten)]
    pub outcome: Outcome,
    /// How long it took, from dispatch to result.
    #[serde(rename = "elapsed_ms", with = "duration_ms")]
    pub elapsed: Duration,
}

impl ExecutionResult {
    /// A successful result.
    #[must_use]
    pub fn success(result: Value, elapsed: Duration) -> Self {
        Self {
            outcome: Outcome::Success { result },
            elapsed,
        }
    }

    /// A failed result built from `err`.
    #[must_use]
    pub fn failure(err: &ExecError, elapsed: Duration) -> Self {
        Self {
            outcome: Outcome::Error {
                kind: err.kind(),
                error: err.to_string(),
            },
            elapsed,
        }
    }

    /// A failure that was rejected before any work started.
    #[must_use]
    pub fn rejected(err: &ExecError) -> Self {
        Self::failure(err, Duration::ZERO)
    }

    /// Whether the invocation succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    /// The result value, if successful.
    #[must_use]
    pub fn result(&self) -> Option<&Value> {
        match &self.outcome {
            Outcome::Success { result } => Some(result),
            Outcome::Error { .. } => None,
        }
    }

    /// The error message, if failed.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Success { .. } => None,
            Outcome::Error { error, .. } => Some(error),
        }
    }

    /// The error kind, if failed.
    #[must_use]
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match &self.outcome {
            Outcome::Success { .. } => None,
            Outcome::Error { kind, .. } => Some(*kind),
        }
    }

    /// Status for the usage log.
    #[must_use]
    pub fn status(&self) -> ExecutionStatus {
        if self.is_success() {
            ExecutionStatus::Success
        } else {
            ExecutionStatus::Error
        }
    }

    /// Elapsed time in whole milliseconds, saturating.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX)
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
