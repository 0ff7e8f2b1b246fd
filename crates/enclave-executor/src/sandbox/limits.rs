//! Resource limits for isolated execution.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::codec::DEFAULT_MAX_PAYLOAD_BYTES;
use crate::error::{ExecError, ExecResult};

/// Default memory ceiling: 256 MiB.
pub const DEFAULT_MEMORY_BYTES: u64 = 256 * 1024 * 1024;

/// Default wall-clock deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default captured-output ceiling.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = DEFAULT_MAX_PAYLOAD_BYTES;

/// Network access granted to the container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkPolicy {
    /// No network interfaces beyond loopback.
    #[default]
    Disabled,
    /// Attach to a named, operator-provisioned network.
    Named(String),
}

impl NetworkPolicy {
    /// Whether the container gets no network.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        matches!(self, Self::Disabled)
    }
}

/// Limits applied to one isolated run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxLimits {
    /// Memory ceiling in bytes. Swap is capped to the same value.
    pub memory_bytes: u64,
    /// Wall-clock deadline. Must be non-zero.
    pub timeout: Duration,
    /// Network access.
    pub network: NetworkPolicy,
    /// CPU quota in cores (e.g. `0.5`), if limited.
    pub cpu_quota: Option<f64>,
    /// Maximum number of processes, if limited.
    pub pids_limit: Option<u32>,
    /// Ceiling on captured output.
    pub max_output_bytes: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            memory_bytes: DEFAULT_MEMORY_BYTES,
            timeout: DEFAULT_TIMEOUT,
            network: NetworkPolicy::Disabled,
            cpu_quota: None,
            pids_limit: None,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

impl SandboxLimits {
    /// Default limits with the given deadline.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::InvalidLimits`] if `timeout` is zero.
    pub fn new(timeout: Duration) -> ExecResult<Self> {
        let limits = Self {
            timeout,
            ..Self::default()
        };
        limits.validate()?;
        Ok(limits)
    }

    /// Set the memory ceiling.
    #[must_use]
    pub fn with_memory_bytes(mut self, bytes: u64) -> Self {
        self.memory_bytes = bytes;
        self
    }

    /// Set the deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the network policy.
    #[must_use]
    pub fn with_network(mut self, network: NetworkPolicy) -> Self {
        self.network = network;
        self
    }

    /// Set the CPU quota.
    #[must_use]
    pub fn with_cpu_quota(mut self, cores: f64) -> Self {
        self.cpu_quota = Some(cores);
        self
    }

    /// Set the process limit.
    #[must_use]
    pub fn with_pids_limit(mut self, pids: u32) -> Self {
        self.pids_limit = Some(pids);
        self
    }

    /// Set the output ceiling.
    #[must_use]
    pub fn with_max_output_bytes(mut self, bytes: usize) -> Self {
        self.max_output_bytes = bytes;
        self
    }

    /// Check that the limits can be enforced.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::InvalidLimits`] for a zero deadline, zero memory,
    /// zero output ceiling, or a non-positive CPU quota.
    pub fn validate(&self) -> ExecResult<()> {
        if self.timeout.is_zero() {
            return Err(ExecError::InvalidLimits(
                "timeout must be greater than zero".into(),
            ));
        }
        if self.memory_bytes == 0 {
            return Err(ExecError::InvalidLimits(
                "memory limit must be greater than zero".into(),
            ));
        }
        if self.max_output_bytes == 0 {
            return Err(ExecError::InvalidLimits(
                "output limit must be greater than zero".into(),
            ));
        }
        if let Some(cpu) = self.cpu_quota.filter(|c| !c.is_finite() || *c <= 0.0) {
            return Err(ExecError::InvalidLimits(format!(
                "cpu quota must be positive, got {cpu}"
            )));
        }
        if self.pids_limit == Some(0) {
            return Err(ExecError::InvalidLimits(
                "pids limit must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let l = SandboxLimits::default();
        assert_eq!(l.memory_bytes, 256 * 1024 * 1024);
        assert!(l.network.is_disabled());
        assert_eq!(l.timeout, Duration::from_secs(30));
        l.validate().unwrap();
    }

    #[test]
    fn zero_timeout_rejected() {
        assert!(matches!(
            SandboxLimits::new(Duration::ZERO),
            Err(ExecError::InvalidLimits(_))
        ));
    }

    #[test]
    fn bad_cpu_quota_rejected() {
        let l = SandboxLimits::default().with_cpu_quota(f64::NAN);
        assert!(l.validate().is_err());
        let l = SandboxLimits::default().with_cpu_quota(-1.0);
        assert!(l.validate().is_err());
        let l = SandboxLimits::default().with_cpu_quota(0.5);
        assert!(l.validate().is_ok());
    }
}
