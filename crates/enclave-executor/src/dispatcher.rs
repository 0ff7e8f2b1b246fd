//! Single entry point for plugin execution.

use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use enclave_core::Params;

use crate::error::{ExecError, ExecResult};
use crate::loader::PluginLoader;
use crate::result::ExecutionResult;
use crate::sandbox::{SandboxLimits, SandboxRunner};

/// Trust regime for one invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Run inside a container.
    #[default]
    Isolated,
    /// Run in-process. Host privilege; operator-vetted artifacts only.
    Trusted,
}

impl ExecutionMode {
    /// `Isolated` when `secure` is set, `Trusted` otherwise.
    #[must_use]
    pub fn from_secure(secure: bool) -> Self {
        if secure { Self::Isolated } else { Self::Trusted }
    }
}

/// Routes invocations to the sandbox runner or the trusted loader.
#[derive(Debug)]
pub struct Executor {
    runner: SandboxRunner,
    loader: PluginLoader,
    limits: SandboxLimits,
}

impl Executor {
    /// Create an executor. `limits` apply to every isolated run.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::InvalidLimits`] if `limits` cannot be enforced.
    pub fn new(
        runner: SandboxRunner,
        loader: PluginLoader,
        limits: SandboxLimits,
    ) -> ExecResult<Self> {
        limits.validate()?;
        Ok(Self {
            runner,
            loader,
            limits,
        })
    }

    /// Limits applied to isolated runs.
    #[must_use]
    pub fn limits(&self) -> &SandboxLimits {
        &self.limits
    }

    /// Execute `method` of `artifact` and normalize the outcome.
    ///
    /// Never fails: every error becomes an error [`ExecutionResult`].
    pub async fn execute(
        &self,
        artifact: &Path,
        method: &str,
        params: Params,
        mode: ExecutionMode,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        let started = Instant::now();
        let outcome = match mode {
            ExecutionMode::Isolated => {
                self.runner
                    .run(artifact, method, &params, &self.limits, cancel)
                    .await
            },
            // The blocking worker cannot be interrupted; cancellation only
            // stops waiting for it.
            ExecutionMode::Trusted => tokio::select! {
                biased;
                () = cancel.cancelled() => Err(ExecError::Cancelled),
                res = self.loader.load_and_invoke(artifact, method, params) => res,
            },
        };
        let elapsed = started.elapsed();

        match outcome {
            Ok(value) => {
                info!(
                    artifact = %artifact.display(),
                    method,
                    ?mode,
                    elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    "Plugin execution succeeded"
                );
                ExecutionResult::success(value, elapsed)
            },
            Err(e) => {
                warn!(
                    artifact = %artifact.display(),
                    method,
                    ?mode,
                    kind = %e.kind(),
                    error = %e,
                    "Plugin execution failed"
                );
                ExecutionResult::failure(&e, elapsed)
            },
        }
    }
}
