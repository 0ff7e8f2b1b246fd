//! Isolated invocation of one plugin method.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use enclave_core::Params;

use crate::codec::{WireCodec, WireResponse};
use crate::error::{ExecError, ExecResult};
use crate::sandbox::docker::MANAGED_LABEL;
use crate::sandbox::guard::ContainerGuard;
use crate::sandbox::limits::SandboxLimits;
use crate::sandbox::runtime::{ContainerRuntime, ContainerSpec, Mount};
use crate::sandbox::staging::{LAUNCHER_FILE_NAME, STAGING_PREFIX, StagingArea};

/// Mount point of the staging area inside the container.
const APP_DIR: &str = "/app";

/// Exit code of a process killed by SIGKILL, which is how the kernel
/// enforces the memory ceiling.
const SIGKILL_EXIT_CODE: i64 = 137;

/// How much trailing output a crash report quotes.
const CRASH_TAIL_BYTES: usize = 512;

/// Image and interpreter used for isolated runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Container image.
    pub image: String,
    /// Interpreter command that runs the launcher.
    pub interpreter: Vec<String>,
    /// Parent directory for staging areas; system temp if `None`.
    pub staging_root: Option<PathBuf>,
    /// Environment passed to the container.
    pub env: Vec<(String, String)>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            image: "python:3.11-slim".to_string(),
            interpreter: vec!["python".to_string()],
            staging_root: None,
            env: vec![
                ("PYTHONDONTWRITEBYTECODE".to_string(), "1".to_string()),
                ("PYTHONUNBUFFERED".to_string(), "1".to_string()),
            ],
        }
    }
}

/// Runs plugin methods in single-use containers.
///
/// Holds no per-invocation state; any number of runs may proceed
/// concurrently, each with its own container and staging area.
pub struct SandboxRunner {
    runtime: Arc<dyn ContainerRuntime>,
    config: RunnerConfig,
}

impl std::fmt::Debug for SandboxRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxRunner")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SandboxRunner {
    /// Create a runner over `runtime`.
    #[must_use]
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: RunnerConfig) -> Self {
        Self { runtime, config }
    }

    /// Runner configuration.
    #[must_use]
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run `method` of `artifact` with `params` under `limits`.
    ///
    /// The deadline and `cancel` cover every step: staging, container
    /// creation, the run itself and output collection. The container and
    /// staging area are removed before this returns, whatever the outcome.
    /// If the returned future is dropped, removal still happens in the
    /// background.
    ///
    /// # Errors
    ///
    /// - [`ExecError::InvalidLimits`] before anything is staged
    /// - [`ExecError::ArtifactNotFound`] if the artifact is missing
    /// - [`ExecError::PluginTimeout`] when the deadline elapses
    /// - [`ExecError::Cancelled`] when `cancel` fires
    /// - [`ExecError::PayloadTooLarge`], [`ExecError::MalformedOutput`],
    ///   [`ExecError::PluginRaised`], [`ExecError::PluginCrashed`] from the
    ///   captured output
    /// - [`ExecError::Staging`] / [`ExecError::Runtime`] for host failures
    pub async fn run(
        &self,
        artifact: &Path,
        method: &str,
        params: &Params,
        limits: &SandboxLimits,
        cancel: &CancellationToken,
    ) -> ExecResult<Value> {
        limits.validate()?;
        let deadline = Instant::now()
            .checked_add(limits.timeout)
            .ok_or_else(|| ExecError::InvalidLimits("timeout is out of range".into()))?;
        let codec = WireCodec::new(limits.max_output_bytes);
        let request = codec.encode_request(method, params)?;

        // Abandoning launch mid-way drops the staging area and any guard.
        let (staging, guard) =
            bounded(self.launch(artifact, limits), deadline, limits, cancel).await?;
        debug!(
            container = %guard.handle(),
            artifact = %artifact.display(),
            method,
            "Running plugin in sandbox"
        );

        let captured =
            bounded(self.drive(&guard, &request, limits), deadline, limits, cancel).await;

        if let Err(e) = guard.release().await {
            warn!(error = %e, "Failed to remove sandbox container");
        }
        close_staging(staging);

        let (exit_code, output) = captured?;
        interpret(&codec, exit_code, &output)
    }

    async fn launch(
        &self,
        artifact: &Path,
        limits: &SandboxLimits,
    ) -> ExecResult<(StagingArea, ContainerGuard)> {
        let staging = StagingArea::prepare(self.config.staging_root.as_deref(), artifact).await?;
        let spec = self.container_spec(&staging, limits);
        match ContainerGuard::create(Arc::clone(&self.runtime), &spec).await {
            Ok(guard) => Ok((staging, guard)),
            Err(e) => {
                close_staging(staging);
                Err(e)
            },
        }
    }

    async fn drive(
        &self,
        guard: &ContainerGuard,
        request: &[u8],
        limits: &SandboxLimits,
    ) -> ExecResult<(i64, Vec<u8>)> {
        let handle = guard.handle();
        self.runtime.attach_stdin(handle, request).await?;
        let exit_code = self.runtime.wait(handle).await?;

        // One byte past the ceiling is enough to detect an overflow.
        let output = self
            .runtime
            .logs(handle, limits.max_output_bytes.saturating_add(1))
            .await?;
        debug!(container = %handle, exit_code, bytes = output.len(), "Sandbox run finished");
        Ok((exit_code, output))
    }

    fn container_spec(&self, staging: &StagingArea, limits: &SandboxLimits) -> ContainerSpec {
        let mut command = self.config.interpreter.clone();
        command.push(format!("{APP_DIR}/{LAUNCHER_FILE_NAME}"));
        command.push(format!("{APP_DIR}/{}", staging.artifact_file_name()));

        ContainerSpec {
            name: format!("{STAGING_PREFIX}{}", Uuid::new_v4().simple()),
            image: self.config.image.clone(),
            command,
            workdir: APP_DIR.to_string(),
            mounts: vec![Mount {
                host_path: staging.path().to_path_buf(),
                container_path: APP_DIR.to_string(),
                read_only: true,
            }],
            env: self.config.env.clone(),
            labels: vec![(MANAGED_LABEL.to_string(), "true".to_string())],
            limits: limits.clone(),
        }
    }
}

/// Race `step` against `cancel` and the run's `deadline`.
async fn bounded<T>(
    step: impl Future<Output = ExecResult<T>>,
    deadline: Instant,
    limits: &SandboxLimits,
    cancel: &CancellationToken,
) -> ExecResult<T> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => {
            debug!("Sandbox run cancelled");
            Err(ExecError::Cancelled)
        },
        finished = tokio::time::timeout_at(deadline, step) => {
            finished.unwrap_or_else(|_| {
                warn!(
                    timeout_ms = u64::try_from(limits.timeout.as_millis()).unwrap_or(u64::MAX),
                    "Sandbox run exceeded deadline"
                );
                Err(ExecError::PluginTimeout { timeout: limits.timeout })
            })
        },
    }
}

fn close_staging(staging: StagingArea) {
    if let Err(e) = staging.close() {
        warn!(error = %e, "Failed to remove staging area");
    }
}

/// Map exit code and captured output to the invocation result.
///
/// A decodable error envelope always wins. A non-zero exit without a
/// decodable envelope is a crash; a non-zero exit after a success envelope
/// is also a crash, since the result cannot be trusted.
fn interpret(codec: &WireCodec, exit_code: i64, output: &[u8]) -> ExecResult<Value> {
    match codec.decode_response(output) {
        Ok(WireResponse::Error { error }) => Err(ExecError::PluginRaised(error)),
        Ok(WireResponse::Success { result }) if exit_code == 0 => Ok(result),
        Ok(WireResponse::Success { .. }) => Err(ExecError::PluginCrashed {
            exit_code,
            detail: "process exited abnormally after reporting success".to_string(),
        }),
        Err(ExecError::MalformedOutput(_)) if exit_code != 0 => Err(ExecError::PluginCrashed {
            exit_code,
            detail: crash_detail(exit_code, output),
        }),
        Err(e) => Err(e),
    }
}

fn crash_detail(exit_code: i64, output: &[u8]) -> String {
    if exit_code == SIGKILL_EXIT_CODE {
        return "killed by the runtime (memory limit exceeded)".to_string();
    }
    let start = output.len().saturating_sub(CRASH_TAIL_BYTES);
    let tail = String::from_utf8_lossy(&output[start..]);
    let tail = tail.trim();
    if tail.is_empty() {
        "no output".to_string()
    } else {
        tail.to_string()
    }
}
