//! Isolated execution inside single-use containers.
//!
//! One invocation maps to exactly one container and one staging directory:
//!
//! 1. [`StagingArea::prepare`] copies the artifact and the fixed launcher
//!    into a private temporary directory.
//! 2. [`ContainerGuard::create`] asks the [`ContainerRuntime`] for a
//!    container mounting that directory read-only, with the network
//!    disabled and the [`SandboxLimits`] applied.
//! 3. The request is written to standard input once; the runner then waits
//!    for exit, the deadline, or cancellation, whichever comes first.
//! 4. Output is read back with a hard cap and decoded.
//!
//! Teardown of both resources is guaranteed on every path, including early
//! returns and a dropped future.

mod docker;
mod guard;
mod limits;
mod runner;
mod runtime;
mod staging;

pub use docker::{DockerCli, MANAGED_LABEL};
pub use guard::ContainerGuard;
pub use limits::{
    DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_MEMORY_BYTES, DEFAULT_TIMEOUT, NetworkPolicy,
    SandboxLimits,
};
pub use runner::{RunnerConfig, SandboxRunner};
pub use runtime::{ContainerHandle, ContainerRuntime, ContainerSpec, Mount};
pub use staging::{LAUNCHER_FILE_NAME, LAUNCHER_SCRIPT, STAGING_PREFIX, StagingArea};
