//! Plugin execution engine for the enclave runtime.
//!
//! Runs a named method of a plugin artifact with caller-supplied parameters
//! under one of two trust regimes:
//!
//! - [`ExecutionMode::Isolated`]: the artifact is staged into a private
//!   directory and run inside a single-use container with no network, a
//!   memory ceiling and a mandatory deadline ([`SandboxRunner`]).
//! - [`ExecutionMode::Trusted`]: the artifact is resolved against an
//!   operator-populated [`TrustedCatalog`] and invoked in-process
//!   ([`PluginLoader`]). Loaded code runs with the full privilege of the host.
//!
//! [`Executor`] is the single entry point. It normalizes both paths into an
//! [`ExecutionResult`] and never returns an `Err`: every failure in the
//! [`ExecError`] taxonomy becomes a structured error outcome.
//!
//! # Wire Protocol
//!
//! The isolated path talks to a fixed launcher script over stdin/stdout
//! using the JSON envelopes in [`codec`].

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod codec;
pub mod dispatcher;
pub mod error;
pub mod loader;
pub mod result;
pub mod sandbox;

pub use codec::{WireCodec, WireRequest, WireResponse};
pub use dispatcher::{ExecutionMode, Executor};
pub use error::{ErrorKind, ExecError, ExecResult};
pub use loader::{PluginFactory, PluginLoader, TrustedCatalog, TrustedPlugin};
pub use result::{ExecutionResult, Outcome};
pub use sandbox::{
    ContainerGuard, ContainerHandle, ContainerRuntime, ContainerSpec, DockerCli,
    LAUNCHER_FILE_NAME, MANAGED_LABEL, Mount, NetworkPolicy, RunnerConfig, SandboxLimits,
    SandboxRunner, StagingArea,
};
