//! Assembly of the execution engine and registry from configuration.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use enclave_config::{Config, PluginsSection, SandboxSection};
use enclave_executor::{
    ContainerRuntime, DockerCli, ExecResult, Executor, NetworkPolicy, PluginLoader, RunnerConfig,
    SandboxLimits, SandboxRunner, StagingArea, TrustedCatalog,
};

use crate::artifacts::FsArtifactStore;
use crate::error::RegistryResult;
use crate::registry::PluginRegistry;
use crate::store::PluginStore;

/// Sandbox limits from `[sandbox]`.
///
/// # Errors
///
/// Returns [`ExecError::InvalidLimits`](enclave_executor::ExecError::InvalidLimits)
/// if the values cannot be enforced.
pub fn sandbox_limits(section: &SandboxSection) -> ExecResult<SandboxLimits> {
    let network = if section.network_disabled() {
        NetworkPolicy::Disabled
    } else {
        NetworkPolicy::Named(section.network.clone())
    };
    let mut limits = SandboxLimits::new(Duration::from_secs(section.timeout_secs))?
        .with_memory_bytes(section.memory_bytes())
        .with_network(network)
        .with_max_output_bytes(section.max_output_bytes);
    if let Some(cpu) = section.cpu_quota {
        limits = limits.with_cpu_quota(cpu);
    }
    if let Some(pids) = section.pids_limit {
        limits = limits.with_pids_limit(pids);
    }
    limits.validate()?;
    Ok(limits)
}

/// Runner configuration from `[sandbox]`.
#[must_use]
pub fn runner_config(section: &SandboxSection) -> RunnerConfig {
    RunnerConfig {
        image: section.image.clone(),
        interpreter: section.interpreter.clone(),
        staging_root: section.staging_dir.clone(),
        ..RunnerConfig::default()
    }
}

/// Locate the container client named by `[sandbox] runtime`, either a
/// binary on `PATH` or an explicit path.
///
/// # Errors
///
/// Returns [`ExecError::Runtime`](enclave_executor::ExecError::Runtime) if it
/// cannot be found.
pub fn docker_cli(section: &SandboxSection) -> ExecResult<DockerCli> {
    DockerCli::discover(&section.runtime)
}

/// Artifact store from `[plugins]`.
#[must_use]
pub fn artifact_store(section: &PluginsSection) -> FsArtifactStore {
    FsArtifactStore::new(&section.artifact_dir)
        .with_max_bytes(section.max_artifact_bytes)
        .with_allowed_extensions(section.allowed_extensions.clone())
}

/// Build the executor over `runtime` with trusted entries from `catalog`.
///
/// # Errors
///
/// Returns an error if the sandbox limits are invalid.
pub fn build_executor(
    config: &Config,
    runtime: Arc<dyn ContainerRuntime>,
    catalog: TrustedCatalog,
) -> ExecResult<Executor> {
    let runner = SandboxRunner::new(runtime, runner_config(&config.sandbox));
    let loader = PluginLoader::new(&config.plugins.trusted_dir, catalog);
    Executor::new(runner, loader, sandbox_limits(&config.sandbox)?)
}

/// Build a registry from configuration.
///
/// # Errors
///
/// Returns an error if the sandbox limits are invalid.
pub fn build_registry(
    config: &Config,
    store: Arc<dyn PluginStore>,
    runtime: Arc<dyn ContainerRuntime>,
    catalog: TrustedCatalog,
) -> RegistryResult<PluginRegistry> {
    let executor = build_executor(config, runtime, catalog)?;
    Ok(PluginRegistry::new(
        store,
        Arc::new(artifact_store(&config.plugins)),
        Arc::new(executor),
    ))
}

/// Remove staging areas and containers left by a previous process, if
/// `reap_on_startup` is set. Returns how many were removed.
pub async fn reap_leftovers(section: &SandboxSection, docker: Option<&DockerCli>) -> usize {
    if !section.reap_on_startup {
        return 0;
    }

    let mut removed = 0usize;
    if let Some(root) = &section.staging_dir {
        match StagingArea::sweep_stale(root).await {
            Ok(n) => removed = removed.saturating_add(n),
            Err(e) => warn!(root = %root.display(), error = %e, "Failed to sweep staging root"),
        }
    }
    if let Some(docker) = docker {
        match docker.reap_orphans().await {
            Ok(n) => removed = removed.saturating_add(n),
            Err(e) => warn!(error = %e, "Failed to reap orphaned containers"),
        }
    }
    if removed > 0 {
        info!(count = removed, "Removed leftovers from a previous run");
    }
    removed
}
