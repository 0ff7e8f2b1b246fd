//! Trusted in-process plugin loader.
//!
//! A trusted artifact is a small TOML descriptor naming an entry in the
//! operator-populated [`TrustedCatalog`]:
//!
//! ```toml
//! entry = "text-translator"
//! ```
//!
//! Every call resolves the descriptor afresh, asks the entry's factory for a
//! new instance, invokes the method on a blocking worker and drops the
//! instance. Nothing is cached between calls, so concurrent invocations of
//! the same artifact never share instance state. Each call also gets a
//! generated namespace id; the worker runs inside a `trusted_call` span
//! carrying it, so everything the instance logs is attributable to one call.
//!
//! # Trust
//!
//! Code reached through this path runs with the full privilege of the host
//! process. Only artifacts under the configured trusted directory are
//! accepted; the lifecycle-gated registry path never routes here.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info_span};
use uuid::Uuid;

use enclave_core::Params;

use crate::error::{ExecError, ExecResult};

/// An instantiated trusted plugin.
///
/// Implementations run synchronously on a blocking worker thread.
pub trait TrustedPlugin: Send {
    /// Methods this instance exposes.
    fn methods(&self) -> Vec<String>;

    /// Invoke `method`. An `Err` is the plugin's own failure message.
    ///
    /// # Errors
    ///
    /// Any plugin-defined failure.
    fn call(&mut self, method: &str, params: Params) -> Result<Value, String>;
}

/// Produces fresh [`TrustedPlugin`] instances.
pub trait PluginFactory: Send + Sync {
    /// Create a new instance.
    fn instantiate(&self) -> Box<dyn TrustedPlugin>;
}

impl<F> PluginFactory for F
where
    F: Fn() -> Box<dyn TrustedPlugin> + Send + Sync,
{
    fn instantiate(&self) -> Box<dyn TrustedPlugin> {
        self()
    }
}

/// Operator-populated table of trusted entry points.
#[derive(Default, Clone)]
pub struct TrustedCatalog {
    entries: HashMap<String, Arc<dyn PluginFactory>>,
}

impl fmt::Debug for TrustedCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.entries.keys().collect();
        names.sort();
        f.debug_struct("TrustedCatalog")
            .field("entries", &names)
            .finish()
    }
}

impl TrustedCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` under `entry`, replacing any previous one.
    #[must_use]
    pub fn with_entry(
        mut self,
        entry: impl Into<String>,
        factory: impl PluginFactory + 'static,
    ) -> Self {
        self.register(entry, factory);
        self
    }

    /// Register `factory` under `entry`, replacing any previous one.
    pub fn register(&mut self, entry: impl Into<String>, factory: impl PluginFactory + 'static) {
        let entry = entry.into();
        debug!(entry = %entry, "Registered trusted plugin entry");
        self.entries.insert(entry, Arc::new(factory));
    }

    /// Look up an entry.
    #[must_use]
    pub fn get(&self, entry: &str) -> Option<Arc<dyn PluginFactory>> {
        self.entries.get(entry).cloned()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Contents of a trusted artifact file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArtifactDescriptor {
    /// Catalog entry to instantiate.
    pub entry: String,
    /// Informational version.
    #[serde(default)]
    pub version: Option<String>,
}

/// Loads and invokes trusted plugins in-process.
#[derive(Debug, Clone)]
pub struct PluginLoader {
    trusted_root: PathBuf,
    catalog: Arc<TrustedCatalog>,
}

impl PluginLoader {
    /// Create a loader accepting artifacts under `trusted_root`.
    #[must_use]
    pub fn new(trusted_root: impl Into<PathBuf>, catalog: TrustedCatalog) -> Self {
        Self {
            trusted_root: trusted_root.into(),
            catalog: Arc::new(catalog),
        }
    }

    /// The trusted directory.
    #[must_use]
    pub fn trusted_root(&self) -> &Path {
        &self.trusted_root
    }

    /// Load `artifact` and invoke `method` with `params`.
    ///
    /// # Errors
    ///
    /// Every failure is wrapped in [`ExecError::PluginExecutionFailed`]
    /// naming the artifact. Causes:
    /// - [`ExecError::UntrustedArtifact`] outside the trusted directory
    /// - [`ExecError::ArtifactNotFound`] / [`ExecError::ArtifactUnreadable`]
    /// - [`ExecError::EntryPointMissing`] for a bad descriptor, unknown
    ///   entry or unknown method
    /// - [`ExecError::PluginRaised`] for plugin failures and panics
    pub async fn load_and_invoke(
        &self,
        artifact: &Path,
        method: &str,
        params: Params,
    ) -> ExecResult<Value> {
        self.invoke(artifact, method, params).await.map_err(|cause| {
            error!(
                artifact = %artifact.display(),
                method,
                error = %cause,
                "Trusted plugin execution failed"
            );
            ExecError::PluginExecutionFailed {
                artifact: artifact.to_path_buf(),
                source: Box::new(cause),
            }
        })
    }

    async fn invoke(&self, artifact: &Path, method: &str, params: Params) -> ExecResult<Value> {
        let resolved = self.resolve(artifact).await?;
        let descriptor = read_descriptor(&resolved).await?;
        let factory = self.catalog.get(&descriptor.entry).ok_or_else(|| {
            ExecError::EntryPointMissing(format!(
                "no trusted entry named '{}'",
                descriptor.entry
            ))
        })?;

        let namespace = Uuid::new_v4();
        let span = info_span!("trusted_call", %namespace, entry = %descriptor.entry);
        debug!(
            parent: &span,
            artifact = %resolved.display(),
            method,
            "Loading trusted plugin"
        );

        let method = method.to_string();
        let handle = tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            let mut instance = factory.instantiate();
            if !instance.methods().iter().any(|m| *m == method) {
                return Err(ExecError::EntryPointMissing(format!(
                    "method '{method}' not found on entry '{}'",
                    descriptor.entry
                )));
            }
            instance.call(&method, params).map_err(ExecError::PluginRaised)
        });

        match handle.await {
            Ok(result) => result,
            Err(join) if join.is_panic() => {
                let payload = join.into_panic();
                let message = payload
                    .downcast_ref::<&str>()
                    .map(ToString::to_string)
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(ExecError::PluginRaised(format!("plugin panicked: {message}")))
            },
            Err(join) => Err(ExecError::Runtime(format!("trusted worker failed: {join}"))),
        }
    }

    async fn resolve(&self, artifact: &Path) -> ExecResult<PathBuf> {
        let resolved = tokio::fs::canonicalize(artifact)
            .await
            .map_err(|e| artifact_io_error(artifact, e))?;
        let root = tokio::fs::canonicalize(&self.trusted_root)
            .await
            .map_err(|_| ExecError::UntrustedArtifact {
                path: artifact.to_path_buf(),
            })?;
        if !resolved.starts_with(&root) {
            return Err(ExecError::UntrustedArtifact {
                path: artifact.to_path_buf(),
            });
        }
        Ok(resolved)
    }
}

async fn read_descriptor(path: &Path) -> ExecResult<ArtifactDescriptor> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| artifact_io_error(path, e))?;
    toml::from_str(&text).map_err(|e| {
        ExecError::EntryPointMissing(format!("artifact does not declare a valid entry: {e}"))
    })
}

fn artifact_io_error(path: &Path, e: std::io::Error) -> ExecError {
    if e.kind() == std::io::ErrorKind::NotFound {
        ExecError::ArtifactNotFound {
            path: path.to_path_buf(),
        }
    } else {
        ExecError::ArtifactUnreadable {
            path: path.to_path_buf(),
            source: e,
        }
    }
}
