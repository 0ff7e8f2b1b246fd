//! Plugin lifecycle and gated execution.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use enclave_core::{
    Caller, ExecutionId, ExecutionLog, Params, PluginId, PluginRecord, PluginState, ToolId,
};
use enclave_executor::{ExecError, ExecutionMode, ExecutionResult, Executor, Outcome};

use crate::artifacts::ArtifactStore;
use crate::error::{RegistryError, RegistryResult};
use crate::store::PluginStore;

/// An upload submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRequest {
    /// Unique plugin name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Version label.
    pub version: String,
    /// Optional source repository.
    #[serde(default)]
    pub repository_url: Option<String>,
    /// Original file name; determines the extension.
    pub file_name: String,
    /// Artifact bytes.
    #[serde(skip)]
    pub content: Vec<u8>,
}

/// Owns plugin metadata and artifacts and gates execution on lifecycle
/// state.
///
/// Only plugins that are both approved and active can run, and they always
/// run isolated. Rejections happen before any staging.
pub struct PluginRegistry {
    pub(crate) store: Arc<dyn PluginStore>,
    artifacts: Arc<dyn ArtifactStore>,
    executor: Arc<Executor>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

impl PluginRegistry {
    /// Create a registry.
    #[must_use]
    pub fn new(
        store: Arc<dyn PluginStore>,
        artifacts: Arc<dyn ArtifactStore>,
        executor: Arc<Executor>,
    ) -> Self {
        Self {
            store,
            artifacts,
            executor,
        }
    }

    /// Upload a plugin. It starts in [`PluginState::Uploaded`] and is owned
    /// by `caller`.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::InvalidUpload`] for a missing name or version, or a
    ///   bad file name or extension
    /// - [`RegistryError::ArtifactTooLarge`] over the size ceiling
    /// - [`RegistryError::PluginNameTaken`] if the name is in use
    pub async fn upload(
        &self,
        caller: &Caller,
        request: UploadRequest,
    ) -> RegistryResult<PluginRecord> {
        if request.name.trim().is_empty() {
            return Err(RegistryError::InvalidUpload("name must not be empty".into()));
        }
        if request.version.trim().is_empty() {
            return Err(RegistryError::InvalidUpload("version must not be empty".into()));
        }
        if self.store.find_plugin_by_name(&request.name).await?.is_some() {
            return Err(RegistryError::PluginNameTaken(request.name));
        }

        let id = PluginId::new();
        let path = self
            .artifacts
            .store(id, &request.file_name, &request.content)
            .await?;

        let record = PluginRecord::uploaded(
            id,
            request.name,
            request.version,
            caller.user_id,
            path.clone(),
        )
        .with_description(request.description)
        .with_repository_url(request.repository_url);

        // The name check above is advisory; the store enforces uniqueness.
        if let Err(e) = self.store.insert_plugin(record.clone()).await {
            if let Err(cleanup) = self.artifacts.remove(&path).await {
                warn!(
                    path = %path.display(),
                    error = %cleanup,
                    "Failed to remove artifact of rejected upload"
                );
            }
            return Err(e);
        }

        info!(plugin_id = %id, name = %record.name, author = %caller.user_id, "Plugin uploaded");
        Ok(record)
    }

    /// Approve a plugin. Approving an already approved plugin is a no-op.
    ///
    /// # Errors
    ///
    /// [`RegistryError::Forbidden`] unless `caller` is an administrator;
    /// [`RegistryError::PluginNotFound`] for an unknown id.
    pub async fn approve(&self, caller: &Caller, id: PluginId) -> RegistryResult<PluginRecord> {
        require_admin(caller, "approve plugins")?;
        let record = self
            .store
            .update_plugin(id, &|r| {
                if r.state() == PluginState::Uploaded {
                    r.transition_to(PluginState::Approved)?;
                }
                Ok(())
            })
            .await?;
        info!(plugin_id = %id, by = %caller.user_id, "Plugin approved");
        Ok(record)
    }

    /// Activate an approved plugin. Activating an active plugin is a no-op.
    ///
    /// # Errors
    ///
    /// [`RegistryError::Forbidden`] unless `caller` is an administrator;
    /// [`RegistryError::Lifecycle`] if the plugin was never approved;
    /// [`RegistryError::PluginNotFound`] for an unknown id.
    pub async fn activate(&self, caller: &Caller, id: PluginId) -> RegistryResult<PluginRecord> {
        require_admin(caller, "activate plugins")?;
        let record = self
            .store
            .update_plugin(id, &|r| {
                if r.state() != PluginState::Active {
                    r.transition_to(PluginState::Active)?;
                }
                Ok(())
            })
            .await?;
        info!(plugin_id = %id, by = %caller.user_id, "Plugin activated");
        Ok(record)
    }

    /// Delete a plugin, the tools it backs, and its artifact.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::PluginNotFound`] for an unknown id
    /// - [`RegistryError::Forbidden`] unless `caller` is the author or an
    ///   administrator
    /// - [`RegistryError::Artifact`] if the metadata was deleted but the
    ///   artifact could not be removed
    pub async fn delete(&self, caller: &Caller, id: PluginId) -> RegistryResult<()> {
        let plugin = self.get_plugin(id).await?;
        if !caller.owns_or_admin(plugin.author_id) {
            return Err(RegistryError::Forbidden(
                "only the author or an administrator can delete a plugin".into(),
            ));
        }

        let Some(removed) = self.store.delete_plugin(id).await? else {
            return Err(RegistryError::PluginNotFound(id));
        };
        if let Err(e) = self.artifacts.remove(&removed.artifact_path).await {
            error!(
                plugin_id = %id,
                path = %removed.artifact_path.display(),
                error = %e,
                "Plugin deleted but its artifact could not be removed"
            );
            return Err(e);
        }

        info!(plugin_id = %id, name = %removed.name, by = %caller.user_id, "Plugin deleted");
        Ok(())
    }

    /// Fetch a plugin.
    ///
    /// # Errors
    ///
    /// [`RegistryError::PluginNotFound`] for an unknown id.
    pub async fn get_plugin(&self, id: PluginId) -> RegistryResult<PluginRecord> {
        self.store
            .get_plugin(id)
            .await?
            .ok_or(RegistryError::PluginNotFound(id))
    }

    /// List plugins oldest first.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn list_plugins(
        &self,
        skip: usize,
        limit: usize,
    ) -> RegistryResult<Vec<PluginRecord>> {
        self.store.list_plugins(skip, limit).await
    }

    /// Execute `method` of a plugin in the isolated sandbox.
    ///
    /// Plugins that are not both approved and active are rejected with a
    /// `lifecycle_violation` result before anything is staged. Every
    /// attempt is recorded in the execution log.
    ///
    /// # Errors
    ///
    /// [`RegistryError::PluginNotFound`] for an unknown id. Execution
    /// failures are reported inside the [`ExecutionResult`].
    pub async fn execute(
        &self,
        caller: &Caller,
        id: PluginId,
        method: &str,
        params: Params,
        cancel: &CancellationToken,
    ) -> RegistryResult<ExecutionResult> {
        let plugin = self.get_plugin(id).await?;
        Ok(self.run_gated(caller, &plugin, None, method, params, cancel).await)
    }

    /// Execution history for a plugin.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn executions(&self, id: PluginId) -> RegistryResult<Vec<ExecutionLog>> {
        self.store.executions_for(id).await
    }

    pub(crate) async fn run_gated(
        &self,
        caller: &Caller,
        plugin: &PluginRecord,
        tool_id: Option<ToolId>,
        method: &str,
        params: Params,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        let input = serde_json::to_string(&params).unwrap_or_default();

        let result = if plugin.is_executable() {
            self.executor
                .execute(
                    &plugin.artifact_path,
                    method,
                    params,
                    ExecutionMode::Isolated,
                    cancel,
                )
                .await
        } else {
            let err = ExecError::LifecycleViolation {
                plugin_id: plugin.id,
                state: plugin.state(),
            };
            warn!(
                plugin_id = %plugin.id,
                state = %plugin.state(),
                method,
                "Rejected execution of non-executable plugin"
            );
            ExecutionResult::rejected(&err)
        };

        let output = match &result.outcome {
            Outcome::Success { result } => result.to_string(),
            Outcome::Error { error, .. } => error.clone(),
        };
        let log = ExecutionLog {
            id: ExecutionId::new(),
            plugin_id: plugin.id,
            tool_id,
            user_id: caller.user_id,
            method: method.to_string(),
            input,
            output,
            status: result.status(),
            elapsed_ms: result.elapsed_ms(),
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.record_execution(log).await {
            warn!(plugin_id = %plugin.id, error = %e, "Failed to record execution log");
        }

        result
    }
}

pub(crate) fn require_admin(caller: &Caller, action: &str) -> RegistryResult<()> {
    if caller.is_admin {
        Ok(())
    } else {
        Err(RegistryError::Forbidden(format!(
            "only administrators can {action}"
        )))
    }
}
