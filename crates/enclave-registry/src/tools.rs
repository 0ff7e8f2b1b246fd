//! Tool catalog operations.
//!
//! Core tools are built in and can never be deleted. Plugin-backed tools
//! route execution to their plugin through the same lifecycle gate as
//! direct execution, and disappear when their plugin is deleted.

use tokio_util::sync::CancellationToken;
use tracing::info;

use enclave_core::{Caller, Params, PluginId, ToolId, ToolRecord};
use enclave_executor::ExecutionResult;

use crate::error::{RegistryError, RegistryResult};
use crate::registry::{PluginRegistry, require_admin};

impl PluginRegistry {
    /// Register a built-in tool, typically at startup.
    ///
    /// # Errors
    ///
    /// [`RegistryError::ToolNameTaken`] if the name is in use.
    pub async fn register_core_tool(
        &self,
        name: &str,
        description: &str,
        category: &str,
    ) -> RegistryResult<ToolRecord> {
        let tool = ToolRecord::core(name, description, category);
        self.store.insert_tool(tool.clone()).await?;
        info!(tool_id = %tool.id, name, "Core tool registered");
        Ok(tool)
    }

    /// Expose a plugin as a tool.
    ///
    /// # Errors
    ///
    /// [`RegistryError::Forbidden`] unless `caller` is an administrator;
    /// [`RegistryError::PluginNotFound`] or [`RegistryError::ToolNameTaken`].
    pub async fn register_tool(
        &self,
        caller: &Caller,
        plugin_id: PluginId,
        name: &str,
        description: &str,
        category: &str,
    ) -> RegistryResult<ToolRecord> {
        require_admin(caller, "register tools")?;
        let tool = ToolRecord::plugin_backed(plugin_id, name, description, category);
        self.store.insert_tool(tool.clone()).await?;
        info!(tool_id = %tool.id, %plugin_id, name, "Plugin tool registered");
        Ok(tool)
    }

    /// Fetch a tool.
    ///
    /// # Errors
    ///
    /// [`RegistryError::ToolNotFound`] for an unknown id.
    pub async fn get_tool(&self, id: ToolId) -> RegistryResult<ToolRecord> {
        self.store
            .get_tool(id)
            .await?
            .ok_or(RegistryError::ToolNotFound(id))
    }

    /// List tools oldest first.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn list_tools(&self, skip: usize, limit: usize) -> RegistryResult<Vec<ToolRecord>> {
        self.store.list_tools(skip, limit).await
    }

    /// Delete a plugin-backed tool.
    ///
    /// # Errors
    ///
    /// [`RegistryError::Forbidden`] unless `caller` is an administrator;
    /// [`RegistryError::CoreToolProtected`] for core tools;
    /// [`RegistryError::ToolNotFound`] for an unknown id.
    pub async fn delete_tool(&self, caller: &Caller, id: ToolId) -> RegistryResult<()> {
        require_admin(caller, "delete tools")?;
        let tool = self.get_tool(id).await?;
        if tool.is_core() {
            return Err(RegistryError::CoreToolProtected(id));
        }
        if !self.store.delete_tool(id).await? {
            return Err(RegistryError::ToolNotFound(id));
        }
        info!(tool_id = %id, name = %tool.name, by = %caller.user_id, "Tool deleted");
        Ok(())
    }

    /// Execute the plugin behind a tool.
    ///
    /// # Errors
    ///
    /// [`RegistryError::ToolNotFound`], [`RegistryError::NotPluginBacked`],
    /// or [`RegistryError::PluginNotFound`]. Execution failures are reported
    /// inside the [`ExecutionResult`].
    pub async fn execute_tool(
        &self,
        caller: &Caller,
        id: ToolId,
        method: &str,
        params: Params,
        cancel: &CancellationToken,
    ) -> RegistryResult<ExecutionResult> {
        let tool = self.get_tool(id).await?;
        let plugin_id = tool.plugin_id.ok_or(RegistryError::NotPluginBacked(id))?;
        let plugin = self.get_plugin(plugin_id).await?;
        Ok(self
            .run_gated(caller, &plugin, Some(id), method, params, cancel)
            .await)
    }
}
