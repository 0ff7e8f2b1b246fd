//! Metadata persistence for plugins, tools and execution logs.
//!
//! Each trait method is one transaction: it either applies completely or
//! leaves the store unchanged.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use enclave_core::{ExecutionLog, PluginId, PluginRecord, ToolId, ToolRecord};

use crate::error::{RegistryError, RegistryResult};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Read-modify-write step applied atomically by [`PluginStore::update_plugin`].
pub type PluginUpdate<'a> = &'a (dyn Fn(&mut PluginRecord) -> RegistryResult<()> + Send + Sync);

/// Persistent registry storage.
#[async_trait]
pub trait PluginStore: Send + Sync {
    /// Insert a new plugin.
    ///
    /// Fails with [`RegistryError::PluginNameTaken`] if the name is in use.
    async fn insert_plugin(&self, record: PluginRecord) -> RegistryResult<()>;

    /// Fetch a plugin by id.
    async fn get_plugin(&self, id: PluginId) -> RegistryResult<Option<PluginRecord>>;

    /// Fetch a plugin by name.
    async fn find_plugin_by_name(&self, name: &str) -> RegistryResult<Option<PluginRecord>>;

    /// Apply `update` to a plugin and persist the result. If `update` fails
    /// the stored record is untouched.
    async fn update_plugin(
        &self,
        id: PluginId,
        update: PluginUpdate<'_>,
    ) -> RegistryResult<PluginRecord>;

    /// List plugins oldest first.
    async fn list_plugins(&self, skip: usize, limit: usize) -> RegistryResult<Vec<PluginRecord>>;

    /// Delete a plugin and every tool it backs. Returns the deleted record.
    async fn delete_plugin(&self, id: PluginId) -> RegistryResult<Option<PluginRecord>>;

    /// Insert a new tool.
    ///
    /// Fails with [`RegistryError::ToolNameTaken`] if the name is in use, or
    /// [`RegistryError::PluginNotFound`] if its backing plugin is missing.
    async fn insert_tool(&self, tool: ToolRecord) -> RegistryResult<()>;

    /// Fetch a tool by id.
    async fn get_tool(&self, id: ToolId) -> RegistryResult<Option<ToolRecord>>;

    /// List tools oldest first.
    async fn list_tools(&self, skip: usize, limit: usize) -> RegistryResult<Vec<ToolRecord>>;

    /// Delete a tool. Returns whether it existed.
    async fn delete_tool(&self, id: ToolId) -> RegistryResult<bool>;

    /// Append an execution log entry.
    async fn record_execution(&self, log: ExecutionLog) -> RegistryResult<()>;

    /// Execution logs for a plugin, oldest first.
    async fn executions_for(&self, plugin_id: PluginId) -> RegistryResult<Vec<ExecutionLog>>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Tables {
    plugins: HashMap<PluginId, PluginRecord>,
    tools: HashMap<ToolId, ToolRecord>,
    executions: Vec<ExecutionLog>,
}

/// In-memory [`PluginStore`]. One lock covers all tables.
///
/// The execution log is append-only and unbounded: entries are never pruned,
/// and they outlive the plugin they describe, so history stays readable
/// after a delete. Suited to tests and single-process deployments.
#[derive(Debug, Default)]
pub struct MemoryPluginStore {
    tables: RwLock<Tables>,
}

impl MemoryPluginStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RegistryResult<std::sync::RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|e| RegistryError::Storage(e.to_string()))
    }

    fn write(&self) -> RegistryResult<std::sync::RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|e| RegistryError::Storage(e.to_string()))
    }
}

fn page<T>(items: Vec<T>, skip: usize, limit: usize) -> Vec<T> {
    items.into_iter().skip(skip).take(limit).collect()
}

#[async_trait]
impl PluginStore for MemoryPluginStore {
    async fn insert_plugin(&self, record: PluginRecord) -> RegistryResult<()> {
        let mut t = self.write()?;
        if t.plugins.values().any(|p| p.name == record.name) {
            return Err(RegistryError::PluginNameTaken(record.name));
        }
        t.plugins.insert(record.id, record);
        Ok(())
    }

    async fn get_plugin(&self, id: PluginId) -> RegistryResult<Option<PluginRecord>> {
        Ok(self.read()?.plugins.get(&id).cloned())
    }

    async fn find_plugin_by_name(&self, name: &str) -> RegistryResult<Option<PluginRecord>> {
        Ok(self
            .read()?
            .plugins
            .values()
            .find(|p| p.name == name)
            .cloned())
    }

    async fn update_plugin(
        &self,
        id: PluginId,
        update: PluginUpdate<'_>,
    ) -> RegistryResult<PluginRecord> {
        let mut t = self.write()?;
        let stored = t
            .plugins
            .get_mut(&id)
            .ok_or(RegistryError::PluginNotFound(id))?;
        let mut next = stored.clone();
        update(&mut next)?;
        *stored = next.clone();
        Ok(next)
    }

    async fn list_plugins(&self, skip: usize, limit: usize) -> RegistryResult<Vec<PluginRecord>> {
        let mut all: Vec<PluginRecord> = self.read()?.plugins.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(page(all, skip, limit))
    }

    async fn delete_plugin(&self, id: PluginId) -> RegistryResult<Option<PluginRecord>> {
        let mut t = self.write()?;
        let removed = t.plugins.remove(&id);
        if removed.is_some() {
            t.tools.retain(|_, tool| tool.plugin_id != Some(id));
        }
        Ok(removed)
    }

    async fn insert_tool(&self, tool: ToolRecord) -> RegistryResult<()> {
        let mut t = self.write()?;
        if t.tools.values().any(|existing| existing.name == tool.name) {
            return Err(RegistryError::ToolNameTaken(tool.name));
        }
        if let Some(plugin_id) = tool.plugin_id.filter(|id| !t.plugins.contains_key(id)) {
            return Err(RegistryError::PluginNotFound(plugin_id));
        }
        t.tools.insert(tool.id, tool);
        Ok(())
    }

    async fn get_tool(&self, id: ToolId) -> RegistryResult<Option<ToolRecord>> {
        Ok(self.read()?.tools.get(&id).cloned())
    }

    async fn list_tools(&self, skip: usize, limit: usize) -> RegistryResult<Vec<ToolRecord>> {
        let mut all: Vec<ToolRecord> = self.read()?.tools.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(page(all, skip, limit))
    }

    async fn delete_tool(&self, id: ToolId) -> RegistryResult<bool> {
        Ok(self.write()?.tools.remove(&id).is_some())
    }

    async fn record_execution(&self, log: ExecutionLog) -> RegistryResult<()> {
        self.write()?.executions.push(log);
        Ok(())
    }

    async fn executions_for(&self, plugin_id: PluginId) -> RegistryResult<Vec<ExecutionLog>> {
        Ok(self
            .read()?
            .executions
            .iter()
            .filter(|l| l.plugin_id == plugin_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use enclave_core::{ExecutionId, ExecutionStatus, PluginState, UserId};

    use super::*;

    fn plugin(name: &str) -> PluginRecord {
        PluginRecord::uploaded(
            PluginId::new(),
            name,
            "1.0.0",
            UserId::new(),
            PathBuf::from(format!("/plugins/{name}.py")),
        )
    }

    #[tokio::test]
    async fn names_are_unique() {
        let store = MemoryPluginStore::new();
        store.insert_plugin(plugin("echo")).await.unwrap();
        let err = store.insert_plugin(plugin("echo")).await.unwrap_err();
        assert!(matches!(err, RegistryError::PluginNameTaken(ref n) if n == "echo"));
    }

    #[tokio::test]
    async fn failed_update_leaves_record_untouched() {
        let store = MemoryPluginStore::new();
        let p = plugin("echo");
        let id = p.id;
        store.insert_plugin(p).await.unwrap();

        let err = store
            .update_plugin(id, &|r| Ok(r.transition_to(PluginState::Active)?))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Lifecycle(_)));
        let stored = store.get_plugin(id).await.unwrap().unwrap();
        assert_eq!(stored.state(), PluginState::Uploaded);
        assert!(stored.updated_at.is_none());
    }

    #[tokio::test]
    async fn delete_cascades_to_tools() {
        let store = MemoryPluginStore::new();
        let p = plugin("translator");
        let id = p.id;
        store.insert_plugin(p).await.unwrap();
        let backed = ToolRecord::plugin_backed(id, "translate", "Translate text", "text");
        let backed_id = backed.id;
        store.insert_tool(backed).await.unwrap();
        let core = ToolRecord::core("search", "Web search", "web");
        let core_id = core.id;
        store.insert_tool(core).await.unwrap();

        assert!(store.delete_plugin(id).await.unwrap().is_some());
        assert!(store.get_tool(backed_id).await.unwrap().is_none());
        assert!(store.get_tool(core_id).await.unwrap().is_some());
        assert!(store.delete_plugin(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn execution_history_outlives_plugin() {
        let store = MemoryPluginStore::new();
        let p = plugin("echo");
        let id = p.id;
        let user_id = p.author_id;
        store.insert_plugin(p).await.unwrap();
        store
            .record_execution(ExecutionLog {
                id: ExecutionId::new(),
                plugin_id: id,
                tool_id: None,
                user_id,
                method: "echo".into(),
                input: "{}".into(),
                output: "{}".into(),
                status: ExecutionStatus::Success,
                elapsed_ms: 3,
                created_at: chrono::Utc::now(),
            })
            .await
            .unwrap();

        store.delete_plugin(id).await.unwrap();
        assert_eq!(store.executions_for(id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn tool_requires_existing_plugin() {
        let store = MemoryPluginStore::new();
        let orphan = ToolRecord::plugin_backed(PluginId::new(), "ghost", "", "misc");
        assert!(matches!(
            store.insert_tool(orphan).await,
            Err(RegistryError::PluginNotFound(_))
        ));
    }

    #[tokio::test]
    async fn listing_pages() {
        let store = MemoryPluginStore::new();
        for i in 0..5 {
            store.insert_plugin(plugin(&format!("p{i}"))).await.unwrap();
        }
        assert_eq!(store.list_plugins(0, 100).await.unwrap().len(), 5);
        assert_eq!(store.list_plugins(3, 100).await.unwrap().len(), 2);
        assert_eq!(store.list_plugins(1, 2).await.unwrap().len(), 2);
    }
}
