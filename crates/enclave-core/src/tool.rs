//! Tool registration record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{PluginId, ToolId};

/// A named capability exposed to end users.
///
/// Core tools ship with the platform; the rest are backed by a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolRecord {
    /// Unique identifier.
    pub id: ToolId,
    /// Unique display name.
    pub name: String,
    /// Human description.
    pub description: String,
    /// Free-form category used for grouping.
    pub category: String,
    /// Backing plugin, or `None` for core tools.
    pub plugin_id: Option<PluginId>,
    /// Registration time.
    pub created_at: DateTime<Utc>,
}

impl ToolRecord {
    /// A built-in tool.
    #[must_use]
    pub fn core(
        name: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            id: ToolId::new(),
            name: name.into(),
            description: description.into(),
            category: category.into(),
            plugin_id: None,
            created_at: Utc::now(),
        }
    }

    /// A tool backed by `plugin_id`.
    #[must_use]
    pub fn plugin_backed(
        plugin_id: PluginId,
        name: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            plugin_id: Some(plugin_id),
            ..Self::core(name, description, category)
        }
    }

    /// Whether this is a built-in tool.
    #[must_use]
    pub fn is_core(&self) -> bool {
        self.plugin_id.is_none()
    }
}
