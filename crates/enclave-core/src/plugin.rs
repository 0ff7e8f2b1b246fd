//! Plugin record and lifecycle state machine.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::ids::{PluginId, UserId};

/// Lifecycle state of a plugin.
///
/// ```text
/// Uploaded ──approve──▶ Approved ──activate──▶ Active
/// ```
///
/// Deletion is terminal and reachable from every state; a deleted plugin has
/// no record, so it is not represented here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginState {
    /// Artifact submitted; not executable.
    Uploaded,
    /// Approved by an elevated caller; still not executable.
    Approved,
    /// Approved and activated; eligible for isolated execution.
    Active,
}

impl PluginState {
    /// Whether `next` is directly reachable from `self`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Uploaded, Self::Approved) | (Self::Approved, Self::Active)
        )
    }

    /// Whether this state has passed approval.
    #[must_use]
    pub fn is_approved(self) -> bool {
        matches!(self, Self::Approved | Self::Active)
    }

    /// Whether this state is active.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uploaded => "uploaded",
            Self::Approved => "approved",
            Self::Active => "active",
        })
    }
}

/// A unit of untrusted code, as persisted.
///
/// Approval and activation are folded into a single [`PluginState`] so that
/// `active ⇒ approved` cannot be violated by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginRecord {
    /// Unique identifier.
    pub id: PluginId,
    /// Globally unique display name.
    pub name: String,
    /// Human description.
    pub description: String,
    /// Author-supplied version string.
    pub version: String,
    /// Uploading user.
    pub author_id: UserId,
    /// Optional source repository.
    pub repository_url: Option<String>,
    /// Location of the stored code artifact.
    pub artifact_path: PathBuf,
    state: PluginState,
    /// Upload time.
    pub created_at: DateTime<Utc>,
    /// Last lifecycle change.
    pub updated_at: Option<DateTime<Utc>>,
}

impl PluginRecord {
    /// Create a freshly uploaded plugin record.
    #[must_use]
    pub fn uploaded(
        id: PluginId,
        name: impl Into<String>,
        version: impl Into<String>,
        author_id: UserId,
        artifact_path: PathBuf,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            version: version.into(),
            author_id,
            repository_url: None,
            artifact_path,
            state: PluginState::Uploaded,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the repository URL.
    #[must_use]
    pub fn with_repository_url(mut self, url: Option<String>) -> Self {
        self.repository_url = url;
        self
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> PluginState {
        self.state
    }

    /// Whether the plugin has been approved.
    #[must_use]
    pub fn is_approved(&self) -> bool {
        self.state.is_approved()
    }

    /// Whether the plugin is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Whether the plugin may run on the isolated path.
    #[must_use]
    pub fn is_executable(&self) -> bool {
        self.is_approved() && self.is_active()
    }

    /// Move to `next`, stamping `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidTransition`] if `next` is not directly
    /// reachable from the current state.
    pub fn transition_to(&mut self, next: PluginState) -> CoreResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        self.updated_at = Some(Utc::now());
        Ok(())
    }
}
