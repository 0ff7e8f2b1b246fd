//! Artifact storage for uploaded plugin code.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use enclave_core::PluginId;

use crate::error::{RegistryError, RegistryResult};

/// Default upload ceiling: 10 MiB.
pub const DEFAULT_MAX_ARTIFACT_BYTES: u64 = 10 * 1024 * 1024;

/// Where uploaded artifacts are kept.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Validate and persist `content`, returning its location.
    async fn store(
        &self,
        plugin_id: PluginId,
        file_name: &str,
        content: &[u8],
    ) -> RegistryResult<PathBuf>;

    /// Remove a stored artifact. Removing a missing artifact succeeds.
    async fn remove(&self, path: &Path) -> RegistryResult<()>;
}

/// Filesystem [`ArtifactStore`] storing `{plugin_id}_{file_name}` under a
/// root directory.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
    max_bytes: u64,
    allowed_extensions: Vec<String>,
}

impl FsArtifactStore {
    /// Store under `root`, accepting `.py` files up to 10 MiB.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_bytes: DEFAULT_MAX_ARTIFACT_BYTES,
            allowed_extensions: vec!["py".to_string()],
        }
    }

    /// Set the upload ceiling.
    #[must_use]
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Set the accepted extensions (without the dot).
    #[must_use]
    pub fn with_allowed_extensions(mut self, extensions: Vec<String>) -> Self {
        self.allowed_extensions = extensions;
        self
    }

    /// The storage root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn validate(&self, file_name: &str, size: u64) -> RegistryResult<()> {
        let bare = Path::new(file_name)
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n == file_name);
        if file_name.is_empty() || !bare {
            return Err(RegistryError::InvalidUpload(format!(
                "'{file_name}' is not a plain file name"
            )));
        }

        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        if !self.allowed_extensions.iter().any(|e| e == extension) {
            return Err(RegistryError::InvalidUpload(format!(
                "'{file_name}' has an unsupported extension; allowed: {}",
                self.allowed_extensions.join(", ")
            )));
        }

        if size > self.max_bytes {
            return Err(RegistryError::ArtifactTooLarge {
                size,
                limit: self.max_bytes,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn store(
        &self,
        plugin_id: PluginId,
        file_name: &str,
        content: &[u8],
    ) -> RegistryResult<PathBuf> {
        let size = u64::try_from(content.len()).unwrap_or(u64::MAX);
        self.validate(file_name, size)?;

        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.root.join(format!("{plugin_id}_{file_name}"));
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        file.write_all(content).await?;
        file.flush().await?;

        debug!(path = %path.display(), bytes = size, "Stored plugin artifact");
        Ok(path)
    }

    async fn remove(&self, path: &Path) -> RegistryResult<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Removed plugin artifact");
                Ok(())
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
