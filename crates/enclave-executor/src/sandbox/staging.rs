//! Per-invocation staging directories.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::{ExecError, ExecResult};

/// The fixed launcher run inside every container.
pub const LAUNCHER_SCRIPT: &str = include_str!("launcher.py");

/// File name of the launcher inside the staging area.
pub const LAUNCHER_FILE_NAME: &str = "launcher.py";

/// Prefix of every staging directory name.
pub const STAGING_PREFIX: &str = "enclave-run-";

/// Stem of the staged artifact file; the original extension is kept.
const ARTIFACT_STEM: &str = "plugin";

/// A private directory holding one artifact copy and the launcher.
///
/// Removed by [`close`](Self::close), or on drop if that is never reached.
#[derive(Debug)]
pub struct StagingArea {
    dir: TempDir,
    artifact_file_name: String,
}

impl StagingArea {
    /// Create a staging area under `root` (or the system temp directory)
    /// containing a copy of `artifact` and the launcher.
    ///
    /// # Errors
    ///
    /// - [`ExecError::ArtifactNotFound`] if `artifact` is not a file
    /// - [`ExecError::Staging`] if the directory cannot be populated
    pub async fn prepare(root: Option<&Path>, artifact: &Path) -> ExecResult<Self> {
        match tokio::fs::metadata(artifact).await {
            Ok(meta) if meta.is_file() => {},
            Ok(_) => {
                return Err(ExecError::ArtifactNotFound {
                    path: artifact.to_path_buf(),
                });
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ExecError::ArtifactNotFound {
                    path: artifact.to_path_buf(),
                });
            },
            Err(e) => {
                return Err(ExecError::ArtifactUnreadable {
                    path: artifact.to_path_buf(),
                    source: e,
                });
            },
        }

        let mut builder = tempfile::Builder::new();
        builder.prefix(STAGING_PREFIX);
        let dir = match root {
            Some(root) => {
                tokio::fs::create_dir_all(root)
                    .await
                    .map_err(ExecError::Staging)?;
                builder.tempdir_in(root)
            },
            None => builder.tempdir(),
        }
        .map_err(ExecError::Staging)?;

        let artifact_file_name = match artifact.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{ARTIFACT_STEM}.{ext}"),
            None => ARTIFACT_STEM.to_string(),
        };

        tokio::fs::copy(artifact, dir.path().join(&artifact_file_name))
            .await
            .map_err(ExecError::Staging)?;
        tokio::fs::write(dir.path().join(LAUNCHER_FILE_NAME), LAUNCHER_SCRIPT)
            .await
            .map_err(ExecError::Staging)?;

        debug!(
            staging = %dir.path().display(),
            artifact = %artifact.display(),
            "Prepared staging area"
        );
        Ok(Self {
            dir,
            artifact_file_name,
        })
    }

    /// The staging directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// File name of the staged artifact copy.
    #[must_use]
    pub fn artifact_file_name(&self) -> &str {
        &self.artifact_file_name
    }

    /// Remove the directory and its contents.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::Staging`] if removal fails.
    pub fn close(self) -> ExecResult<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close().map_err(ExecError::Staging)?;
        debug!(staging = %path.display(), "Removed staging area");
        Ok(())
    }

    /// Remove staging directories left under `root` by a previous process.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::Staging`] if `root` cannot be listed.
    pub async fn sweep_stale(root: &Path) -> ExecResult<usize> {
        let mut entries = match tokio::fs::read_dir(root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(ExecError::Staging(e)),
        };

        let mut stale: Vec<PathBuf> = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(ExecError::Staging)? {
            if entry
                .file_name()
                .to_str()
                .is_some_and(|n| n.starts_with(STAGING_PREFIX))
            {
                stale.push(entry.path());
            }
        }

        let mut removed = 0usize;
        for path in stale {
            match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => removed = removed.saturating_add(1),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to remove stale staging area"
                    );
                },
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stages_artifact_and_launcher() {
        let src = tempfile::tempdir().unwrap();
        let artifact = src.path().join("4f1c_echo.py");
        std::fs::write(&artifact, "class Plugin: pass\n").unwrap();

        let root = tempfile::tempdir().unwrap();
        let area = StagingArea::prepare(Some(root.path()), &artifact).await.unwrap();
        assert_eq!(area.artifact_file_name(), "plugin.py");
        assert!(area.path().starts_with(root.path()));
        assert_eq!(
            std::fs::read_to_string(area.path().join("plugin.py")).unwrap(),
            "class Plugin: pass\n"
        );
        assert!(area.path().join(LAUNCHER_FILE_NAME).is_file());

        let path = area.path().to_path_buf();
        area.close().unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn dropped_area_is_removed() {
        let src = tempfile::tempdir().unwrap();
        let artifact = src.path().join("x.py");
        std::fs::write(&artifact, "").unwrap();
        let area = StagingArea::prepare(None, &artifact).await.unwrap();
        let path = area.path().to_path_buf();
        drop(area);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn missing_artifact_is_not_found() {
        let root = tempfile::tempdir().unwrap();
        let err = StagingArea::prepare(Some(root.path()), &root.path().join("nope.py"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::ArtifactNotFound { .. }));
        // Nothing was staged.
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn sweep_removes_only_staging_dirs() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("enclave-run-old1")).unwrap();
        std::fs::create_dir(root.path().join("enclave-run-old2")).unwrap();
        std::fs::create_dir(root.path().join("keep-me")).unwrap();

        let removed = StagingArea::sweep_stale(root.path()).await.unwrap();
        assert_eq!(removed, 2);
        assert!(root.path().join("keep-me").exists());
    }

    #[test]
    fn launcher_writes_single_envelope_line() {
        assert!(LAUNCHER_SCRIPT.contains("redirect_stdout(sys.stderr)"));
        assert!(LAUNCHER_SCRIPT.contains("\"status\": \"success\""));
    }
}
