//! Test harness helpers.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

use enclave_executor::{RunnerConfig, SandboxLimits, SandboxRunner};

use crate::mocks::MockRuntime;

/// Create a temporary directory for testing.
///
/// # Panics
///
/// Panics if the temporary directory cannot be created.
#[must_use]
pub fn test_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp directory")
}

/// Write `content` to `name` inside `dir` and return the path.
///
/// # Panics
///
/// Panics if the file cannot be written.
#[must_use]
pub fn write_artifact(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).expect("Failed to write artifact");
    path
}

/// Write a trusted descriptor pointing at catalog `entry`.
///
/// # Panics
///
/// Panics if the file cannot be written.
#[must_use]
pub fn write_trusted_descriptor(dir: &TempDir, name: &str, entry: &str) -> PathBuf {
    write_artifact(dir, name, &format!("entry = \"{entry}\"\n"))
}

/// Limits suited to tests: a short deadline and otherwise defaults.
#[must_use]
pub fn test_limits() -> SandboxLimits {
    SandboxLimits::default().with_timeout(Duration::from_secs(5))
}

/// A sandbox runner over `runtime`, staging under a fresh temp directory.
///
/// Keep the returned directory alive for as long as the runner is used.
#[must_use]
pub fn mock_runner(runtime: Arc<MockRuntime>) -> (SandboxRunner, TempDir) {
    let staging = test_dir();
    let config = RunnerConfig {
        staging_root: Some(staging.path().to_path_buf()),
        ..RunnerConfig::default()
    };
    (SandboxRunner::new(runtime, config), staging)
}

/// Number of entries left in a staging root.
///
/// # Panics
///
/// Panics if the directory cannot be read.
#[must_use]
pub fn staging_entries(dir: &TempDir) -> usize {
    std::fs::read_dir(dir.path())
        .expect("Failed to read staging root")
        .count()
}

/// Initialize test logging (call once at start of test).
///
/// Honors `RUST_LOG`; defaults to `debug` for enclave crates.
pub fn setup_test_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("enclave_executor=debug,enclave_registry=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
