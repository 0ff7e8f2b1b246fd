//! Configuration types.
//!
//! Every section is fully populated from the embedded defaults before any
//! user layer is applied, so fields carry no serde defaults of their own.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Artifact storage and upload policy.
    pub plugins: PluginsSection,
    /// Isolated execution.
    pub sandbox: SandboxSection,
    /// Logging.
    pub logging: LoggingSection,
}

/// `[plugins]`: where artifacts live and what may be uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginsSection {
    /// Directory holding uploaded artifacts.
    pub artifact_dir: PathBuf,
    /// Directory of operator-vetted artifacts for in-process loading.
    pub trusted_dir: PathBuf,
    /// Upload size ceiling in bytes.
    pub max_artifact_bytes: u64,
    /// Accepted file extensions, without the dot.
    pub allowed_extensions: Vec<String>,
}

/// `[sandbox]`: container image and limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SandboxSection {
    /// Container client binary name or path.
    pub runtime: String,
    /// Image every plugin runs in.
    pub image: String,
    /// Interpreter command that runs the launcher.
    pub interpreter: Vec<String>,
    /// Memory ceiling in MiB.
    pub memory_mb: u64,
    /// Wall-clock deadline in seconds.
    pub timeout_secs: u64,
    /// `"none"` to disable networking, otherwise a named network.
    pub network: String,
    /// CPU quota in cores.
    pub cpu_quota: Option<f64>,
    /// Process limit.
    pub pids_limit: Option<u32>,
    /// Ceiling on captured output.
    pub max_output_bytes: usize,
    /// Parent directory for staging areas; system temp if unset.
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,
    /// Remove leftover containers and staging areas at startup.
    pub reap_on_startup: bool,
}

impl SandboxSection {
    /// Whether networking is disabled.
    #[must_use]
    pub fn network_disabled(&self) -> bool {
        self.network == "none"
    }

    /// Memory ceiling in bytes, saturating.
    #[must_use]
    pub fn memory_bytes(&self) -> u64 {
        self.memory_mb.saturating_mul(1024 * 1024)
    }
}

/// `[logging]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    /// Base level.
    pub level: String,
    /// `pretty`, `compact`, `json` or `full`.
    pub format: String,
    /// Extra per-target directives, e.g. `enclave_executor=debug`.
    pub directives: Vec<String>,
    /// Write rolling log files here instead of stderr.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}
