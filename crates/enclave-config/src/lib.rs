//! Enclave Config - Layered configuration for the enclave plugin engine.
//!
//! Configuration is assembled from embedded defaults, an optional TOML file
//! and `ENCLAVE_*` environment overrides, then validated. This crate has no
//! dependencies on other enclave crates; consumers convert sections into
//! their own types.
//!
//! # Example
//!
//! ```rust,no_run
//! # fn main() -> Result<(), enclave_config::ConfigError> {
//! let config = enclave_config::Config::load(None)?;
//! println!("plugins run in {}", config.sandbox.image);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod loader;
mod types;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::default_config_path;
pub use types::{Config, LoggingSection, PluginsSection, SandboxSection};

impl Config {
    /// Load from defaults, `path` (or the discovered config file) and the
    /// process environment.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file is malformed or the final
    /// configuration fails validation.
    pub fn load(path: Option<&std::path::Path>) -> ConfigResult<Self> {
        loader::load(path)
    }

    /// As [`load`](Self::load), with an explicit environment.
    ///
    /// # Errors
    ///
    /// As [`load`](Self::load).
    pub fn load_with_env(
        path: Option<&std::path::Path>,
        env_vars: &std::collections::HashMap<String, String>,
    ) -> ConfigResult<Self> {
        loader::load_with_env(path, env_vars)
    }

    /// The built-in defaults, without any file or environment layer.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ParseError`] if the embedded defaults are
    /// invalid, which indicates a build defect.
    pub fn defaults() -> ConfigResult<Self> {
        toml::from_str(loader::DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })
    }
}
