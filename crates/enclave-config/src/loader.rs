//! Layered configuration loading.
//!
//! Precedence, lowest first:
//!
//! 1. Embedded defaults (`defaults.toml`)
//! 2. The config file: an explicit path, else `$ENCLAVE_CONFIG`, else the
//!    platform config directory
//! 3. `ENCLAVE_<SECTION>_<KEY>` environment variables
//!
//! The merged result is deserialized and validated before it is returned.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;
use crate::validate;

/// Embedded defaults.
pub(crate) const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Prefix of environment overrides.
const ENV_PREFIX: &str = "ENCLAVE_";

/// Environment variable naming the config file.
const CONFIG_PATH_VAR: &str = "ENCLAVE_CONFIG";

/// Maximum allowed config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: usize = 1_048_576;

/// Load configuration from the process environment.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file is malformed, an override does not
/// parse, or the merged configuration fails validation.
pub fn load(path: Option<&Path>) -> ConfigResult<Config> {
    let env_vars: HashMap<String, String> = std::env::vars()
        .filter(|(k, _)| k.starts_with(ENV_PREFIX))
        .collect();
    load_with_env(path, &env_vars)
}

/// Load configuration with an explicit set of environment variables.
///
/// # Errors
///
/// As [`load`].
pub fn load_with_env(
    path: Option<&Path>,
    env_vars: &HashMap<String, String>,
) -> ConfigResult<Config> {
    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })?;

    let file = match (path, env_vars.get(CONFIG_PATH_VAR)) {
        (Some(p), _) => Some((read_file(p)?, p.to_path_buf())),
        (None, Some(p)) => {
            let p = PathBuf::from(p);
            Some((read_file(&p)?, p))
        },
        (None, None) => match default_config_path() {
            Some(p) => try_read_file(&p)?.map(|v| (v, p)),
            None => None,
        },
    };
    if let Some((overlay, path)) = file {
        deep_merge(&mut merged, &overlay);
        info!(path = %path.display(), "Loaded config file");
    }

    let applied = apply_env_overrides(&mut merged, env_vars)?;
    if applied > 0 {
        debug!(count = applied, "Applied environment overrides");
    }

    let config: Config = merged
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::ParseError {
            path: "<merged config>".to_owned(),
            source: e,
        })?;

    validate::validate(&config)?;
    Ok(config)
}

/// Platform config file location, e.g. `~/.config/enclave/config.toml`.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "enclave").map(|d| d.config_dir().join("config.toml"))
}

/// Recursively merge `overlay` into `base`. Tables merge per key; scalars
/// and arrays replace.
pub(crate) fn deep_merge(base: &mut toml::Value, overlay: &toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                if let Some(base_val) = base_table.get_mut(key) {
                    deep_merge(base_val, overlay_val);
                } else {
                    base_table.insert(key.clone(), overlay_val.clone());
                }
            }
        },
        (base, overlay) => {
            *base = overlay.clone();
        },
    }
}

fn read_file(path: &Path) -> ConfigResult<toml::Value> {
    try_read_file(path)?.ok_or_else(|| ConfigError::ReadError {
        path: path.display().to_string(),
        source: std::io::Error::from(std::io::ErrorKind::NotFound),
    })
}

fn try_read_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "Config file not found, skipping");
            return Ok(None);
        },
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.display().to_string(),
                source: e,
            });
        },
    };

    if content.len() > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes, exceeding the {MAX_CONFIG_FILE_SIZE} byte limit",
                content.len()
            ),
        });
    }

    toml::from_str(&content)
        .map(Some)
        .map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            source: e,
        })
}

/// Apply `ENCLAVE_<SECTION>_<KEY>` overrides. The value is parsed to the
/// type of the value it replaces; unknown sections are ignored.
fn apply_env_overrides(
    merged: &mut toml::Value,
    env_vars: &HashMap<String, String>,
) -> ConfigResult<usize> {
    let Some(root) = merged.as_table_mut() else {
        return Ok(0);
    };

    let mut vars: Vec<_> = env_vars.iter().collect();
    vars.sort();

    let mut applied = 0usize;
    for (var, raw) in vars {
        if var == CONFIG_PATH_VAR {
            continue;
        }
        let Some(rest) = var.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let rest = rest.to_ascii_lowercase();
        let Some((section, key)) = rest.split_once('_') else {
            continue;
        };
        let Some(table) = root.get_mut(section).and_then(toml::Value::as_table_mut) else {
            warn!(var = %var, "Ignoring override for unknown config section");
            continue;
        };

        let value = parse_like(table.get(key), raw).map_err(|message| ConfigError::EnvError {
            var: var.clone(),
            message,
        })?;
        table.insert(key.to_string(), value);
        applied = applied.saturating_add(1);
    }
    Ok(applied)
}

fn parse_like(existing: Option<&toml::Value>, raw: &str) -> Result<toml::Value, String> {
    match existing {
        Some(toml::Value::Integer(_)) => raw
            .trim()
            .parse::<i64>()
            .map(toml::Value::Integer)
            .map_err(|e| format!("expected an integer: {e}")),
        Some(toml::Value::Float(_)) => raw
            .trim()
            .parse::<f64>()
            .map(toml::Value::Float)
            .map_err(|e| format!("expected a number: {e}")),
        Some(toml::Value::Boolean(_)) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(toml::Value::Boolean(true)),
            "0" | "false" | "no" | "off" => Ok(toml::Value::Boolean(false)),
            other => Err(format!("expected a boolean, got '{other}'")),
        },
        Some(toml::Value::Array(_)) => Ok(toml::Value::Array(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| toml::Value::String(s.to_string()))
                .collect(),
        )),
        _ => Ok(toml::Value::String(raw.to_string())),
    }
}
