//! Post-merge configuration validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Longest accepted sandbox deadline.
const MAX_TIMEOUT_SECS: u64 = 3600;

/// Smallest memory ceiling an interpreter can start in.
const MIN_MEMORY_MB: u64 = 16;

/// Validate a fully-merged configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_plugins(config)?;
    validate_sandbox(config)?;
    validate_logging(config)?;
    Ok(())
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message: message.into(),
    }
}

fn validate_plugins(config: &Config) -> ConfigResult<()> {
    let p = &config.plugins;
    if p.max_artifact_bytes == 0 {
        return Err(invalid("plugins.max_artifact_bytes", "must be greater than zero"));
    }
    if p.allowed_extensions.is_empty() {
        return Err(invalid(
            "plugins.allowed_extensions",
            "at least one extension is required",
        ));
    }
    if let Some(bad) = p
        .allowed_extensions
        .iter()
        .find(|e| e.is_empty() || e.contains(&['.', '/', '\\'][..]))
    {
        return Err(invalid(
            "plugins.allowed_extensions",
            format!("'{bad}' is not a bare extension"),
        ));
    }
    Ok(())
}

fn validate_sandbox(config: &Config) -> ConfigResult<()> {
    let s = &config.sandbox;
    if s.runtime.trim().is_empty() {
        return Err(invalid("sandbox.runtime", "must not be empty"));
    }
    if s.image.trim().is_empty() {
        return Err(invalid("sandbox.image", "must not be empty"));
    }
    if s.interpreter.is_empty() {
        return Err(invalid("sandbox.interpreter", "must name a command"));
    }
    if s.timeout_secs == 0 || s.timeout_secs > MAX_TIMEOUT_SECS {
        return Err(invalid(
            "sandbox.timeout_secs",
            format!(
                "{} is out of range; must be between 1 and {MAX_TIMEOUT_SECS}",
                s.timeout_secs
            ),
        ));
    }
    if s.memory_mb < MIN_MEMORY_MB {
        return Err(invalid(
            "sandbox.memory_mb",
            format!("{} is below the minimum of {MIN_MEMORY_MB}", s.memory_mb),
        ));
    }
    if s.network.trim().is_empty() {
        return Err(invalid(
            "sandbox.network",
            "use \"none\" to disable networking",
        ));
    }
    if s.network == "host" {
        return Err(invalid(
            "sandbox.network",
            "host networking would expose the host to plugin code",
        ));
    }
    if let Some(cpu) = s.cpu_quota.filter(|c| !c.is_finite() || *c <= 0.0) {
        return Err(invalid(
            "sandbox.cpu_quota",
            format!("{cpu} is not a positive number of cores"),
        ));
    }
    if s.pids_limit == Some(0) {
        return Err(invalid("sandbox.pids_limit", "must be greater than zero"));
    }
    if s.max_output_bytes == 0 {
        return Err(invalid("sandbox.max_output_bytes", "must be greater than zero"));
    }
    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let l = &config.logging;
    if !matches!(
        l.level.as_str(),
        "trace" | "debug" | "info" | "warn" | "error" | "off"
    ) {
        return Err(invalid(
            "logging.level",
            format!(
                "unknown level '{}'; expected one of: trace, debug, info, warn, error, off",
                l.level
            ),
        ));
    }
    if !matches!(l.format.as_str(), "pretty" | "compact" | "json" | "full") {
        return Err(invalid(
            "logging.format",
            format!(
                "unknown format '{}'; expected one of: pretty, compact, json, full",
                l.format
            ),
        ));
    }
    Ok(())
}
