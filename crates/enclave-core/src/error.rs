//! Core error types.

use thiserror::Error;

use crate::plugin::PluginState;

/// Errors produced by core types.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An identifier string was not a valid UUID.
    #[error("invalid {kind} id '{value}': {message}")]
    InvalidId {
        /// Which identifier type was being parsed.
        kind: &'static str,
        /// The rejected input.
        value: String,
        /// Parser message.
        message: String,
    },

    /// A lifecycle transition is not allowed from the current state.
    #[error("invalid lifecycle transition: {from} -> {to}")]
    InvalidTransition {
        /// State the plugin was in.
        from: PluginState,
        /// State that was requested.
        to: PluginState,
    },
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
