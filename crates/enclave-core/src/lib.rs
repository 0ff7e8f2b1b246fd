//! Enclave Core - Foundation types for the enclave plugin engine.
//!
//! This crate provides:
//! - Opaque identifiers for plugins, tools, users and executions
//! - The [`Caller`] identity consumed by lifecycle and execution checks
//! - The persisted data model: [`PluginRecord`], [`ToolRecord`], [`ExecutionLog`]
//! - The [`PluginState`] lifecycle state machine
//! - The [`Params`] mapping passed to plugin methods

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
pub mod execution_log;
pub mod identity;
pub mod ids;
pub mod params;
pub mod plugin;
pub mod tool;

pub use error::{CoreError, CoreResult};
pub use execution_log::{ExecutionLog, ExecutionStatus};
pub use identity::Caller;
pub use ids::{ExecutionId, PluginId, ToolId, UserId};
pub use params::Params;
pub use plugin::{PluginRecord, PluginState};
pub use tool::ToolRecord;
