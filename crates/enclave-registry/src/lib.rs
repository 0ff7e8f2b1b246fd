//! Enclave Registry - Plugin lifecycle management and gated execution.
//!
//! A plugin moves through a fixed lifecycle:
//!
//! ```text
//! upload ──▶ Uploaded ──approve──▶ Approved ──activate──▶ Active
//!              │                     │                      │
//!              └───────── delete (author or admin) ─────────┘
//! ```
//!
//! Approval and activation require an administrator. Only plugins that are
//! both approved and active can run, and the registry always runs them in
//! the isolated sandbox. Deleting a plugin removes its metadata, the tools
//! it backs, and its stored artifact.
//!
//! Persistence is behind [`PluginStore`] and [`ArtifactStore`];
//! [`MemoryPluginStore`] and [`FsArtifactStore`] are provided.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod artifacts;
pub mod bootstrap;
pub mod error;
pub mod registry;
pub mod store;
mod tools;

pub use artifacts::{ArtifactStore, FsArtifactStore};
pub use error::{RegistryError, RegistryResult};
pub use registry::{PluginRegistry, UploadRequest};
pub use store::{MemoryPluginStore, PluginStore};
