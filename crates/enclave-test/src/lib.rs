//! Enclave Test - Shared test utilities for the enclave plugin engine.
//!
//! Provides a scriptable in-memory [`MockRuntime`] standing in for the
//! container runtime, trusted-plugin fixtures, and small harness helpers.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! enclave-test.workspace = true
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use enclave_test::{MockBehavior, MockRuntime, mock_runner};
//!
//! #[tokio::test]
//! async fn echo_runs() {
//!     let runtime = Arc::new(MockRuntime::new(MockBehavior::Echo));
//!     let (runner, _staging) = mock_runner(runtime.clone());
//!     // ...
//!     assert_eq!(runtime.live_count(), 0);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod fixtures;
pub mod harness;
pub mod mocks;

pub use fixtures::*;
pub use harness::*;
pub use mocks::*;
