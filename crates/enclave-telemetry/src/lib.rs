//! Enclave Telemetry - Logging for the enclave plugin engine.
//!
//! Wraps `tracing-subscriber` setup behind a small [`LogConfig`]. With the
//! `config` feature, a [`LogConfig`] can be built from the `[logging]`
//! section of the engine configuration.
//!
//! ```rust,no_run
//! use enclave_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), enclave_telemetry::TelemetryError> {
//! let config = LogConfig::new("info")
//!     .with_format(LogFormat::Json)
//!     .with_directive("enclave_executor=debug");
//! setup_logging(&config)?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LogConfig, LogFormat, LogTarget, setup_default_logging, setup_logging};
