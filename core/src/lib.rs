//! # smi-exporter-core
//!
//! Shared building blocks for the smi-exporter collectors.
//!
//! ## Features
//!
//! - **Command execution** - [`CommandRunner`] trait with a no-shell system implementation
//! - **Configuration management** - RON configuration with defaults and validation
//! - **Error handling** - [`ExporterError`] covering exec, parse and config failures
//!
//! ## Quick Start
//!
//! ```rust
//! use smi_exporter_core::{CommandRunner, ExporterError};
//!
//! // A canned runner, handy when no vendor tool is installed
//! struct Fixed(&'static str);
//!
//! impl CommandRunner for Fixed {
//!     fn run(&self, _program: &str, _args: &[String]) -> Result<String, ExporterError> {
//!         Ok(self.0.to_owned())
//!     }
//! }
//!
//! let out = Fixed("42").run("nvidia-smi", &[]).unwrap();
//! assert_eq!(out, "42");
//! ```

pub mod command;
pub mod config;
pub mod error;

pub use command::{strip_trailing_newline, CommandRunner, SystemRunner};
pub use config::{ExporterConfig, MissingValue, MissingValueParseError};
pub use error::ExporterError;
