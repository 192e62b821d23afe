//! Parsing and validation of `plinth.toml` pipeline configuration files.
//!
//! This crate reads the pipeline configuration file and produces a
//! strongly-typed [`PipelineConfig`], which [`resolve_settings`] merges with
//! command-line overrides into the effective [`Settings`] of a run.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod resolve;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, load_config_or_default, CONFIG_FILE_NAME};
pub use resolve::{resolve_settings, Overrides, Settings};
pub use types::*;
