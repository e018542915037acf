// src/config/mod.rs

//! Configuration loading and validation.
//!
//! - [`model`] is the TOML-backed data model.
//! - [`loader`] reads a config file from disk.
//! - [`validate`] turns a [`RawConfigFile`] into a checked [`ConfigFile`].
//! - [`workflow`] builds the task graph from a checked config.

pub mod loader;
pub mod model;
pub mod validate;
pub mod workflow;

pub use loader::{DEFAULT_CONFIG_FILE, default_config_path, load_and_validate, load_from_path, load_from_str};
pub use model::{ConfigFile, ConfigSection, RawConfigFile, TaskConfig};
pub use workflow::{GROUP_ROOT, build_workflow, resolve_root};
