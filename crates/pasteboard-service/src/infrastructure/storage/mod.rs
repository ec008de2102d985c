//! Storage infrastructure: the daemon's configuration file.
//!
//! The `config` sub-module reads the TOML file from the platform config
//! directory, falls back to defaults when it does not exist yet and turns
//! the loaded sections into the runtime settings the service consumes.
//! Clipboard payloads themselves are never persisted.

pub mod config;
