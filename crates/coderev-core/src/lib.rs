//! Core types, configuration, and error handling for coderev.
//!
//! This crate provides the shared foundation used by the other coderev crates:
//! - [`CoderevError`] — unified error type using `thiserror` and `miette`
//! - [`Config`] — layered configuration (command line, environment, JSON file)
//! - [`truncate`] — size ceilings with explicit truncation markers
//! - Shared enums: [`ChangeKind`], [`AgentKind`], [`AgentMode`], [`DocumentKind`]

mod config;
mod error;
pub mod truncate;
mod types;

pub use config::{
    load_file_layer, AgentOverride, Config, ConfigLayer, ConfigSource, Limits, Origin,
    SearchPaths, CONFIG_FILE_NAMES, ENV_PREFIX,
};
pub use error::CoderevError;
pub use types::{AgentKind, AgentMode, ChangeKind, DocumentKind};

/// A convenience `Result` type for coderev operations.
pub type Result<T> = std::result::Result<T, CoderevError>;
