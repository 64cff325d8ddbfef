// src/config/mod.rs

//! Configuration loading and validation for pipechain.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk and apply env overrides (`loader.rs`).
//! - Validate the chain, schedule and classifier settings (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{apply_env_overrides, load_and_validate, load_from_path};
pub use model::{
    ClassifierSection, ConfigFile, NodeConfig, PipelineSection, RawConfigFile, RetrySection,
};
pub use validate::validate_config;
