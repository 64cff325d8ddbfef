// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipechainError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Cursor store error: {0}")]
    CursorStore(String),

    #[error("Failed to stat watched input {path}: {message}")]
    Stat { path: String, message: String },

    #[error("Invalid state transition for node '{node}': {from:?} -> {to:?}")]
    InvalidTransition {
        node: String,
        from: crate::dag::NodeState,
        to: crate::dag::NodeState,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, PipechainError>;
