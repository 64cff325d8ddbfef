// src/exec/mod.rs

//! Node action layer.
//!
//! This module defines what a node *does* when the executor runs it, and
//! provides the production implementation that runs shell commands with
//! `tokio::process::Command`.
//!
//! - [`backend`] provides the `NodeAction` trait, its context and outcome
//!   types, and the `NodeActions` bundle the chain is built from. Tests
//!   replace the production actions with scripted fakes.
//! - [`task_runner`] runs one process and keeps bounded output tails.
//! - [`command`] implements `NodeAction` on top of `task_runner` and parses
//!   the `key=value` report lines commands print.

pub mod backend;
pub mod command;
pub mod task_runner;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use crate::config::ConfigFile;
use crate::dag::NodeKind;
use crate::errors::PipechainError;

pub use backend::{
    ActionOutcome, BoxFuture, NodeAction, NodeActions, NodeContext, ProcessFailure,
};
pub use command::CommandAction;
pub use task_runner::{run_command, CommandOutput};

/// Build command-backed actions for all three nodes from a validated config.
///
/// Commands run from `workdir` (the config file's directory).
pub fn command_actions(cfg: &ConfigFile, workdir: &Path) -> Result<NodeActions> {
    let build = |kind: NodeKind| -> Result<Arc<dyn NodeAction>> {
        let node = cfg.node_config(kind).ok_or_else(|| {
            PipechainError::ConfigError(format!("missing [node.{}] section", kind.name()))
        })?;
        let action = CommandAction::new(kind, node.cmd.clone(), cfg.classifier.tail_chars)?
            .with_workdir(workdir);
        Ok(Arc::new(action))
    };

    Ok(NodeActions {
        ingest: build(NodeKind::Ingest)?,
        transform: build(NodeKind::Transform)?,
        verify: build(NodeKind::Verify)?,
    })
}
