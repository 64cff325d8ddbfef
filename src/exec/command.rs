// src/exec/command.rs

//! Command-backed node actions.
//!
//! Each node runs its configured shell command. The command reports
//! results by printing `key=value` lines on stdout:
//!
//! - ingest: `row_count=<n>` (required)
//! - verify: `row_count=<n>` (required), `checked_at=<rfc3339>` (optional)
//!
//! The run context is exported to the child as `PIPECHAIN_*` environment
//! variables.

use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::{info, warn};

use crate::dag::NodeKind;
use crate::engine::{Metadata, MetadataValue};
use crate::exec::backend::{ActionOutcome, BoxFuture, NodeAction, NodeContext, ProcessFailure};
use crate::exec::task_runner::run_command;

/// Parses the `key=value` report lines a command prints.
///
/// Only the retained stdout tail is searched, so a command must print its
/// report within its last `tail_chars` characters of output. A report line
/// followed by more output than that is lost and the attempt fails.
#[derive(Debug, Clone)]
struct ReportParser {
    row_count: Regex,
    checked_at: Regex,
}

impl ReportParser {
    fn new() -> Result<Self> {
        Ok(Self {
            row_count: Regex::new(r"(?m)^\s*row_count\s*=\s*(\d+)\s*$")?,
            checked_at: Regex::new(r"(?m)^\s*checked_at\s*=\s*(\S+)\s*$")?,
        })
    }

    /// Last reported row count, if any.
    fn row_count(&self, stdout: &str) -> Option<i64> {
        self.row_count
            .captures_iter(stdout)
            .last()
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }

    fn checked_at(&self, stdout: &str) -> Option<MetadataValue> {
        let raw = self
            .checked_at
            .captures_iter(stdout)
            .last()
            .and_then(|c| c.get(1))?
            .as_str();

        Some(match DateTime::parse_from_rfc3339(raw) {
            Ok(ts) => MetadataValue::Timestamp(ts.with_timezone(&Utc)),
            Err(_) => MetadataValue::Text(raw.to_string()),
        })
    }
}

/// Runs a shell command for one node of the chain.
#[derive(Debug, Clone)]
pub struct CommandAction {
    kind: NodeKind,
    cmd: String,
    workdir: Option<PathBuf>,
    tail_chars: usize,
    parser: ReportParser,
}

impl CommandAction {
    pub fn new(kind: NodeKind, cmd: impl Into<String>, tail_chars: usize) -> Result<Self> {
        Ok(Self {
            kind,
            cmd: cmd.into(),
            workdir: None,
            tail_chars,
            parser: ReportParser::new()?,
        })
    }

    /// Run the command from this directory instead of the current one.
    pub fn with_workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    pub fn cmd(&self) -> &str {
        &self.cmd
    }

    fn child_env(&self, ctx: &NodeContext) -> Vec<(String, String)> {
        let mut envs = vec![
            ("PIPECHAIN_RUN_KEY".to_string(), ctx.run_key.clone()),
            ("PIPECHAIN_NODE".to_string(), ctx.node.name().to_string()),
            ("PIPECHAIN_ATTEMPT".to_string(), ctx.attempt.to_string()),
            ("PIPECHAIN_TRIGGER".to_string(), ctx.trigger_source.to_string()),
        ];
        if let Some(resource) = &ctx.resource {
            envs.push(("PIPECHAIN_RESOURCE".to_string(), resource.clone()));
        }
        envs
    }

    async fn run_inner(&self, ctx: &NodeContext) -> ActionOutcome {
        info!(
            node = %self.kind,
            run_key = %ctx.run_key,
            attempt = ctx.attempt,
            cmd = %self.cmd,
            "running node command"
        );

        let envs = self.child_env(ctx);
        let output = match run_command(
            &self.cmd,
            self.workdir.as_deref(),
            &envs,
            self.tail_chars,
        )
        .await
        {
            Ok(o) => o,
            Err(e) => {
                return ActionOutcome::Error(format!(
                    "failed to run {} command: {e:#}",
                    self.kind
                ));
            }
        };

        info!(node = %self.kind, "stdout (tail):\n{}", output.stdout_tail);
        if !output.stderr_tail.is_empty() {
            warn!(node = %self.kind, "stderr (tail):\n{}", output.stderr_tail);
        }

        if !output.success() {
            return ActionOutcome::ProcessFailed(ProcessFailure {
                exit_code: output.exit_code,
                stdout: output.stdout_tail,
                stderr: output.stderr_tail,
            });
        }

        let mut metadata = Metadata::new();
        metadata.insert(
            "return_code".to_string(),
            MetadataValue::Int(i64::from(output.exit_code)),
        );

        match self.kind {
            NodeKind::Ingest => {
                let Some(rows) = self.parser.row_count(&output.stdout_tail) else {
                    return ActionOutcome::Error(format!(
                        "ingest command did not report row_count=<n> in the last {} characters of stdout",
                        self.tail_chars
                    ));
                };
                metadata.insert("row_count".to_string(), MetadataValue::Int(rows));
                if let Some(source) = &ctx.resource {
                    metadata.insert("source_path".to_string(), source.as_str().into());
                }
            }
            NodeKind::Transform => {
                metadata.insert(
                    "stdout_tail".to_string(),
                    MetadataValue::Text(output.stdout_tail),
                );
            }
            NodeKind::Verify => {
                let Some(rows) = self.parser.row_count(&output.stdout_tail) else {
                    return ActionOutcome::Error(format!(
                        "verify command did not report row_count=<n> in the last {} characters of stdout",
                        self.tail_chars
                    ));
                };
                metadata.insert("row_count".to_string(), MetadataValue::Int(rows));
                let checked_at = self
                    .parser
                    .checked_at(&output.stdout_tail)
                    .unwrap_or_else(|| MetadataValue::Timestamp(Utc::now()));
                metadata.insert("checked_at".to_string(), checked_at);
                if let Some(target) = &ctx.resource {
                    metadata.insert("target".to_string(), target.as_str().into());
                }
            }
        }

        ActionOutcome::Success(metadata)
    }
}

impl NodeAction for CommandAction {
    fn run<'a>(&'a self, ctx: &'a NodeContext) -> BoxFuture<'a, ActionOutcome> {
        Box::pin(self.run_inner(ctx))
    }
}
