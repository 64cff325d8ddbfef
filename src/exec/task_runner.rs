// src/exec/task_runner.rs

//! Individual command process runner.

use std::path::Path;
use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, trace};

use crate::classify::TailBuffer;

/// Exit status and the retained tails of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout_tail: String,
    pub stderr_tail: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Run a shell command to completion, keeping only the last `tail_chars`
/// characters of stdout and stderr.
///
/// On unix the shell runs in its own process group. Dropping the returned
/// future before the command finishes (e.g. on timeout) kills the whole
/// group, so pipeline members and subshells die with the shell. Elsewhere
/// only the direct child is killed (`kill_on_drop`).
///
/// A process terminated by a signal reports exit code `-1`.
pub async fn run_command(
    cmd_line: &str,
    workdir: Option<&Path>,
    envs: &[(String, String)],
    tail_chars: usize,
) -> Result<CommandOutput> {
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd_line);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd_line);
        c
    };

    if let Some(dir) = workdir {
        cmd.current_dir(dir);
    }
    cmd.envs(envs.iter().map(|(k, v)| (k.as_str(), v.as_str())));

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning process for command '{cmd_line}'"))?;
    let mut group = GroupGuard::new(child.id());

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    // Drain both pipes concurrently so neither buffer can fill and stall the
    // child.
    let (stdout_tail, stderr_tail, status) = tokio::join!(
        read_tail(stdout, tail_chars, "stdout"),
        read_tail(stderr, tail_chars, "stderr"),
        child.wait(),
    );

    group.disarm();
    let status =
        status.with_context(|| format!("waiting for process of command '{cmd_line}'"))?;

    Ok(CommandOutput {
        exit_code: status.code().unwrap_or(-1),
        stdout_tail,
        stderr_tail,
    })
}

/// Kills the child's process group when dropped while still armed.
struct GroupGuard {
    pgid: Option<u32>,
}

impl GroupGuard {
    fn new(pid: Option<u32>) -> Self {
        Self { pgid: pid }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        let Some(pgid) = self.pgid.take() else {
            return;
        };
        kill_group(pgid);
    }
}

#[cfg(unix)]
fn kill_group(pgid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    // SAFETY: kill(2) takes plain integers; a negative pid addresses the
    // process group created by `process_group(0)` at spawn.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc == 0 {
        debug!(pgid, "killed process group of abandoned command");
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) {}

async fn read_tail<R>(stream: Option<R>, tail_chars: usize, label: &'static str) -> String
where
    R: AsyncRead + Unpin,
{
    let Some(mut stream) = stream else {
        return String::new();
    };

    let mut buf = TailBuffer::new(tail_chars);
    let mut chunk = [0u8; 8192];

    loop {
        match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                trace!(stream = label, bytes = n, "process output");
                buf.push_bytes(&chunk[..n]);
            }
            Err(e) => {
                debug!(stream = label, error = %e, "stopped reading process output");
                break;
            }
        }
    }

    buf.finish();
    buf.contents()
}
