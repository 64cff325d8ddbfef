// src/lib.rs

pub mod classify;
pub mod cli;
pub mod config;
pub mod cursor;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod schedule;
pub mod sensor;
pub mod types;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::classify::FailureClassifier;
use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::cursor::build_cursor_store;
use crate::dag::ChainGraph;
use crate::engine::{
    CancelToken, ChainExecutor, CoreRuntime, RunRequest, RunResult, Runtime, RuntimeEvent,
    RuntimeOptions,
};
use crate::engine::registry::RunRegistry;
use crate::exec::command_actions;
use crate::fs::{FileSystem, RealFileSystem};
use crate::schedule::{schedule_run_key, spawn_schedule, ScheduleTrigger};
use crate::sensor::{spawn_sensor, ChangeSensor, SensorOutcome};
use crate::types::TriggerSource;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - cursor store, classifier, chain and executor
/// - change sensor and schedule trigger
/// - core runtime + async shell
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading config {:?}", config_path))?;

    if args.dry_run {
        write_dry_run(&cfg, &mut std::io::stdout().lock())?;
        debug!("dry-run complete (no execution)");
        return Ok(());
    }

    let root_dir = config_root_dir(&config_path);
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);

    let actions = command_actions(&cfg, &root_dir)?;
    let graph = ChainGraph::from_config(&cfg, actions);
    let executor = ChainExecutor::new(graph, FailureClassifier::from_config(&cfg.classifier))
        .with_run_budget(cfg.run_budget());

    let sensor = build_sensor(&cfg, &root_dir, Arc::clone(&fs));
    let cancel = CancelToken::new();

    if args.once {
        return run_once(&cfg, sensor, &executor, &cancel, args.force).await;
    }

    // Runtime event channel.
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);

    let mut loops = Vec::new();
    match sensor {
        Some(sensor) => loops.push(spawn_sensor(
            Arc::new(sensor),
            Duration::from_secs(cfg.pipeline.poll_interval_seconds),
            rt_tx.clone(),
        )),
        None => info!("change sensor disabled"),
    }

    if cfg.pipeline.enable_schedule {
        let trigger = ScheduleTrigger::new(&cfg.pipeline.name, &cfg.pipeline.cron_schedule)?;
        loops.push(spawn_schedule(
            trigger,
            cfg.pipeline.max_catchup_ticks,
            rt_tx.clone(),
        ));
    } else {
        info!("schedule trigger disabled");
    }

    if loops.is_empty() {
        bail!("neither the change sensor nor the schedule is enabled; nothing to do");
    }

    // Ctrl-C: cancel the active run at its next node boundary, then stop.
    {
        let tx = rt_tx.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            cancel.cancel();
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        });
    }
    drop(rt_tx);

    let (results_tx, mut results_rx) = mpsc::unbounded_channel::<RunResult>();
    let printer = tokio::spawn(async move {
        while let Some(result) = results_rx.recv().await {
            print_result(&result);
        }
    });

    let core = CoreRuntime::new(RunRegistry::default(), RuntimeOptions::default());
    let runtime = Runtime::new(core, rt_rx, executor, cancel).with_results(results_tx);
    runtime.run().await?;

    for handle in loops {
        handle.abort();
    }
    if let Err(e) = printer.await {
        debug!(error = %e, "result printer ended abnormally");
    }

    Ok(())
}

/// `--once`: run at most one chain and print its result.
async fn run_once(
    cfg: &ConfigFile,
    sensor: Option<ChangeSensor>,
    executor: &ChainExecutor,
    cancel: &CancelToken,
    force: bool,
) -> Result<()> {
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let Some(result) = execute_once(
        &cfg.pipeline.name,
        sensor.as_ref(),
        executor,
        cancel,
        force,
        Utc::now(),
    )
    .await?
    else {
        return Ok(());
    };
    print_result(&result);

    if !result.is_success() {
        bail!(
            "run {} failed: {}",
            result.run_key,
            result.failure_reason.as_deref().unwrap_or("unknown reason")
        );
    }
    Ok(())
}

/// Poll `sensor` once (or, with `force`, skip the sensor) and execute at
/// most one run.
///
/// Returns `None` when the sensor skips. A forced run is schedule-sourced
/// with `now` as its tick.
pub async fn execute_once(
    pipeline_name: &str,
    sensor: Option<&ChangeSensor>,
    executor: &ChainExecutor,
    cancel: &CancelToken,
    force: bool,
    now: DateTime<Utc>,
) -> Result<Option<RunResult>> {
    let request = if force {
        RunRequest::new(
            schedule_run_key(pipeline_name, now),
            TriggerSource::Schedule,
            now,
        )
        .with_reason("forced run")
    } else {
        let Some(sensor) = sensor else {
            bail!("--once needs an enabled change sensor with watched_input_path, or --force");
        };
        match sensor.poll(now)? {
            SensorOutcome::Triggered { request, .. } => request,
            SensorOutcome::Skip { reason } => {
                info!(%reason, "sensor skipped; nothing to run");
                return Ok(None);
            }
        }
    };

    let result = executor.execute(&request, cancel).await?;
    Ok(Some(result))
}

fn build_sensor(cfg: &ConfigFile, root: &Path, fs: Arc<dyn FileSystem>) -> Option<ChangeSensor> {
    if !cfg.pipeline.enable_sensor {
        return None;
    }
    let watched = cfg.pipeline.watched_input_path.as_ref()?;

    let store = build_cursor_store(cfg.pipeline.cursor_storage, root.to_path_buf(), Arc::clone(&fs));
    let sensor = ChangeSensor::new(root.join(watched), &cfg.pipeline.name, fs, store)
        .with_key(watched.clone());
    Some(sensor)
}

fn print_result(result: &RunResult) {
    match serde_json::to_string(result) {
        Ok(json) => println!("{json}"),
        Err(e) => warn!(run_key = %result.run_key, error = %e, "failed to serialize run result"),
    }
}

/// Figure out the project root that relative paths resolve against.
///
/// - If the config path has a non-empty parent (e.g. "configs/Pipechain.toml"),
///   we use that directory.
/// - If it's just a bare filename like "Pipechain.toml" (parent = ""),
///   we fall back to the current working directory "."
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// Dry-run report: pipeline settings and the chain, nothing executed.
pub fn write_dry_run(cfg: &ConfigFile, out: &mut impl Write) -> std::io::Result<()> {
    let p = &cfg.pipeline;
    writeln!(out, "pipechain dry-run")?;
    writeln!(out, "  pipeline.name = {}", p.name)?;
    match &p.watched_input_path {
        Some(path) if p.enable_sensor => writeln!(
            out,
            "  sensor: {path} every {}s ({:?} cursors)",
            p.poll_interval_seconds, p.cursor_storage
        )?,
        _ => writeln!(out, "  sensor: disabled")?,
    }
    if p.enable_schedule {
        writeln!(
            out,
            "  schedule: {} (catch-up {})",
            p.cron_schedule, p.max_catchup_ticks
        )?;
    } else {
        writeln!(out, "  schedule: disabled")?;
    }
    if let Some(secs) = p.run_timeout_seconds {
        writeln!(out, "  run budget: {secs}s")?;
    }
    writeln!(out)?;

    writeln!(out, "chain:")?;
    for kind in crate::dag::NodeKind::ALL {
        let Some(node) = cfg.node_config(kind) else {
            continue;
        };
        let retry = node.effective_retry(&cfg.retry);
        writeln!(out, "  - {kind}")?;
        writeln!(out, "      cmd: {}", node.cmd)?;
        if let Some(up) = kind.upstream() {
            writeln!(out, "      after: {up}")?;
        }
        writeln!(
            out,
            "      retries: {} (wait {}s, {:?})",
            retry.max_retries,
            retry.retry_wait.as_secs(),
            retry.backoff
        )?;
        if let Some(t) = node.timeout_seconds {
            writeln!(out, "      timeout: {t}s")?;
        }
        if let Some(ref s) = node.data_source {
            writeln!(out, "      data_source: {s}")?;
        }
        if let Some(ref s) = node.target {
            writeln!(out, "      target: {s}")?;
        }
    }
    Ok(())
}
