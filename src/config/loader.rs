// src/config/loader.rs

use std::fs;
use std::path::Path;
use std::str::FromStr;

use tracing::{debug, info};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{PipechainError, Result};

/// Environment variables that override values from the TOML file.
pub const ENV_MAX_RETRIES: &str = "PIPECHAIN_MAX_RETRIES";
pub const ENV_RETRY_WAIT_SECONDS: &str = "PIPECHAIN_RETRY_WAIT_SECONDS";
pub const ENV_POLL_INTERVAL_SECONDS: &str = "PIPECHAIN_POLL_INTERVAL_SECONDS";
pub const ENV_CRON: &str = "PIPECHAIN_CRON";
pub const ENV_WATCHED_INPUT: &str = "PIPECHAIN_WATCHED_INPUT";

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path, apply environment overrides and run
/// validation.
///
/// This is the recommended entry point for the rest of the application:
///
/// - Loads `.env` (if present) into the process environment.
/// - Reads TOML and applies defaults (handled by `serde`).
/// - Applies `PIPECHAIN_*` overrides.
/// - Validates the result into an immutable [`ConfigFile`].
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    match dotenvy::dotenv() {
        Ok(env_path) => debug!(path = ?env_path, "loaded .env file"),
        Err(e) if e.not_found() => {}
        Err(e) => {
            return Err(PipechainError::ConfigError(format!(
                "failed to load .env file: {e}"
            )));
        }
    }

    let mut raw_config = load_from_path(&path)?;
    apply_env_overrides(&mut raw_config, |key| std::env::var(key).ok())?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Apply `PIPECHAIN_*` overrides using the given lookup.
///
/// The lookup is injected so tests don't have to mutate the real process
/// environment.
pub fn apply_env_overrides<F>(raw: &mut RawConfigFile, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup(ENV_MAX_RETRIES) {
        raw.retry.max_retries = parse_env(ENV_MAX_RETRIES, &v)?;
        info!(max_retries = raw.retry.max_retries, "max_retries overridden from environment");
    }

    if let Some(v) = lookup(ENV_RETRY_WAIT_SECONDS) {
        raw.retry.retry_wait_seconds = parse_env(ENV_RETRY_WAIT_SECONDS, &v)?;
        info!(
            retry_wait_seconds = raw.retry.retry_wait_seconds,
            "retry_wait_seconds overridden from environment"
        );
    }

    if let Some(v) = lookup(ENV_POLL_INTERVAL_SECONDS) {
        raw.pipeline.poll_interval_seconds = parse_env(ENV_POLL_INTERVAL_SECONDS, &v)?;
        info!(
            poll_interval_seconds = raw.pipeline.poll_interval_seconds,
            "poll_interval_seconds overridden from environment"
        );
    }

    if let Some(v) = lookup(ENV_CRON) {
        info!(cron = %v, "cron_schedule overridden from environment");
        raw.pipeline.cron_schedule = v;
    }

    if let Some(v) = lookup(ENV_WATCHED_INPUT) {
        info!(path = %v, "watched_input_path overridden from environment");
        raw.pipeline.watched_input_path = Some(v);
    }

    Ok(())
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse::<T>().map_err(|e| {
        PipechainError::ConfigError(format!("{key}={value:?} is not valid: {e}"))
    })
}

/// Config file used when `--config` is not given, relative to the current
/// working directory.
pub const DEFAULT_CONFIG_FILE: &str = "Pipechain.toml";
