// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::dag::NodeKind;
use crate::errors::{PipechainError, Result};
use crate::schedule::parse_cron;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::PipechainError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_config(&raw)?;
        Ok(ConfigFile::new_unchecked(
            raw.pipeline,
            raw.retry,
            raw.classifier,
            raw.node,
        ))
    }
}

/// Run every validation check against a raw config.
pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    validate_nodes(cfg)?;
    validate_pipeline(cfg)?;
    validate_classifier(cfg)?;
    Ok(())
}

fn config_error(msg: impl Into<String>) -> PipechainError {
    PipechainError::ConfigError(msg.into())
}

fn validate_nodes(cfg: &RawConfigFile) -> Result<()> {
    for name in cfg.node.keys() {
        if NodeKind::from_name(name).is_none() {
            return Err(config_error(format!(
                "unknown node '{name}' (the chain only has ingest, transform and verify)"
            )));
        }
    }

    for kind in NodeKind::ALL {
        let node = cfg.node.get(kind.name()).ok_or_else(|| {
            config_error(format!("missing required [node.{}] section", kind.name()))
        })?;

        if node.cmd.trim().is_empty() {
            return Err(config_error(format!(
                "[node.{}].cmd must not be empty",
                kind.name()
            )));
        }

        if node.timeout_seconds == Some(0) {
            return Err(config_error(format!(
                "[node.{}].timeout_seconds must be >= 1 (got 0)",
                kind.name()
            )));
        }
    }

    Ok(())
}

fn validate_pipeline(cfg: &RawConfigFile) -> Result<()> {
    let p = &cfg.pipeline;

    if p.name.trim().is_empty() || p.name.chars().any(char::is_whitespace) {
        return Err(config_error(format!(
            "[pipeline].name must be non-empty and contain no whitespace (got {:?})",
            p.name
        )));
    }

    if p.poll_interval_seconds == 0 {
        return Err(config_error(
            "[pipeline].poll_interval_seconds must be >= 1 (got 0)",
        ));
    }

    if p.run_timeout_seconds == Some(0) {
        return Err(config_error(
            "[pipeline].run_timeout_seconds must be >= 1 (got 0)",
        ));
    }

    if p.enable_sensor
        && p
            .watched_input_path
            .as_deref()
            .is_none_or(|s| s.trim().is_empty())
    {
        return Err(config_error(
            "[pipeline].watched_input_path is required when the sensor is enabled",
        ));
    }

    if p.enable_schedule {
        parse_cron(&p.cron_schedule).map_err(|e| {
            config_error(format!(
                "[pipeline].cron_schedule {:?} is invalid: {e}",
                p.cron_schedule
            ))
        })?;

        if p.max_catchup_ticks == 0 {
            return Err(config_error(
                "[pipeline].max_catchup_ticks must be >= 1 (got 0)",
            ));
        }
    }

    Ok(())
}

fn validate_classifier(cfg: &RawConfigFile) -> Result<()> {
    let c = &cfg.classifier;

    if c.tail_chars == 0 {
        return Err(config_error("[classifier].tail_chars must be >= 1 (got 0)"));
    }

    if c.transient_signals.iter().any(|s| s.trim().is_empty()) {
        return Err(config_error(
            "[classifier].transient_signals must not contain blank phrases",
        ));
    }

    Ok(())
}
