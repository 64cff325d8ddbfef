// tests/integration/config_errors.rs

use std::collections::HashMap;

use pipechain::config::{apply_env_overrides, load_and_validate, load_from_path};
use pipechain::dag::NodeKind;
use pipechain::errors::PipechainError;
use pipechain::types::{BackoffKind, CursorStorageMode};

use crate::common::builders::{ConfigFileBuilder, NodeConfigBuilder};
use crate::common::{write_config, MINIMAL_CONFIG};

fn expect_config_error(contents: &str, needle: &str) {
    let file = write_config(contents);
    match load_and_validate(file.path()) {
        Err(PipechainError::ConfigError(msg)) => {
            assert!(msg.contains(needle), "message {msg:?} should contain {needle:?}")
        }
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn minimal_config_gets_defaults() {
    let file = write_config(MINIMAL_CONFIG);
    let cfg = load_and_validate(file.path()).unwrap();

    assert_eq!(cfg.pipeline.name, "churn_pipeline");
    assert_eq!(cfg.pipeline.poll_interval_seconds, 60);
    assert_eq!(cfg.pipeline.cron_schedule, "0 * * * *");
    assert_eq!(cfg.pipeline.cursor_storage, CursorStorageMode::File);
    assert_eq!(cfg.retry.max_retries, 3);
    assert_eq!(cfg.retry.retry_wait_seconds, 30);
    assert_eq!(cfg.retry.backoff, BackoffKind::Fixed);
    assert_eq!(cfg.classifier.tail_chars, 2000);
    assert!(cfg
        .classifier
        .transient_signals
        .iter()
        .any(|s| s == "connection refused"));
    assert!(cfg.run_budget().is_none());
}

#[test]
fn per_node_retry_overrides_defaults() {
    let file = write_config(&format!(
        "{MINIMAL_CONFIG}\n[retry]\nmax_retries = 1\nretry_wait_seconds = 5\n"
    ));
    let raw = load_from_path(file.path()).unwrap();
    assert_eq!(raw.retry.max_retries, 1);

    let cfg = ConfigFileBuilder::new()
        .with_retry(1, 5)
        .with_node(
            NodeKind::Transform,
            NodeConfigBuilder::new("dbt build")
                .max_retries(4)
                .backoff(BackoffKind::Exponential)
                .timeout_seconds(1800)
                .build(),
        )
        .build();

    let transform = cfg.node_config(NodeKind::Transform).unwrap();
    let policy = transform.effective_retry(&cfg.retry);
    assert_eq!(policy.max_retries, 4);
    assert_eq!(policy.retry_wait.as_secs(), 5);
    assert_eq!(policy.backoff, BackoffKind::Exponential);
    assert_eq!(transform.timeout().map(|d| d.as_secs()), Some(1800));

    let ingest = cfg.node_config(NodeKind::Ingest).unwrap();
    assert_eq!(ingest.effective_retry(&cfg.retry).max_retries, 1);
}

#[test]
fn missing_node_is_rejected() {
    expect_config_error(
        r#"
[pipeline]
watched_input_path = "in.csv"

[node.ingest]
cmd = "echo"

[node.transform]
cmd = "echo"
"#,
        "[node.verify]",
    );
}

#[test]
fn unknown_node_is_rejected() {
    expect_config_error(
        &format!("{MINIMAL_CONFIG}\n[node.publish]\ncmd = \"echo\"\n"),
        "unknown node 'publish'",
    );
}

#[test]
fn empty_command_is_rejected() {
    let raw = ConfigFileBuilder::new()
        .with_node(NodeKind::Ingest, NodeConfigBuilder::new("  ").build())
        .raw();
    let err = pipechain::config::ConfigFile::try_from(raw).unwrap_err();
    assert!(matches!(err, PipechainError::ConfigError(ref m) if m.contains("cmd")));
}

#[test]
fn invalid_cron_is_rejected() {
    expect_config_error(
        &MINIMAL_CONFIG.replace(
            "name = \"churn_pipeline\"",
            "name = \"churn_pipeline\"\ncron_schedule = \"every hour\"",
        ),
        "cron_schedule",
    );
}

#[test]
fn invalid_cron_is_fine_when_schedule_disabled() {
    let raw = ConfigFileBuilder::new()
        .with_cron("bogus")
        .enable_schedule(false)
        .raw();
    assert!(pipechain::config::ConfigFile::try_from(raw).is_ok());
}

#[test]
fn sensor_requires_watched_input() {
    let raw = ConfigFileBuilder::new().with_watched_input(None).raw();
    let err = pipechain::config::ConfigFile::try_from(raw).unwrap_err();
    assert!(matches!(err, PipechainError::ConfigError(ref m) if m.contains("watched_input_path")));

    let raw = ConfigFileBuilder::new()
        .with_watched_input(None)
        .enable_sensor(false)
        .raw();
    assert!(pipechain::config::ConfigFile::try_from(raw).is_ok());
}

#[test]
fn zero_poll_interval_is_rejected() {
    let raw = ConfigFileBuilder::new().with_poll_interval(0).raw();
    assert!(pipechain::config::ConfigFile::try_from(raw).is_err());
}

#[test]
fn blank_transient_signal_is_rejected() {
    let raw = ConfigFileBuilder::new()
        .with_transient_signals(&["connection refused", " "])
        .raw();
    assert!(pipechain::config::ConfigFile::try_from(raw).is_err());
}

#[test]
fn bad_toml_is_a_toml_error() {
    let file = write_config("[pipeline\nname = ");
    assert!(matches!(
        load_and_validate(file.path()),
        Err(PipechainError::TomlError(_))
    ));
}

#[test]
fn missing_file_is_an_io_error() {
    assert!(matches!(
        load_and_validate("/definitely/not/here/Pipechain.toml"),
        Err(PipechainError::IoError(_))
    ));
}

#[test]
fn env_overrides_apply_on_top_of_file() {
    let file = write_config(MINIMAL_CONFIG);
    let mut raw = load_from_path(file.path()).unwrap();

    let env: HashMap<&str, &str> = HashMap::from([
        ("PIPECHAIN_MAX_RETRIES", "5"),
        ("PIPECHAIN_RETRY_WAIT_SECONDS", " 7 "),
        ("PIPECHAIN_POLL_INTERVAL_SECONDS", "15"),
        ("PIPECHAIN_CRON", "*/5 * * * *"),
        ("PIPECHAIN_WATCHED_INPUT", "other.csv"),
    ]);
    apply_env_overrides(&mut raw, |k| env.get(k).map(|v| v.to_string())).unwrap();

    assert_eq!(raw.retry.max_retries, 5);
    assert_eq!(raw.retry.retry_wait_seconds, 7);
    assert_eq!(raw.pipeline.poll_interval_seconds, 15);
    assert_eq!(raw.pipeline.cron_schedule, "*/5 * * * *");
    assert_eq!(raw.pipeline.watched_input_path.as_deref(), Some("other.csv"));
}

#[test]
fn unparsable_env_override_is_a_config_error() {
    let mut raw = ConfigFileBuilder::new().raw();
    let err = apply_env_overrides(&mut raw, |k| {
        (k == "PIPECHAIN_MAX_RETRIES").then(|| "three".to_string())
    })
    .unwrap_err();
    assert!(matches!(err, PipechainError::ConfigError(ref m) if m.contains("PIPECHAIN_MAX_RETRIES")));
}
