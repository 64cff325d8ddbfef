// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::dag::{NodeKind, RetryPolicy};
use crate::types::{BackoffKind, CursorStorageMode};

/// Phrases that mark a failed transform as a connectivity blip rather than a
/// logic error.
pub const DEFAULT_TRANSIENT_SIGNALS: &[&str] =
    &["could not connect to server", "connection refused"];

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [pipeline]
/// name = "churn_pipeline"
/// watched_input_path = "data/customer_churn.csv"
/// poll_interval_seconds = 60
/// cron_schedule = "0 * * * *"
///
/// [retry]
/// max_retries = 3
/// retry_wait_seconds = 30
///
/// [node.ingest]
/// cmd = "python load_raw.py"
///
/// [node.transform]
/// cmd = "dbt build"
///
/// [node.verify]
/// cmd = "python freshness.py"
/// ```
///
/// This is the unvalidated form; convert it with `ConfigFile::try_from`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub pipeline: PipelineSection,

    #[serde(default)]
    pub retry: RetrySection,

    #[serde(default)]
    pub classifier: ClassifierSection,

    /// Node sections from `[node.<name>]`, keyed by node name.
    #[serde(default)]
    pub node: BTreeMap<String, NodeConfig>,
}

/// Validated configuration.
///
/// Loaded once at startup and passed by reference into every component;
/// nothing reads configuration from the environment after this point.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub pipeline: PipelineSection,
    pub retry: RetrySection,
    pub classifier: ClassifierSection,
    pub node: BTreeMap<String, NodeConfig>,
}

impl ConfigFile {
    /// Build a `ConfigFile` without validation. Only `TryFrom<RawConfigFile>`
    /// should call this.
    pub(crate) fn new_unchecked(
        pipeline: PipelineSection,
        retry: RetrySection,
        classifier: ClassifierSection,
        node: BTreeMap<String, NodeConfig>,
    ) -> Self {
        Self {
            pipeline,
            retry,
            classifier,
            node,
        }
    }

    /// Config for one of the three chain nodes.
    ///
    /// Validation guarantees every kind is present.
    pub fn node_config(&self, kind: NodeKind) -> Option<&NodeConfig> {
        self.node.get(kind.name())
    }

    /// Whole-run wall-clock budget, if configured.
    pub fn run_budget(&self) -> Option<Duration> {
        self.pipeline.run_timeout_seconds.map(Duration::from_secs)
    }
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSection {
    /// Pipeline name; also the prefix of sensor run keys and the schedule id.
    #[serde(default = "default_pipeline_name")]
    pub name: String,

    /// Input watched by the change sensor, relative to the config directory.
    #[serde(default)]
    pub watched_input_path: Option<String>,

    /// Minimum interval between sensor polls.
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,

    /// Cron expression; 5-field expressions get a leading seconds field.
    #[serde(default = "default_cron_schedule")]
    pub cron_schedule: String,

    /// How many missed schedule ticks to replay after the host slept.
    #[serde(default = "default_max_catchup_ticks")]
    pub max_catchup_ticks: usize,

    /// Whole-run wall-clock budget. Timeouts past this budget are permanent.
    #[serde(default)]
    pub run_timeout_seconds: Option<u64>,

    #[serde(default)]
    pub cursor_storage: CursorStorageMode,

    #[serde(default = "default_true")]
    pub enable_sensor: bool,

    #[serde(default = "default_true")]
    pub enable_schedule: bool,
}

fn default_pipeline_name() -> String {
    "pipeline".to_string()
}

fn default_poll_interval_seconds() -> u64 {
    60
}

fn default_cron_schedule() -> String {
    "0 * * * *".to_string()
}

fn default_max_catchup_ticks() -> usize {
    1
}

fn default_true() -> bool {
    true
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            name: default_pipeline_name(),
            watched_input_path: None,
            poll_interval_seconds: default_poll_interval_seconds(),
            cron_schedule: default_cron_schedule(),
            max_catchup_ticks: default_max_catchup_ticks(),
            run_timeout_seconds: None,
            cursor_storage: CursorStorageMode::default(),
            enable_sensor: true,
            enable_schedule: true,
        }
    }
}

/// `[retry]` section: defaults for every node.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_wait_seconds")]
    pub retry_wait_seconds: u64,

    #[serde(default)]
    pub backoff: BackoffKind,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_wait_seconds() -> u64 {
    30
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_wait_seconds: default_retry_wait_seconds(),
            backoff: BackoffKind::default(),
        }
    }
}

/// `[classifier]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierSection {
    /// Number of trailing characters kept from each output stream.
    #[serde(default = "default_tail_chars")]
    pub tail_chars: usize,

    /// Case-insensitive substrings that mark a failure as transient, on top
    /// of `DEFAULT_TRANSIENT_SIGNALS`.
    #[serde(default = "default_transient_signals")]
    pub transient_signals: Vec<String>,
}

fn default_tail_chars() -> usize {
    2000
}

fn default_transient_signals() -> Vec<String> {
    DEFAULT_TRANSIENT_SIGNALS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for ClassifierSection {
    fn default() -> Self {
        Self {
            tail_chars: default_tail_chars(),
            transient_signals: default_transient_signals(),
        }
    }
}

/// `[node.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Shell command that performs the node's work.
    pub cmd: String,

    /// Overrides `[retry].max_retries`.
    #[serde(default)]
    pub max_retries: Option<u32>,

    /// Overrides `[retry].retry_wait_seconds`.
    #[serde(default)]
    pub retry_wait_seconds: Option<u64>,

    /// Overrides `[retry].backoff`.
    #[serde(default)]
    pub backoff: Option<BackoffKind>,

    /// Per-attempt timeout. No timeout when unset.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,

    /// Data source identifier handed to the ingest action.
    #[serde(default)]
    pub data_source: Option<String>,

    /// Target identifier handed to the verify action.
    #[serde(default)]
    pub target: Option<String>,
}

impl NodeConfig {
    /// Retry policy for this node, falling back to `[retry]` defaults.
    pub fn effective_retry(&self, defaults: &RetrySection) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            retry_wait: Duration::from_secs(
                self.retry_wait_seconds
                    .unwrap_or(defaults.retry_wait_seconds),
            ),
            backoff: self.backoff.unwrap_or(defaults.backoff),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds.map(Duration::from_secs)
    }
}
