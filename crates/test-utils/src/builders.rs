#![allow(dead_code)]

use pipechain::config::{
    ClassifierSection, ConfigFile, NodeConfig, PipelineSection, RawConfigFile, RetrySection,
};
use pipechain::dag::NodeKind;
use pipechain::types::BackoffKind;

/// Builder for `ConfigFile` to simplify test setup.
///
/// Starts from a valid config: all three nodes with trivial commands, a
/// watched input, and retry waits of zero so tests never sleep.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        let mut config = RawConfigFile {
            pipeline: PipelineSection {
                name: "test_pipeline".to_string(),
                watched_input_path: Some("data/input.csv".to_string()),
                ..PipelineSection::default()
            },
            retry: RetrySection {
                max_retries: 3,
                retry_wait_seconds: 0,
                backoff: BackoffKind::Fixed,
            },
            classifier: ClassifierSection::default(),
            node: Default::default(),
        };
        for kind in NodeKind::ALL {
            config.node.insert(
                kind.name().to_string(),
                NodeConfigBuilder::new(&format!("echo {kind}")).build(),
            );
        }
        Self { config }
    }

    pub fn with_node(mut self, kind: NodeKind, node: NodeConfig) -> Self {
        self.config.node.insert(kind.name().to_string(), node);
        self
    }

    pub fn without_node(mut self, kind: NodeKind) -> Self {
        self.config.node.remove(kind.name());
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.config.pipeline.name = name.to_string();
        self
    }

    pub fn with_watched_input(mut self, path: Option<&str>) -> Self {
        self.config.pipeline.watched_input_path = path.map(str::to_string);
        self
    }

    pub fn with_cron(mut self, expr: &str) -> Self {
        self.config.pipeline.cron_schedule = expr.to_string();
        self
    }

    pub fn with_poll_interval(mut self, secs: u64) -> Self {
        self.config.pipeline.poll_interval_seconds = secs;
        self
    }

    pub fn with_run_timeout(mut self, secs: Option<u64>) -> Self {
        self.config.pipeline.run_timeout_seconds = secs;
        self
    }

    pub fn with_retry(mut self, max_retries: u32, retry_wait_seconds: u64) -> Self {
        self.config.retry.max_retries = max_retries;
        self.config.retry.retry_wait_seconds = retry_wait_seconds;
        self
    }

    pub fn with_transient_signals(mut self, signals: &[&str]) -> Self {
        self.config.classifier.transient_signals =
            signals.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn enable_sensor(mut self, on: bool) -> Self {
        self.config.pipeline.enable_sensor = on;
        self
    }

    pub fn enable_schedule(mut self, on: bool) -> Self {
        self.config.pipeline.enable_schedule = on;
        self
    }

    /// The raw (unvalidated) config, for validation tests.
    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `NodeConfig`.
pub struct NodeConfigBuilder {
    node: NodeConfig,
}

impl NodeConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            node: NodeConfig {
                cmd: cmd.to_string(),
                max_retries: None,
                retry_wait_seconds: None,
                backoff: None,
                timeout_seconds: None,
                data_source: None,
                target: None,
            },
        }
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.node.max_retries = Some(n);
        self
    }

    pub fn retry_wait_seconds(mut self, secs: u64) -> Self {
        self.node.retry_wait_seconds = Some(secs);
        self
    }

    pub fn backoff(mut self, backoff: BackoffKind) -> Self {
        self.node.backoff = Some(backoff);
        self
    }

    pub fn timeout_seconds(mut self, secs: u64) -> Self {
        self.node.timeout_seconds = Some(secs);
        self
    }

    pub fn data_source(mut self, source: &str) -> Self {
        self.node.data_source = Some(source.to_string());
        self
    }

    pub fn target(mut self, target: &str) -> Self {
        self.node.target = Some(target.to_string());
        self
    }

    pub fn build(self) -> NodeConfig {
        self.node
    }
}
