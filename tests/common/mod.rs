#![allow(dead_code)]

use std::io::Write;

use tempfile::NamedTempFile;

pub use pipechain_test_utils::{builders, fakes, init_tracing, with_timeout};

/// Write `contents` to a temporary `.toml` file.
pub fn write_config(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .unwrap();
    write!(file, "{contents}").unwrap();
    file
}

/// A complete, valid config with all three nodes.
pub const MINIMAL_CONFIG: &str = r#"
[pipeline]
name = "churn_pipeline"
watched_input_path = "data/customer_churn.csv"

[node.ingest]
cmd = "echo row_count=10"

[node.transform]
cmd = "echo transformed"

[node.verify]
cmd = "echo row_count=10"
"#;
