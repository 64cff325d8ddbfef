// src/classify/mod.rs

//! Failure classification for external process outcomes.
//!
//! Classification only sees the retained tail of each stream (see
//! [`tail`]). A transient signal printed early in a very long output, and
//! pushed out of the tail by later text, is not detected; such a failure is
//! classified as permanent.

pub mod tail;

use serde::Serialize;

use crate::config::model::{ClassifierSection, DEFAULT_TRANSIENT_SIGNALS};

pub use tail::{tail, TailBuffer};

/// Default number of trailing characters kept per stream.
pub const DEFAULT_TAIL_CHARS: usize = 2000;

/// Verdict for a single process outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Success,
    Transient,
    Permanent,
}

/// Pure classifier: exit code plus output tails in, verdict out.
#[derive(Debug, Clone)]
pub struct FailureClassifier {
    /// Lower-cased transient signal phrases.
    signals: Vec<String>,
    tail_chars: usize,
}

impl FailureClassifier {
    pub fn new<I, S>(signals: I, tail_chars: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            signals: signals
                .into_iter()
                .map(|s| s.as_ref().to_lowercase())
                .collect(),
            tail_chars,
        }
    }

    /// Configured phrases extend the built-in connectivity signals; they
    /// never replace them.
    pub fn from_config(cfg: &ClassifierSection) -> Self {
        let mut signals: Vec<String> = DEFAULT_TRANSIENT_SIGNALS
            .iter()
            .map(|s| s.to_lowercase())
            .collect();
        for phrase in &cfg.transient_signals {
            let phrase = phrase.to_lowercase();
            if !signals.contains(&phrase) {
                signals.push(phrase);
            }
        }
        Self::new(signals, cfg.tail_chars)
    }

    /// Lower-cased phrases this classifier treats as transient.
    pub fn signals(&self) -> &[String] {
        &self.signals
    }

    pub fn tail_chars(&self) -> usize {
        self.tail_chars
    }

    /// Classify an outcome.
    ///
    /// Both streams are cut down to their last `tail_chars` characters first,
    /// so callers may pass full output.
    pub fn classify(&self, exit_code: i32, stdout_tail: &str, stderr_tail: &str) -> Verdict {
        if exit_code == 0 {
            return Verdict::Success;
        }

        let combined = format!(
            "{}\n{}",
            tail(stdout_tail, self.tail_chars),
            tail(stderr_tail, self.tail_chars)
        )
        .to_lowercase();

        if self.signals.iter().any(|s| combined.contains(s.as_str())) {
            Verdict::Transient
        } else {
            Verdict::Permanent
        }
    }
}

impl Default for FailureClassifier {
    fn default() -> Self {
        Self::from_config(&ClassifierSection::default())
    }
}
