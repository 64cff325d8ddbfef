// src/schedule/mod.rs

//! Cron-driven run requests.
//!
//! Each tick of the schedule produces a `RunRequest` whose `run_key` is
//! derived from the tick's nominal timestamp, so a replayed or overlapping
//! tick never runs the chain twice.

use std::collections::{BTreeSet, VecDeque};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::{RunRequest, RuntimeEvent};
use crate::errors::{PipechainError, Result};
use crate::types::TriggerSource;

/// Parse a cron expression.
///
/// Standard 5-field expressions (`min hour dom month dow`) get a leading
/// seconds field of `0`, and their day-of-week field is renumbered from
/// standard cron (`0-7`, Sunday = 0 or 7) to the `cron` crate's `1-7`
/// (Sunday = 1). 6 and 7 field expressions are used as-is.
pub fn parse_cron(expr: &str) -> std::result::Result<Schedule, String> {
    let expr = expr.trim();
    let fields: Vec<&str> = expr.split_whitespace().collect();
    let normalized = match fields.len() {
        5 => {
            let dow = translate_day_of_week(fields[4])
                .map_err(|e| format!("invalid cron expression '{expr}': {e}"))?;
            format!("0 {} {dow}", fields[..4].join(" "))
        }
        6 | 7 => expr.to_string(),
        n => {
            return Err(format!(
                "cron expression '{expr}' has {n} fields (expected 5, 6 or 7)"
            ));
        }
    };

    Schedule::from_str(&normalized).map_err(|e| format!("invalid cron expression '{expr}': {e}"))
}

/// Renumber a standard day-of-week field for the `cron` crate.
///
/// Numeric lists, ranges and steps are expanded to explicit days; names
/// (`MON`, `Mon-Fri`) and `*` / `?` pass through.
fn translate_day_of_week(field: &str) -> std::result::Result<String, String> {
    if field == "*" || field == "?" {
        return Ok(field.to_string());
    }

    let mut days = BTreeSet::new();
    let mut named = Vec::new();

    for part in field.split(',') {
        if part.chars().any(|c| c.is_ascii_alphabetic()) {
            named.push(part.to_string());
            continue;
        }

        let (range, step) = match part.split_once('/') {
            Some((range, step)) => (range, Some(parse_day_number(step)?)),
            None => (part, None),
        };
        let (lo, hi) = if range == "*" {
            (0, 6)
        } else if let Some((lo, hi)) = range.split_once('-') {
            (parse_day_number(lo)?, parse_day_number(hi)?)
        } else {
            let day = parse_day_number(range)?;
            (day, if step.is_some() { 6 } else { day })
        };

        let step = step.unwrap_or(1);
        if step == 0 || lo > 7 || hi > 7 || lo > hi {
            return Err(format!("day-of-week '{part}' is out of range (0-7)"));
        }
        for day in (lo..=hi).step_by(step as usize) {
            days.insert(day % 7 + 1);
        }
    }

    let mut out: Vec<String> = days.iter().map(u32::to_string).collect();
    out.extend(named);
    Ok(out.join(","))
}

fn parse_day_number(s: &str) -> std::result::Result<u32, String> {
    s.parse::<u32>()
        .map_err(|_| format!("day-of-week '{s}' is not a number"))
}

/// Run key for a schedule tick: `sched:<name>:<unix seconds>`.
pub fn schedule_run_key(name: &str, tick: DateTime<Utc>) -> String {
    format!("sched:{name}:{}", tick.timestamp())
}

/// Fires run requests on a cron schedule.
#[derive(Debug, Clone)]
pub struct ScheduleTrigger {
    name: String,
    expression: String,
    schedule: Schedule,
}

impl ScheduleTrigger {
    /// `name` goes into every run key (`sched:<name>:<ts>`).
    pub fn new(name: impl Into<String>, expression: &str) -> Result<Self> {
        let schedule = parse_cron(expression).map_err(PipechainError::ConfigError)?;
        Ok(Self {
            name: name.into(),
            expression: expression.trim().to_string(),
            schedule,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First tick strictly after `after`.
    pub fn next_tick_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }

    /// Nominal ticks in `(last, now]`, oldest first.
    ///
    /// At most `max_catchup` ticks are returned; when more are due, the most
    /// recent ones are kept.
    pub fn due_ticks(
        &self,
        last: DateTime<Utc>,
        now: DateTime<Utc>,
        max_catchup: usize,
    ) -> Vec<DateTime<Utc>> {
        if max_catchup == 0 || now <= last {
            return Vec::new();
        }

        let mut due = VecDeque::with_capacity(max_catchup);
        for tick in self.schedule.after(&last).take_while(|t| *t <= now) {
            if due.len() == max_catchup {
                due.pop_front();
            }
            due.push_back(tick);
        }
        due.into()
    }

    pub fn run_key_for(&self, tick: DateTime<Utc>) -> String {
        schedule_run_key(&self.name, tick)
    }

    pub fn request_for_tick(&self, tick: DateTime<Utc>) -> RunRequest {
        RunRequest::new(self.run_key_for(tick), TriggerSource::Schedule, tick)
            .with_reason("cron tick")
    }
}

/// Source of wall-clock time for the schedule loop.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Sleep until each tick and forward its request into the runtime.
///
/// Ticks missed while the host was busy or suspended are replayed, up to
/// `max_catchup`. The loop ends when the runtime channel closes.
pub fn spawn_schedule(
    trigger: ScheduleTrigger,
    max_catchup: usize,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) -> JoinHandle<()> {
    spawn_schedule_with_clock(trigger, max_catchup, runtime_tx, Arc::new(Utc::now))
}

/// [`spawn_schedule`] reading the time from `clock`.
pub fn spawn_schedule_with_clock(
    trigger: ScheduleTrigger,
    max_catchup: usize,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    clock: Clock,
) -> JoinHandle<()> {
    info!(cron = %trigger.expression(), "schedule trigger started");

    tokio::spawn(async move {
        let mut last = clock();

        loop {
            let Some(next) = trigger.next_tick_after(last) else {
                warn!(cron = %trigger.expression(), "schedule has no upcoming ticks; stopping");
                break;
            };

            let wait = (next - clock()).to_std().unwrap_or_default();
            debug!(next = %next, wait_secs = wait.as_secs_f64(), "waiting for next tick");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = runtime_tx.closed() => break,
            }

            let now = clock();
            let due = trigger.due_ticks(last, now, max_catchup);
            if due.is_empty() {
                // Woke up early (clock adjustment); wait again.
                continue;
            }

            for tick in due {
                let request = trigger.request_for_tick(tick);
                info!(run_key = %request.run_key, tick = %tick, "schedule tick");
                if runtime_tx
                    .send(RuntimeEvent::RunRequested(request))
                    .await
                    .is_err()
                {
                    debug!("runtime channel closed; stopping schedule");
                    return;
                }
            }
            last = now;
        }

        debug!("schedule loop finished");
    })
}
