// src/sensor/mod.rs

//! Change detection for the watched input.
//!
//! The sensor polls the input's modification time, compares it with the
//! stored watermark and either skips or emits a deduplicable `RunRequest`.
//! Skipping is a normal outcome, not an error.

pub mod change;
pub mod locks;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::engine::{RunRequest, RuntimeEvent};

pub use change::{sensor_run_key, ChangeSensor};
pub use locks::KeyedLocks;

/// Result of one poll.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorOutcome {
    /// Nothing to do; `reason` is for logs.
    Skip { reason: String },
    /// The input moved forward and the cursor was advanced.
    Triggered {
        request: RunRequest,
        cursor_before: f64,
        cursor_after: f64,
    },
}

impl SensorOutcome {
    pub fn request(&self) -> Option<&RunRequest> {
        match self {
            SensorOutcome::Triggered { request, .. } => Some(request),
            SensorOutcome::Skip { .. } => None,
        }
    }
}

/// Poll `sensor` every `interval` and forward triggered requests into the
/// runtime.
///
/// Poll errors are logged and retried on the next tick. The loop ends when
/// the runtime channel closes.
pub fn spawn_sensor(
    sensor: Arc<ChangeSensor>,
    interval: Duration,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) -> JoinHandle<()> {
    info!(
        path = %sensor.path().display(),
        interval_secs = interval.as_secs_f64(),
        "change sensor started"
    );

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let outcome = {
                let sensor = Arc::clone(&sensor);
                tokio::task::spawn_blocking(move || sensor.poll(Utc::now())).await
            };

            match outcome {
                Ok(Ok(SensorOutcome::Triggered { request, .. })) => {
                    if runtime_tx
                        .send(RuntimeEvent::RunRequested(request))
                        .await
                        .is_err()
                    {
                        debug!("runtime channel closed; stopping sensor");
                        break;
                    }
                }
                Ok(Ok(SensorOutcome::Skip { reason })) => {
                    debug!(%reason, "sensor skipped");
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "sensor poll failed");
                }
                Err(e) => {
                    warn!(error = %e, "sensor poll task panicked");
                }
            }

            if runtime_tx.is_closed() {
                break;
            }
        }

        debug!("sensor loop finished");
    })
}
