// tests/property/sensor.rs

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use proptest::prelude::*;

use pipechain::cursor::{CursorStore, MemoryCursorStore};
use pipechain::fs::mock::MockFileSystem;
use pipechain::sensor::{ChangeSensor, SensorOutcome};

proptest! {
    // The cursor only moves forward, tracks the running maximum of observed
    // mtimes, and a run is requested exactly once per new maximum.
    #[test]
    fn cursor_follows_running_max(mtimes in prop::collection::vec(1u32..1_000, 1..40)) {
        let fs = MockFileSystem::new();
        let store = Arc::new(MemoryCursorStore::new());
        let sensor = ChangeSensor::new(
            PathBuf::from("in.csv"),
            "p",
            Arc::new(fs.clone()),
            store.clone(),
        );

        let mut max_seen = 0.0_f64;
        let mut expected_triggers = 0;
        let mut triggers = 0;

        for m in mtimes {
            let m = f64::from(m);
            fs.set_modified("in.csv", m);

            let before = store.get("in.csv").unwrap().unwrap_or(0.0);
            match sensor.poll(Utc::now()).unwrap() {
                SensorOutcome::Triggered { cursor_before, cursor_after, .. } => {
                    triggers += 1;
                    prop_assert_eq!(cursor_before, before);
                    prop_assert!(cursor_after > cursor_before);
                }
                SensorOutcome::Skip { .. } => {}
            }

            if m > max_seen {
                max_seen = m;
                expected_triggers += 1;
            }
            let after = store.get("in.csv").unwrap().unwrap_or(0.0);
            prop_assert!(after >= before);
            prop_assert_eq!(after, max_seen);
        }

        prop_assert_eq!(triggers, expected_triggers);
    }
}
