//! Round-trip properties for the NDJSON event log.

use chronicle_core::event::{Event, EventKind, Payload};
use chronicle_log::event_log::EventLog;
use proptest::prelude::*;
use tempfile::tempdir;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Appending N events in increasing simulation time and reading them
    /// back always yields the same count, in the same order, regardless
    /// of how the log is reopened in between appends.
    #[test]
    fn append_then_stream_preserves_count_and_order(times in prop::collection::vec(0.0f64..10_000.0, 1..40)) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.ndjson");
        let mut sorted_times = times.clone();
        sorted_times.sort_by(|a, b| a.total_cmp(b));

        {
            let mut log = EventLog::open(&path).unwrap();
            for t in &sorted_times {
                let event = Event::new(*t, EventKind::MarkerCreated, Payload::new());
                log.append(&event).unwrap();
            }
        }

        let log = EventLog::open(&path).unwrap();
        let events = log.stream_events().unwrap();
        prop_assert_eq!(events.len(), sorted_times.len());
        for (event, expected_time) in events.iter().zip(sorted_times.iter()) {
            prop_assert_eq!(event.simulation_time, *expected_time);
        }
    }
}
