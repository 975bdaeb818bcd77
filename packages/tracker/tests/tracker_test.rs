//! Polling loop behavior with a hand-driven clock.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{ManualClock, QueuedGps, RecordingTransport, addressing, seeded_store};
use drift_tracker_core::{
    AlertDispatcher, DriftEvaluator, DriftMonitorCycle, InMemoryStore, InitReport, PollOutcome,
    RemoteStateClient, Scheduler, SessionState, StorePaths, StoreValue, Tracker,
    initialize_store,
};

struct Harness {
    tracker: Tracker,
    clock: ManualClock,
    gps: QueuedGps,
    store: Arc<InMemoryStore>,
    transport: RecordingTransport,
}

fn harness(store: InMemoryStore) -> Harness {
    let clock = ManualClock::new();
    let gps = QueuedGps::default();
    let store = Arc::new(store);
    let transport = RecordingTransport::new();

    let tracker = Tracker::new(
        Scheduler::new(30),
        Box::new(clock.clone()),
        Box::new(gps.clone()),
        store.clone() as Arc<dyn RemoteStateClient>,
        DriftMonitorCycle::new(
            DriftEvaluator::new(1.0),
            StorePaths::default(),
            addressing(),
        ),
        AlertDispatcher::new(Box::new(transport.clone())),
    );

    Harness {
        tracker,
        clock,
        gps,
        store,
        transport,
    }
}

#[tokio::test]
async fn test_first_poll_runs_a_cycle() {
    let mut h = harness(seeded_store("40.0", "-74.0", true));
    h.gps.push(40.0, -74.0);

    let outcome = h.tracker.poll_once().await;

    assert!(matches!(outcome, PollOutcome::Cycle(_)));
    assert_eq!(*h.gps.polls.lock(), 1);
}

#[tokio::test]
async fn test_polls_within_interval_are_idle() {
    let mut h = harness(seeded_store("40.0", "-74.0", true));
    h.gps.push(40.0, -74.0);
    h.tracker.poll_once().await;

    h.gps.push(41.0, -74.0);
    for _ in 0..29 {
        h.clock.advance(1);
        assert!(matches!(h.tracker.poll_once().await, PollOutcome::Idle));
    }
    assert_eq!(*h.gps.polls.lock(), 1);

    h.clock.advance(1);
    assert!(matches!(h.tracker.poll_once().await, PollOutcome::Cycle(_)));
    assert_eq!(*h.gps.polls.lock(), 2);
}

#[tokio::test]
async fn test_missing_fix_still_consumes_the_interval() {
    let mut h = harness(seeded_store("40.0", "-74.0", true));

    assert!(matches!(h.tracker.poll_once().await, PollOutcome::NoFix));
    assert_eq!(h.store.write_count(), 0);

    // A fix arriving mid-interval waits for the next window.
    h.gps.push(40.0, -74.0);
    h.clock.advance(10);
    assert!(matches!(h.tracker.poll_once().await, PollOutcome::Idle));

    h.clock.advance(20);
    assert!(matches!(h.tracker.poll_once().await, PollOutcome::Cycle(_)));
}

#[tokio::test]
async fn test_drift_over_two_windows_alerts_on_one_session() {
    let mut h = harness(seeded_store("40.0", "-74.0", true));

    h.gps.push(40.001, -74.0);
    h.tracker.poll_once().await;
    h.clock.advance(30);
    h.gps.push(40.002, -74.0);
    h.tracker.poll_once().await;

    let session = h.tracker.dispatcher().session();
    assert_eq!(session.connect_count(), 1);
    assert_eq!(session.send_count(), 2);
    assert_eq!(h.transport.log.lock().delivered.len(), 2);
    assert_eq!(
        h.store.value(&StorePaths::default().latitude()),
        Some(StoreValue::text("40.002000000"))
    );
    assert_eq!(
        h.store.value(&StorePaths::default().timestamp()),
        Some(StoreValue::text("2024-06-01T12:00:30Z"))
    );
}

#[tokio::test]
async fn test_operator_toggle_applies_next_cycle() {
    let mut h = harness(seeded_store("40.0", "-74.0", false));

    h.gps.push(40.01, -74.0);
    h.tracker.poll_once().await;
    assert_eq!(h.transport.log.lock().sends, 0);

    h.store
        .put(StorePaths::default().should_notify(), StoreValue::Flag(true));
    h.clock.advance(30);
    h.gps.push(40.02, -74.0);
    h.tracker.poll_once().await;

    assert_eq!(h.transport.log.lock().sends, 1);
}

#[tokio::test]
async fn test_shutdown_closes_open_session() {
    let mut h = harness(seeded_store("40.0", "-74.0", true));
    h.gps.push(40.01, -74.0);
    h.tracker.poll_once().await;
    assert_eq!(
        h.tracker.dispatcher().session().state(),
        SessionState::Authenticated
    );

    let transport = h.transport.clone();
    h.tracker
        .run_until(Duration::from_millis(250), async {})
        .await;

    assert_eq!(transport.log.lock().closes, 1);
}

#[tokio::test(start_paused = true)]
async fn test_run_until_stops_on_shutdown_signal() {
    let h = harness(seeded_store("40.0", "-74.0", true));
    let polls = h.gps.polls.clone();

    h.tracker
        .run_until(
            Duration::from_millis(250),
            tokio::time::sleep(Duration::from_secs(2)),
        )
        .await;

    // Only the first poll falls inside an interval; later ones are idle.
    assert_eq!(*polls.lock(), 1);
    assert_eq!(h.transport.log.lock().closes, 0);
}

#[tokio::test]
async fn test_startup_then_cycle_on_empty_store() {
    let store = InMemoryStore::new();
    let report: InitReport = initialize_store(&store, &StorePaths::default()).await;
    assert_eq!(report.created.len(), 6);

    let mut h = harness(store);
    h.gps.push(40.0, -74.0);

    match h.tracker.poll_once().await {
        PollOutcome::Cycle(report) => {
            // "0","0" parses as a coordinate, so the first cycle measures drift
            // but notifications start disabled.
            assert!(report.is_drift);
            assert!(!report.notify_enabled);
            assert!(report.alert.is_none());
            assert!(report.published());
        }
        other => panic!("expected a cycle, got {other:?}"),
    }
    assert_eq!(h.transport.log.lock().connects, 0);
}
