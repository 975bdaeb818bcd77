//! Drift Tracker Core - position drift detection for a GPS-equipped vehicle
//!
//! Every interval the tracker takes a fresh fix, compares it with the last
//! position published to a remote store, emails an alert when the vehicle
//! moved further than the threshold and the operator allows notifications,
//! then publishes the new position.
//!
//! ## Components
//!
//! | Component | Module | Role |
//! |-----------|--------|------|
//! | Scheduler | [`scheduler`] | Opens once per interval of wall-clock seconds |
//! | DriftEvaluator | [`geo`] | Great-circle distance and threshold check |
//! | NotificationGate | [`gate`] | Drift AND remote `shouldNotify` flag |
//! | AlertDispatcher | [`alert`] | Mail session lifecycle, one reconnect at most |
//! | DriftMonitorCycle | [`cycle`] | Read, evaluate, gate, dispatch, write back |
//! | RemoteStateClient | [`store`] | Typed access to the remote key tree |
//! | Tracker | [`tracker`] | Polling loop, one cycle in flight at a time |
//!
//! The GPS receiver, wall clock, store and mail relay are traits so the whole
//! decision path runs against in-memory fakes.

pub mod alert;
pub mod clock;
pub mod cycle;
pub mod gate;
pub mod geo;
pub mod gps;
pub mod scheduler;
pub mod store;
pub mod tracker;

pub use alert::{
    AlertAddressing, AlertDispatcher, AlertMessage, AlertSession, AlertTransport,
    DispatchOutcome, FailureReason, LoginStatus, NoopMonitor, ResourceMonitor, SessionState,
    TransportError, TransportResult,
};
pub use clock::{ClockError, ClockResult, SystemClock, WallClock};
pub use cycle::{CycleReport, DriftMonitorCycle, LastKnownState};
pub use geo::{DriftEvaluator, GeoCoordinate};
pub use gps::{GpsError, GpsResult, GpsSource, PositionSample};
pub use scheduler::Scheduler;
pub use store::{
    InMemoryStore, InitReport, RemoteStateClient, StoreError, StorePaths, StoreResult,
    StoreValue, initialize_store,
};
pub use tracker::{PollOutcome, Tracker};
