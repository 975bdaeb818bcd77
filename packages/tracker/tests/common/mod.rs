//! Fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use drift_tracker_core::{
    AlertAddressing, AlertMessage, AlertTransport, ClockResult, GeoCoordinate, GpsResult,
    GpsSource, InMemoryStore, LoginStatus, PositionSample, StorePaths, StoreValue,
    TransportResult, WallClock,
};
use parking_lot::Mutex;

/// Counts calls and keeps every message that reached `send`.
#[derive(Default)]
pub struct MailLog {
    pub connects: usize,
    pub sends: usize,
    pub closes: usize,
    pub delivered: Vec<AlertMessage>,
    pub connect_script: VecDeque<TransportResult<LoginStatus>>,
    pub send_script: VecDeque<TransportResult<()>>,
}

#[derive(Clone, Default)]
pub struct RecordingTransport {
    pub log: Arc<Mutex<MailLog>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl AlertTransport for RecordingTransport {
    async fn connect(&mut self) -> TransportResult<LoginStatus> {
        let mut log = self.log.lock();
        log.connects += 1;
        log.connect_script
            .pop_front()
            .unwrap_or(Ok(LoginStatus::Authenticated))
    }

    async fn send(&mut self, message: &AlertMessage) -> TransportResult<()> {
        let mut log = self.log.lock();
        log.sends += 1;
        let result = log.send_script.pop_front().unwrap_or(Ok(()));
        if result.is_ok() {
            log.delivered.push(message.clone());
        }
        result
    }

    async fn close(&mut self) {
        self.log.lock().closes += 1;
    }
}

/// Clock the test moves by hand.
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap())),
        }
    }

    pub fn advance(&self, secs: i64) {
        let mut now = self.now.lock();
        *now += chrono::Duration::seconds(secs);
    }
}

impl WallClock for ManualClock {
    fn now(&self) -> ClockResult<DateTime<Utc>> {
        Ok(*self.now.lock())
    }
}

/// Hands out queued fixes; each fix is reported once.
#[derive(Clone, Default)]
pub struct QueuedGps {
    pub fixes: Arc<Mutex<VecDeque<GeoCoordinate>>>,
    pub polls: Arc<Mutex<usize>>,
}

impl QueuedGps {
    pub fn push(&self, latitude: f64, longitude: f64) {
        self.fixes
            .lock()
            .push_back(GeoCoordinate::new(latitude, longitude));
    }
}

#[async_trait::async_trait]
impl GpsSource for QueuedGps {
    async fn poll_fix(&mut self) -> GpsResult<Option<PositionSample>> {
        *self.polls.lock() += 1;
        Ok(self
            .fixes
            .lock()
            .pop_front()
            .map(|coordinate| PositionSample::new(coordinate, at()).with_satellites(7)))
    }
}

pub fn at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

pub fn sample(latitude: f64, longitude: f64) -> PositionSample {
    PositionSample::new(GeoCoordinate::new(latitude, longitude), at())
}

pub fn addressing() -> AlertAddressing {
    AlertAddressing::new("tracker@example.com", "owner@example.com")
}

/// A store that already holds a published position and the notify flag.
pub fn seeded_store(latitude: &str, longitude: &str, notify: bool) -> InMemoryStore {
    let paths = StorePaths::default();
    InMemoryStore::new()
        .with_value(paths.latitude(), StoreValue::text(latitude))
        .with_value(paths.longitude(), StoreValue::text(longitude))
        .with_value(paths.maps_pin(), StoreValue::text("placeholder"))
        .with_value(paths.maps_directions(), StoreValue::text("placeholder"))
        .with_value(paths.timestamp(), StoreValue::text(""))
        .with_value(paths.should_notify(), StoreValue::Flag(notify))
}
