//! One read-evaluate-dispatch-write pass

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::alert::{
    AlertAddressing, AlertDispatcher, AlertMessage, DispatchOutcome, DriftReport,
    directions_link, format_coordinate, maps_link,
};
use crate::clock::publication_timestamp;
use crate::gate::should_alert;
use crate::geo::{DriftEvaluator, GeoCoordinate};
use crate::gps::PositionSample;
use crate::store::{RemoteStateClient, StorePaths};

/// Values last read back from the store, used when a read fails.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LastKnownState {
    pub position: Option<GeoCoordinate>,
    pub notify_enabled: Option<bool>,
}

/// What a single cycle observed and did.
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// `None` when no last published position was known.
    pub distance_meters: Option<f64>,
    pub is_drift: bool,
    pub notify_enabled: bool,
    /// Present only when an alert was attempted.
    pub alert: Option<DispatchOutcome>,
    /// Store paths the write-back failed to update.
    pub failed_writes: Vec<String>,
}

impl CycleReport {
    pub fn published(&self) -> bool {
        self.failed_writes.is_empty()
    }
}

/// Orchestrates the drift check against the remote store.
#[derive(Debug, Clone)]
pub struct DriftMonitorCycle {
    evaluator: DriftEvaluator,
    paths: StorePaths,
    addressing: AlertAddressing,
    last_known: LastKnownState,
}

impl DriftMonitorCycle {
    pub fn new(evaluator: DriftEvaluator, paths: StorePaths, addressing: AlertAddressing) -> Self {
        Self {
            evaluator,
            paths,
            addressing,
            last_known: LastKnownState::default(),
        }
    }

    pub fn last_known(&self) -> &LastKnownState {
        &self.last_known
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    /// Runs the cycle for a fresh fix.
    ///
    /// The new position is published on every path, including when drift is
    /// detected but notifications are switched off.
    pub async fn run(
        &mut self,
        sample: &PositionSample,
        now: &DateTime<Utc>,
        store: &dyn RemoteStateClient,
        dispatcher: &mut AlertDispatcher,
    ) -> CycleReport {
        let current = sample.coordinate;
        debug!(
            latitude = %format_coordinate(current.latitude),
            longitude = %format_coordinate(current.longitude),
            satellites = sample.satellites,
            "GPS fix"
        );

        let last_published = self.read_last_published(store).await;
        let notify_enabled = self.read_notify_enabled(store).await;

        let pin = maps_link(&current);
        let directions = directions_link(&current);

        let distance_meters = last_published.map(|last| self.evaluator.evaluate(&current, &last));
        let is_drift = distance_meters.is_some_and(|d| self.evaluator.is_drift(d));

        let mut alert = None;
        match (last_published, distance_meters) {
            (Some(last), Some(distance)) if should_alert(is_drift, notify_enabled) => {
                info!(
                    distance_meters = distance,
                    threshold_meters = self.evaluator.threshold_meters(),
                    "Over threshold, alerting"
                );
                let message = AlertMessage::drift(
                    &self.addressing,
                    &DriftReport {
                        current: &current,
                        last_published: &last,
                        distance_meters: distance,
                        maps_link: &pin,
                        directions_link: &directions,
                    },
                );
                alert = Some(dispatcher.dispatch(&message).await);
            }
            (_, Some(distance)) if is_drift => {
                info!(
                    distance_meters = distance,
                    "Over threshold but notifications are disabled"
                );
            }
            (_, Some(distance)) => {
                debug!(distance_meters = distance, "Within threshold");
            }
            _ => {
                warn!("No last published position known, skipping drift check");
            }
        }

        let failed_writes = self
            .publish(store, &current, &pin, &directions, &publication_timestamp(now))
            .await;

        CycleReport {
            distance_meters,
            is_drift,
            notify_enabled,
            alert,
            failed_writes,
        }
    }

    async fn read_last_published(&mut self, store: &dyn RemoteStateClient) -> Option<GeoCoordinate> {
        let latitude = store.get_string(&self.paths.latitude()).await;
        let longitude = store.get_string(&self.paths.longitude()).await;

        match (latitude, longitude) {
            (Ok(latitude), Ok(longitude)) => match GeoCoordinate::parse(&latitude, &longitude) {
                Some(position) => {
                    self.last_known.position = Some(position);
                    Some(position)
                }
                None => {
                    warn!(
                        latitude = %latitude,
                        longitude = %longitude,
                        "Stored position is not a coordinate"
                    );
                    self.last_known.position
                }
            },
            (latitude, longitude) => {
                if let Err(e) = latitude.and(longitude) {
                    warn!("Failed to read last published position, using last known: {}", e);
                }
                self.last_known.position
            }
        }
    }

    async fn read_notify_enabled(&mut self, store: &dyn RemoteStateClient) -> bool {
        match store.get_bool(&self.paths.should_notify()).await {
            Ok(enabled) => {
                self.last_known.notify_enabled = Some(enabled);
                enabled
            }
            Err(e) => {
                warn!("Failed to read notify flag, using last known: {}", e);
                self.last_known.notify_enabled.unwrap_or(false)
            }
        }
    }

    async fn publish(
        &mut self,
        store: &dyn RemoteStateClient,
        position: &GeoCoordinate,
        pin: &str,
        directions: &str,
        timestamp: &str,
    ) -> Vec<String> {
        let writes = [
            (self.paths.latitude(), format_coordinate(position.latitude)),
            (self.paths.longitude(), format_coordinate(position.longitude)),
            (self.paths.maps_pin(), pin.to_string()),
            (self.paths.maps_directions(), directions.to_string()),
            (self.paths.timestamp(), timestamp.to_string()),
        ];

        let mut failed = Vec::new();
        for (path, value) in writes {
            if let Err(e) = store.set_string(&path, &value).await {
                warn!(path = %path, "Failed to publish: {}", e);
                failed.push(path);
            }
        }

        let position_written = !failed
            .iter()
            .any(|p| *p == self.paths.latitude() || *p == self.paths.longitude());
        if position_written {
            self.last_known.position = Some(*position);
        }

        failed
    }
}
