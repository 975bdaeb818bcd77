//! GPS collaborator interface

use chrono::{DateTime, Utc};

use crate::geo::GeoCoordinate;

pub type GpsResult<T> = Result<T, GpsError>;

#[derive(Debug, thiserror::Error)]
pub enum GpsError {
    #[error("GPS connection error: {0}")]
    Connection(String),

    #[error("GPS stream closed")]
    Closed,
}

/// One validated fix, read once per cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionSample {
    pub coordinate: GeoCoordinate,
    /// Satellites used in the fix, when the receiver reports it.
    pub satellites: Option<u32>,
    pub captured_at: DateTime<Utc>,
}

impl PositionSample {
    pub fn new(coordinate: GeoCoordinate, captured_at: DateTime<Utc>) -> Self {
        Self {
            coordinate,
            satellites: None,
            captured_at,
        }
    }

    pub fn with_satellites(mut self, satellites: u32) -> Self {
        self.satellites = Some(satellites);
        self
    }
}

/// A receiver that decodes sentences in the background.
#[async_trait::async_trait]
pub trait GpsSource: Send {
    /// Returns the newest fix decoded since the previous call, or `None` when
    /// no complete sentence with a valid fix arrived in between.
    async fn poll_fix(&mut self) -> GpsResult<Option<PositionSample>>;
}
