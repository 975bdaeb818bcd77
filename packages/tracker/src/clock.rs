//! Wall-clock collaborator

use chrono::{DateTime, TimeZone, Utc};

pub type ClockResult<T> = Result<T, ClockError>;

#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    #[error("Clock is not set (reports {0})")]
    NotSet(DateTime<Utc>),

    #[error("Clock unavailable: {0}")]
    Unavailable(String),
}

/// Source of the current time.
pub trait WallClock: Send + Sync {
    fn now(&self) -> ClockResult<DateTime<Utc>>;
}

/// Host system clock.
///
/// Any reading before 2020-01-01 is treated as an unset clock.
#[derive(Debug, Clone)]
pub struct SystemClock {
    earliest_valid: DateTime<Utc>,
}

impl SystemClock {
    /// Checks that the clock is usable. Callers treat an error as fatal.
    pub fn checked() -> ClockResult<Self> {
        let earliest_valid = Utc
            .with_ymd_and_hms(2020, 1, 1, 0, 0, 0)
            .single()
            .ok_or_else(|| ClockError::Unavailable("invalid reference date".to_string()))?;

        let clock = Self { earliest_valid };
        clock.now()?;
        Ok(clock)
    }
}

impl WallClock for SystemClock {
    fn now(&self) -> ClockResult<DateTime<Utc>> {
        let now = Utc::now();
        if now < self.earliest_valid {
            return Err(ClockError::NotSet(now));
        }
        Ok(now)
    }
}

/// Seconds since the Unix epoch, saturated to the `u32` range.
pub fn seconds_since_epoch(at: &DateTime<Utc>) -> u32 {
    at.timestamp().clamp(0, u32::MAX as i64) as u32
}

/// Timestamp published alongside each position.
pub fn publication_timestamp(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
