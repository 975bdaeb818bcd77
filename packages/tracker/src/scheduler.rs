//! Interval gate for the drift check

/// Default number of seconds between two drift checks.
pub const DEFAULT_INTERVAL_SECS: u32 = 30;

/// Fires at most once per interval of wall-clock seconds.
///
/// The last fire time is advanced every time the gate opens, whether or not
/// the caller ends up running a cycle, so a missed window is never retried
/// faster than the interval.
#[derive(Debug, Clone)]
pub struct Scheduler {
    interval_secs: u32,
    last_fire_secs: u32,
}

impl Scheduler {
    pub fn new(interval_secs: u32) -> Self {
        Self {
            interval_secs,
            last_fire_secs: 0,
        }
    }

    pub fn interval_secs(&self) -> u32 {
        self.interval_secs
    }

    pub fn last_fire_secs(&self) -> u32 {
        self.last_fire_secs
    }

    pub fn tick(&mut self, now_secs: u32) -> bool {
        // A clock that steps backwards reads as zero elapsed time.
        let elapsed = now_secs.saturating_sub(self.last_fire_secs);
        if elapsed < self.interval_secs {
            return false;
        }

        self.last_fire_secs = now_secs;
        true
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL_SECS)
    }
}
