//! The polling loop that ties the scheduler, the GPS receiver and the cycle
//! together.
//!
//! Everything runs on one task: a cycle always finishes before the next poll
//! starts, so two cycles never overlap.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::alert::{AlertDispatcher, DispatchOutcome};
use crate::clock::{WallClock, seconds_since_epoch};
use crate::cycle::{CycleReport, DriftMonitorCycle};
use crate::gps::GpsSource;
use crate::scheduler::Scheduler;
use crate::store::RemoteStateClient;

/// What a single poll did.
#[derive(Debug)]
pub enum PollOutcome {
    /// The interval has not elapsed yet.
    Idle,
    /// The interval elapsed but no fresh fix was available.
    NoFix,
    /// A cycle ran.
    Cycle(CycleReport),
}

pub struct Tracker {
    scheduler: Scheduler,
    clock: Box<dyn WallClock>,
    gps: Box<dyn GpsSource>,
    store: Arc<dyn RemoteStateClient>,
    cycle: DriftMonitorCycle,
    dispatcher: AlertDispatcher,
}

impl Tracker {
    pub fn new(
        scheduler: Scheduler,
        clock: Box<dyn WallClock>,
        gps: Box<dyn GpsSource>,
        store: Arc<dyn RemoteStateClient>,
        cycle: DriftMonitorCycle,
        dispatcher: AlertDispatcher,
    ) -> Self {
        Self {
            scheduler,
            clock,
            gps,
            store,
            cycle,
            dispatcher,
        }
    }

    pub fn dispatcher(&self) -> &AlertDispatcher {
        &self.dispatcher
    }

    pub fn cycle(&self) -> &DriftMonitorCycle {
        &self.cycle
    }

    pub async fn poll_once(&mut self) -> PollOutcome {
        let now = match self.clock.now() {
            Ok(now) => now,
            Err(e) => {
                error!("Clock read failed, skipping poll: {}", e);
                return PollOutcome::Idle;
            }
        };

        if !self.scheduler.tick(seconds_since_epoch(&now)) {
            return PollOutcome::Idle;
        }

        info!(
            interval_secs = self.scheduler.interval_secs(),
            "Interval elapsed, executing task"
        );

        let sample = match self.gps.poll_fix().await {
            Ok(Some(sample)) => sample,
            Ok(None) => {
                info!("No new GPS sentence since last check");
                return PollOutcome::NoFix;
            }
            Err(e) => {
                warn!("GPS read failed: {}", e);
                return PollOutcome::NoFix;
            }
        };

        let report = self
            .cycle
            .run(&sample, &now, self.store.as_ref(), &mut self.dispatcher)
            .await;
        log_report(&report);

        PollOutcome::Cycle(report)
    }

    /// Polls every `poll_interval` until `shutdown` resolves, then closes the
    /// mail session.
    pub async fn run_until<F>(mut self, poll_interval: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            self.poll_once().await;

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }

        info!("Shutting down tracker");
        self.dispatcher.close().await;
    }
}

fn log_report(report: &CycleReport) {
    let alert = match &report.alert {
        None => "none",
        Some(DispatchOutcome::Sent { .. }) => "sent",
        Some(DispatchOutcome::ConnectFailed(_)) => "connect_failed",
        Some(DispatchOutcome::SendFailed(_)) => "send_failed",
    };

    info!(
        distance_meters = report.distance_meters,
        is_drift = report.is_drift,
        notify_enabled = report.notify_enabled,
        alert,
        failed_writes = report.failed_writes.len(),
        "Cycle complete"
    );
}
