mod config;
mod diagnostics;
mod firebase;
mod gpsd;
mod smtp;

use std::sync::Arc;

use config::Config;
use diagnostics::SysinfoMonitor;
use drift_tracker_core::{
    AlertAddressing, AlertDispatcher, DriftEvaluator, DriftMonitorCycle, RemoteStateClient,
    Scheduler, StorePaths, SystemClock, Tracker, initialize_store,
};
use firebase::FirebaseStore;
use gpsd::GpsdSource;
use smtp::SmtpAlertTransport;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("drift_tracker=info,drift_tracker_core=info")),
        )
        .init();

    info!("Starting drift tracker");

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };

    let clock = match SystemClock::checked() {
        Ok(clock) => clock,
        Err(e) => {
            error!("Wall clock unusable, refusing to start: {}", e);
            return Err(e.into());
        }
    };

    info!(
        threshold_meters = config.threshold_meters,
        interval_secs = config.check_interval_secs,
        root = %config.root_path,
        smtp_host = %config.smtp.host,
        encryption = %config.smtp.encryption,
        "Loaded config"
    );

    let store: Arc<dyn RemoteStateClient> = Arc::new(FirebaseStore::new(
        &config.firebase_url,
        &config.firebase_secret,
        config.http_timeout,
    )?);
    let paths = StorePaths::new(&config.root_path);

    let report = initialize_store(store.as_ref(), &paths).await;
    info!(
        created = report.created.len(),
        existing = report.existing,
        failed = report.failed.len(),
        "Store initialized"
    );
    if !report.failed.is_empty() {
        warn!(
            "Some keys could not be checked or created: {:?}",
            report.failed
        );
    }

    let dispatcher = AlertDispatcher::new(Box::new(SmtpAlertTransport::new(config.smtp.clone())))
        .with_monitor(Box::new(SysinfoMonitor::new()));
    let addressing = AlertAddressing::new(&config.sender_email, &config.recipient_email)
        .with_sender_name(&config.sender_name);
    let cycle = DriftMonitorCycle::new(
        DriftEvaluator::new(config.threshold_meters),
        paths,
        addressing,
    );

    let tracker = Tracker::new(
        Scheduler::new(config.check_interval_secs),
        Box::new(clock),
        Box::new(GpsdSource::new(&config.gpsd_addr, config.http_timeout)),
        store,
        cycle,
        dispatcher,
    );

    info!("Tracker running, waiting for shutdown signal");

    tracker.run_until(config.poll_interval, shutdown_signal()).await;

    info!("Tracker stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for ctrl+c, running until killed: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
