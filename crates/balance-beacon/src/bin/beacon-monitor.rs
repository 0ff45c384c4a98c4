//! Standalone reply monitor: polls the configured mailbox until Ctrl-C.

use std::process::ExitCode;
use std::sync::Arc;

use balance_beacon::logging::init_logging;
use balance_beacon::monitor::TickOutcome;
use balance_beacon::{config, BeaconError, Database, ReplyTrackingService};
use tokio::sync::Notify;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = init_logging() {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Reply monitor failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), BeaconError> {
    let db_path = config::database_path()?;
    let db = Database::open(&db_path)?;
    let service = ReplyTrackingService::from_env(db)?;

    let shutdown = Arc::new(Notify::new());
    let signal = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || signal.notify_one()) {
        tracing::warn!("Failed to install Ctrl-C handler: {}", e);
    }

    match service.start_monitoring(None).await? {
        TickOutcome::Completed(report) => tracing::info!(
            fetched = report.fetched,
            matched = report.matched,
            orphaned = report.orphaned,
            "Initial check complete"
        ),
        TickOutcome::Skipped => tracing::info!("Initial check skipped"),
        TickOutcome::Failed(reason) => tracing::warn!("Initial check failed: {}", reason),
    }

    shutdown.notified().await;
    tracing::info!("Shutdown requested");
    service.stop_monitoring();

    let stats = service.response_stats()?;
    tracing::info!(
        total_sent = stats.total_sent,
        with_reply = stats.with_reply,
        response_rate = stats.response_rate,
        "Reply monitor exiting"
    );
    Ok(())
}
