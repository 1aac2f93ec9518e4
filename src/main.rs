// SPDX-License-Identifier: MIT

//! igpsync binary: one sync run per invocation, meant for a scheduler
//! (GitHub Actions cron). Exits 0 on full or partial success, 1 when the
//! run aborted before any transfer (bad credentials, listing failure).

use igpsync::{
    config::Config,
    services::{GarminClient, IgpsportClient, SyncOrchestrator, SyncOutcome, SyncReport},
    store::{FileCheckpointStore, SessionStore},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    init_logging();

    match run().await {
        Ok(report) => {
            if report.nothing_new() {
                tracing::info!("Nothing new to sync");
            } else if report.outcome == SyncOutcome::PartialFailure {
                tracing::warn!(
                    uploaded = report.uploaded,
                    failed = report.failed,
                    "Sync attempted but partially failed"
                );
            } else {
                tracing::info!(
                    uploaded = report.uploaded,
                    duplicates = report.duplicates,
                    "Sync completed"
                );
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "Sync aborted before completing");
            std::process::exit(1);
        }
    }
}

async fn run() -> anyhow::Result<SyncReport> {
    let config = Config::from_env()?;
    tracing::info!(
        checkpoint = %config.checkpoint_path.display(),
        garmin_domain = %config.garmin_domain,
        "Starting igpsync"
    );

    let sessions = SessionStore::new(config.session_dir.clone());
    let checkpoint = FileCheckpointStore::new(config.checkpoint_path.clone());

    let igpsport =
        IgpsportClient::login(&config.igpsport_username, &config.igpsport_password).await?;
    let garmin = GarminClient::authenticate(
        &config.garmin_email,
        &config.garmin_password,
        &config.garmin_domain,
        sessions,
    )
    .await?;

    let orchestrator = SyncOrchestrator::new(igpsport, garmin, checkpoint);
    let report = orchestrator.run().await?;
    Ok(report)
}

/// Initialize structured logging; `RUST_LOG` overrides the default level.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer().with_target(false);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("igpsync=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
